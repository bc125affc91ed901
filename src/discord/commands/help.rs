use crate::discord::commands::moderation::{Context, Error};
use poise::serenity_prelude as serenity;
use std::collections::HashMap;

// Category definitions with emojis and order
const CATEGORY_ORDER: &[&str] = &["Moderation", "Rules", "Reports", "Utilities"];

fn get_category_emoji(category: &str) -> &'static str {
    match category {
        "Moderation" => "🛡️",
        "Rules" => "📋",
        "Reports" => "📊",
        "Utilities" => "🧰",
        _ => "•",
    }
}

struct CommandMetadata {
    category: &'static str,
    priority: i32,
    description: Option<&'static str>,
    note: Option<&'static str>,
}

fn get_command_metadata(name: &str) -> CommandMetadata {
    match name {
        "warn" => CommandMetadata {
            category: "Moderation",
            priority: 100,
            description: Some("DM a member a warning and record it in the log."),
            note: None,
        },
        "purge" => CommandMetadata {
            category: "Moderation",
            priority: 90,
            description: Some("Delete the last 1-100 messages in this channel."),
            note: None,
        },
        "ban" => CommandMetadata {
            category: "Moderation",
            priority: 80,
            description: Some("Ban a member after sending them the reason."),
            note: Some("Administrators only."),
        },
        "rule" => CommandMetadata {
            category: "Rules",
            priority: 100,
            description: Some("Manage the rules every message is checked against."),
            note: Some("Subcommands: list, add, edit, remove, enable, disable"),
        },
        "modstats" => CommandMetadata {
            category: "Reports",
            priority: 100,
            description: Some("Show how many messages were checked, deleted and warned."),
            note: None,
        },
        "modlogs" => CommandMetadata {
            category: "Reports",
            priority: 90,
            description: Some("Show the latest moderation log entries."),
            note: None,
        },
        _ => CommandMetadata {
            category: "Utilities",
            priority: 0,
            description: None,
            note: None,
        },
    }
}

fn help_entry(name: &str, description: &str, note: Option<&str>) -> String {
    let mut entry = format!("• **/{}**: {}", name, description);
    if let Some(note) = note {
        entry.push_str(&format!("\n  ⤷ {}", note));
    }
    entry
}

/// Show a categorized list of commands.
#[poise::command(slash_command, prefix_command)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let prefix = &ctx.data().prefix;
    let mut categories: HashMap<&str, Vec<(i32, String)>> = HashMap::new();

    for command in &ctx.framework().options().commands {
        if command.hide_in_help || command.name == "help" {
            continue;
        }

        let metadata = get_command_metadata(&command.name);
        let description = metadata
            .description
            .or(command.description.as_deref())
            .unwrap_or("No description provided.");

        let entry = help_entry(&command.name, description, metadata.note);

        categories
            .entry(metadata.category)
            .or_default()
            .push((metadata.priority, entry));
    }

    let mut embed = serenity::CreateEmbed::new()
        .title("Moderation Bot Commands")
        .description(format!(
            "Use slash commands with `/` or text commands with `{}`. \
            Every message in this server is checked against the rules automatically.",
            prefix
        ))
        .color(serenity::Colour::from_rgb(88, 101, 242))
        .timestamp(serenity::Timestamp::now());

    // Sort categories based on defined order, then alphabetically for others
    let mut sorted_categories: Vec<_> = categories.keys().cloned().collect();
    sorted_categories.sort_by(|a, b| {
        let pos_a = CATEGORY_ORDER.iter().position(|&x| x == *a).unwrap_or(999);
        let pos_b = CATEGORY_ORDER.iter().position(|&x| x == *b).unwrap_or(999);
        pos_a.cmp(&pos_b).then(a.cmp(b))
    });

    for category in sorted_categories {
        if let Some(entries) = categories.get_mut(category) {
            // Sort by priority (descending), then name (ascending)
            entries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

            let title = format!("{} {}", get_category_emoji(category), category);
            let formatted: Vec<String> = entries.iter().map(|(_, s)| s.clone()).collect();
            embed = embed.field(title, formatted.join("\n"), false);
        }
    }

    embed = embed.footer(serenity::CreateEmbedFooter::new(
        "Moderator commands need the Moderate Members permission.",
    ));

    ctx.send(poise::CreateReply::default().embed(embed)).await?;

    Ok(())
}
