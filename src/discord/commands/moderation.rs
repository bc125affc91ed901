// Discord commands for moderators.
//
// **Notice the pattern:**
// 1. Extract primitive data from Discord types
// 2. Call the moderation service
// 3. Format the response based on the result
//
// This layer is THIN - no business logic, just translation.

use crate::core::moderation::{ModerationError, ModerationService, NewRule, Rule, RuleUpdate};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Type alias for our bot's context.
/// This is what every command receives as its first parameter.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Data that's shared across all commands and the event handler.
pub struct Data {
    pub moderation: Arc<ModerationService>,
    /// Prefix for text commands; messages starting with it skip moderation.
    pub prefix: String,
}

const DEFAULT_LOG_LIMIT: usize = 10;
/// An embed holds at most 25 fields.
const MAX_EMBED_FIELDS: usize = 25;

/// Moderator-facing message for errors the moderator can fix; anything
/// else bubbles up to poise's error handler.
fn user_facing(err: ModerationError) -> Result<String, Error> {
    match err {
        ModerationError::Validation(msg) => Ok(format!("❌ {}", msg)),
        ModerationError::NotFound(what) => Ok(format!("❌ Could not find {}.", what)),
        ModerationError::Permission(msg) => Ok(format!(
            "❌ I'm missing a permission for that. ({})",
            msg
        )),
        other => Err(other.into()),
    }
}

fn rule_status(rule: &Rule) -> &'static str {
    if rule.enabled {
        "✅"
    } else {
        "⏸️"
    }
}

// ============================================================================
// MANUAL ACTIONS
// ============================================================================

/// Warn a member. They get a DM and the warning is logged.
///
/// **Command syntax:** `/warn @user spamming links`
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS"
)]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "Member to warn"] user: serenity::User,
    #[description = "Reason for the warning"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    if user.bot {
        ctx.say("Bots can't be warned! 🤖").await?;
        return Ok(());
    }
    let reason = reason.unwrap_or_else(|| "No reason given".to_string());

    let delivered = match ctx
        .data()
        .moderation
        .warn_member(user.id.get(), &user.name, &reason)
        .await
    {
        Ok(delivered) => delivered,
        Err(e) => {
            ctx.say(user_facing(e)?).await?;
            return Ok(());
        }
    };

    let mut reply = format!("⚠️ <@{}> has been warned: {}", user.id, reason);
    if !delivered {
        reply.push_str("\n(Their DMs are closed, so this message is the only notice.)");
    }
    ctx.say(reply).await?;
    Ok(())
}

/// Ban a member. They get a DM with the reason first.
///
/// **Command syntax:** `/ban @user raiding`
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    required_bot_permissions = "BAN_MEMBERS"
)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "Member to ban"] user: serenity::User,
    #[description = "Reason for the ban"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?;
    if user.id == ctx.author().id {
        ctx.say("You can't ban yourself.").await?;
        return Ok(());
    }
    let reason = reason.unwrap_or_else(|| "No reason given".to_string());

    match ctx
        .data()
        .moderation
        .ban_member(guild_id.get(), user.id.get(), &user.name, &reason)
        .await
    {
        Ok(_) => {
            ctx.say(format!("🔨 **{}** has been banned. Reason: {}", user.name, reason))
                .await?;
        }
        Err(e) => {
            ctx.say(user_facing(e)?).await?;
        }
    }
    Ok(())
}

/// Delete the most recent messages in this channel.
///
/// **Command syntax:** `/purge 20`
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_MESSAGES",
    required_bot_permissions = "MANAGE_MESSAGES"
)]
pub async fn purge(
    ctx: Context<'_>,
    #[description = "How many messages to delete (1-100)"]
    #[min = 1]
    #[max = 100]
    amount: u8,
) -> Result<(), Error> {
    if !(1..=100).contains(&amount) {
        ctx.say("Pick a number between 1 and 100.").await?;
        return Ok(());
    }
    ctx.defer_ephemeral().await?;

    // Messages sent before this command was invoked; snowflakes sort by time.
    let messages = ctx
        .channel_id()
        .messages(
            ctx.http(),
            serenity::GetMessages::new()
                .before(serenity::MessageId::new(ctx.id()))
                .limit(amount),
        )
        .await?;
    let ids: Vec<u64> = messages.iter().map(|m| m.id.get()).collect();

    match ctx
        .data()
        .moderation
        .purge_messages(
            ctx.channel_id().get(),
            &ids,
            ctx.author().id.get(),
            &ctx.author().name,
        )
        .await
    {
        Ok(removed) => {
            ctx.say(format!("🧹 Deleted {} messages.", removed)).await?;
        }
        Err(e) => {
            ctx.say(user_facing(e)?).await?;
        }
    }
    Ok(())
}

// ============================================================================
// RULES
// ============================================================================

/// Manage moderation rules.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS",
    subcommands("list", "add", "edit", "remove", "enable", "disable"),
    subcommand_required
)]
pub async fn rule(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show all rules in match order.
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let moderation = &ctx.data().moderation;
    let rules = moderation.list_rules().await?;

    if rules.is_empty() {
        ctx.say("No rules are configured.").await?;
        return Ok(());
    }

    let mut embed = serenity::CreateEmbed::new()
        .title("🛡️ Moderation Rules")
        .description("Rules are checked top to bottom; the first match wins.")
        .color(0x5865F2);

    for rule in rules.iter().take(MAX_EMBED_FIELDS) {
        embed = embed.field(
            format!("{} #{} {}", rule_status(rule), rule.id, rule.name),
            format!(
                "Keywords: `{}`\nAction: `{}` ({})",
                if rule.keyword_spec.is_empty() {
                    "-"
                } else {
                    rule.keyword_spec.as_str()
                },
                rule.action_spec,
                moderation.action_plan(rule).describe()
            ),
            false,
        );
    }
    if rules.len() > MAX_EMBED_FIELDS {
        embed = embed.footer(serenity::CreateEmbedFooter::new(format!(
            "Showing {} of {} rules",
            MAX_EMBED_FIELDS,
            rules.len()
        )));
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Add a rule.
///
/// **Command syntax:** `!rule add "no-cats" "cat,kitten*" "delete + warn"`
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Unique rule name"] name: String,
    #[description = "Comma-separated keywords, * matches anything"] keywords: String,
    #[description = "Any of: delete, warn, mute(minutes), ban"] action: String,
) -> Result<(), Error> {
    let result = ctx
        .data()
        .moderation
        .add_rule(NewRule::new(&name, &keywords, &action, true))
        .await;

    match result {
        Ok(rule) => {
            ctx.say(format!("✅ Added rule **{}** (ID: {}).", rule.name, rule.id))
                .await?;
        }
        Err(e) => {
            ctx.say(user_facing(e)?).await?;
        }
    }
    Ok(())
}

/// Change a rule's name, keywords or action. Omitted fields stay as they are.
///
/// **Command syntax:** `/rule edit 5 action:"delete + mute(30)"`
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn edit(
    ctx: Context<'_>,
    #[description = "Rule ID (see /rule list)"] id: i64,
    #[description = "New unique name"] name: Option<String>,
    #[description = "New comma-separated keywords"] keywords: Option<String>,
    #[description = "New action: delete, warn, mute(minutes), ban"] action: Option<String>,
) -> Result<(), Error> {
    let update = RuleUpdate {
        name,
        keyword_spec: keywords,
        action_spec: action,
    };

    match ctx.data().moderation.update_rule(id, update).await {
        Ok(rule) => {
            ctx.say(format!(
                "✏️ Updated rule **{}** (ID: {}). Action: `{}`",
                rule.name, rule.id, rule.action_spec
            ))
            .await?;
        }
        Err(e) => {
            ctx.say(user_facing(e)?).await?;
        }
    }
    Ok(())
}

/// Delete a rule by ID.
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Rule ID (see /rule list)"] id: i64,
) -> Result<(), Error> {
    match ctx.data().moderation.remove_rule(id).await {
        Ok(rule) => {
            ctx.say(format!("🗑️ Removed rule **{}** (ID: {}).", rule.name, id))
                .await?;
        }
        Err(e) => {
            ctx.say(user_facing(e)?).await?;
        }
    }
    Ok(())
}

/// Turn a rule on.
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn enable(
    ctx: Context<'_>,
    #[description = "Rule ID (see /rule list)"] id: i64,
) -> Result<(), Error> {
    toggle_rule(ctx, id, true).await
}

/// Turn a rule off without deleting it.
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn disable(
    ctx: Context<'_>,
    #[description = "Rule ID (see /rule list)"] id: i64,
) -> Result<(), Error> {
    toggle_rule(ctx, id, false).await
}

async fn toggle_rule(ctx: Context<'_>, id: i64, enabled: bool) -> Result<(), Error> {
    match ctx.data().moderation.set_rule_enabled(id, enabled).await {
        Ok(rule) => {
            ctx.say(format!(
                "{} Rule **{}** is now {}.",
                rule_status(&rule),
                rule.name,
                if rule.enabled { "enabled" } else { "disabled" }
            ))
            .await?;
        }
        Err(e) => {
            ctx.say(user_facing(e)?).await?;
        }
    }
    Ok(())
}

// ============================================================================
// REPORTING
// ============================================================================

/// Show moderation counters.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS"
)]
pub async fn modstats(ctx: Context<'_>) -> Result<(), Error> {
    let moderation = &ctx.data().moderation;
    let stats = moderation.stats().await?;
    let config = moderation.config();

    let mut embed = serenity::CreateEmbed::new()
        .title("📊 Moderation Stats")
        .color(0x00ff00)
        .field("Messages checked", stats.messages_monitored.to_string(), true)
        .field("Messages deleted", stats.messages_deleted.to_string(), true)
        .field("Warnings issued", stats.warnings_issued.to_string(), true)
        .field(
            "Flood detection",
            format!(
                "{} identical messages within {}s",
                config.spam_threshold,
                config.history_ttl.as_secs()
            ),
            false,
        )
        .field(
            "Tracked conversations",
            moderation.tracked_keys().to_string(),
            true,
        );

    if let Some(updated) = stats.last_updated {
        embed = embed.footer(serenity::CreateEmbedFooter::new(format!(
            "Last updated {}",
            updated.format("%Y-%m-%d %H:%M UTC")
        )));
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show the latest moderation log entries.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS"
)]
pub async fn modlogs(
    ctx: Context<'_>,
    #[description = "How many entries (default 10, max 25)"]
    #[min = 1]
    #[max = 25]
    limit: Option<u8>,
) -> Result<(), Error> {
    let limit = limit
        .map(usize::from)
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_EMBED_FIELDS);
    let entries = ctx.data().moderation.recent_logs(limit).await?;

    if entries.is_empty() {
        ctx.say("The moderation log is empty.").await?;
        return Ok(());
    }

    let mut embed = serenity::CreateEmbed::new()
        .title("📜 Moderation Log")
        .color(0xDAA520);

    for entry in &entries {
        let mut value = format!(
            "<@{}> ({})\nReason: {}",
            entry.user_id, entry.username, entry.reason
        );
        if let Some(content) = &entry.message_content {
            let snippet: String = content.chars().take(200).collect();
            value.push_str(&format!("\n> {}", snippet));
        }
        embed = embed.field(
            format!(
                "{} · {}",
                entry.action,
                entry.timestamp.format("%Y-%m-%d %H:%M")
            ),
            value,
            false,
        );
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
