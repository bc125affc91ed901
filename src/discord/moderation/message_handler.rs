// Feeds guild messages into the moderation pipeline.
//
// This layer is THIN: it decides whether a message is eligible, converts it
// into a `MessageEvent` and logs what the pipeline did.

use crate::core::moderation::{MessageEvent, ModerationOutcome};
use crate::discord::Data;
use poise::serenity_prelude as serenity;

/// What happens to an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Bot traffic, including our own replies.
    Ignore,
    /// DMs and prefix commands: counted, never moderated.
    CountOnly,
    Moderate,
}

pub fn route(is_bot: bool, in_guild: bool, content: &str, prefix: &str) -> Route {
    if is_bot {
        return Route::Ignore;
    }
    if !in_guild || (!prefix.is_empty() && content.starts_with(prefix)) {
        return Route::CountOnly;
    }
    Route::Moderate
}

pub fn to_message_event(msg: &serenity::Message) -> MessageEvent {
    MessageEvent {
        message_id: msg.id.get(),
        author_id: msg.author.id.get(),
        author_name: msg.author.name.clone(),
        channel_id: msg.channel_id.get(),
        guild_id: msg.guild_id.map(|id| id.get()),
        content: msg.content.clone(),
        timestamp: chrono::DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0)
            .unwrap_or_else(chrono::Utc::now),
    }
}

pub async fn handle_message(msg: &serenity::Message, data: &Data) {
    match route(
        msg.author.bot,
        msg.guild_id.is_some(),
        &msg.content,
        &data.prefix,
    ) {
        Route::Ignore => return,
        Route::CountOnly => {
            data.moderation.note_unmoderated().await;
            return;
        }
        Route::Moderate => {}
    }

    match data.moderation.handle_message(to_message_event(msg)).await {
        ModerationOutcome::Spam {
            message_ids,
            report,
        } => {
            tracing::info!(
                user_id = msg.author.id.get(),
                channel_id = msg.channel_id.get(),
                removed = report.messages_deleted,
                repeated = message_ids.len(),
                failures = report.errors.len(),
                "Handled repeat flooding"
            );
        }
        ModerationOutcome::RuleViolation { rule, term, report } => {
            tracing::info!(
                user_id = msg.author.id.get(),
                rule = %rule.name,
                term = ?term,
                action = %report.describe(),
                failures = report.errors.len(),
                "Handled rule violation"
            );
        }
        ModerationOutcome::NoAction | ModerationOutcome::Discarded => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing() {
        assert_eq!(route(false, true, "hello", "!"), Route::Moderate);
        assert_eq!(route(true, true, "hello", "!"), Route::Ignore);
        assert_eq!(route(true, false, "!help", "!"), Route::Ignore);
        assert_eq!(route(false, false, "hello", "!"), Route::CountOnly);
        assert_eq!(route(false, true, "!warn @someone", "!"), Route::CountOnly);
        assert_eq!(route(false, true, "!warn @someone", ""), Route::Moderate);
    }
}
