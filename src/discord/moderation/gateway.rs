// Discord implementation of the platform ports: DMs, message removal,
// timeouts and bans, all over serenity's REST client.

use crate::core::moderation::{
    ChannelMessageRemover, MemberModeration, ModerationError, Notifier,
};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Discord accepts at most this many ids per bulk delete.
const BULK_DELETE_LIMIT: usize = 100;

pub struct DiscordGateway {
    http: Arc<serenity::Http>,
}

impl DiscordGateway {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

/// Map a serenity failure onto the moderation taxonomy. 403s mean the bot
/// lacks a permission or sits below the target in the role hierarchy.
fn classify(what: &str, err: serenity::Error) -> ModerationError {
    let forbidden = matches!(
        &err,
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 403
    );
    if forbidden {
        ModerationError::Permission(format!("{}: {}", what, err))
    } else {
        ModerationError::Delivery(format!("{}: {}", what, err))
    }
}

#[async_trait]
impl Notifier for DiscordGateway {
    async fn send_direct(&self, user_id: u64, text: &str) -> Result<(), ModerationError> {
        let channel = serenity::UserId::new(user_id)
            .create_dm_channel(&self.http)
            .await
            .map_err(|e| classify("open DM channel", e))?;

        channel
            .say(&self.http, text)
            .await
            .map_err(|e| classify("send DM", e))?;
        Ok(())
    }
}

#[async_trait]
impl ChannelMessageRemover for DiscordGateway {
    async fn bulk_remove(
        &self,
        channel_id: u64,
        message_ids: &[u64],
    ) -> Result<(), ModerationError> {
        let channel = serenity::ChannelId::new(channel_id);

        for chunk in message_ids.chunks(BULK_DELETE_LIMIT) {
            // The bulk endpoint rejects single ids.
            if let [only] = chunk {
                channel
                    .delete_message(&self.http, serenity::MessageId::new(*only))
                    .await
                    .map_err(|e| classify("delete message", e))?;
                continue;
            }

            channel
                .delete_messages(
                    &self.http,
                    chunk.iter().map(|id| serenity::MessageId::new(*id)),
                )
                .await
                .map_err(|e| ModerationError::BulkOperation(e.to_string()))?;
        }
        Ok(())
    }

    async fn single_remove(&self, channel_id: u64, message_id: u64) -> Result<(), ModerationError> {
        serenity::ChannelId::new(channel_id)
            .delete_message(&self.http, serenity::MessageId::new(message_id))
            .await
            .map_err(|e| classify("delete message", e))
    }
}

#[async_trait]
impl MemberModeration for DiscordGateway {
    async fn mute(
        &self,
        guild_id: u64,
        user_id: u64,
        minutes: u32,
        reason: &str,
    ) -> Result<(), ModerationError> {
        let until = serenity::Timestamp::from_unix_timestamp(
            chrono::Utc::now().timestamp() + i64::from(minutes) * 60,
        )
        .map_err(|e| ModerationError::Validation(format!("bad timeout length: {}", e)))?;

        serenity::GuildId::new(guild_id)
            .edit_member(
                &self.http,
                serenity::UserId::new(user_id),
                serenity::EditMember::new()
                    .disable_communication_until_datetime(until)
                    .audit_log_reason(reason),
            )
            .await
            .map_err(|e| classify("timeout member", e))?;
        Ok(())
    }

    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<(), ModerationError> {
        serenity::GuildId::new(guild_id)
            .ban_with_reason(&self.http, serenity::UserId::new(user_id), 0, reason)
            .await
            .map_err(|e| classify("ban member", e))
    }
}
