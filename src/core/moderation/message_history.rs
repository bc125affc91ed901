// Repeat-flood detection.
//
// Keeps one entry per (author, channel): the last message content, how many
// times in a row it was sent, and the ids of those messages. Entries live for
// `ttl` after the last repeat and are swept periodically so memory stays
// bounded by the number of pairs active inside one window.

use super::moderation_models::{HistoryEntry, HistoryKey, MessageEvent, SpamCheckResult};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;

pub struct MessageHistoryTracker {
    entries: DashMap<HistoryKey, HistoryEntry>,
    threshold: usize,
    ttl: chrono::Duration,
}

impl MessageHistoryTracker {
    pub fn new(threshold: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            threshold: threshold.max(1),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(30)),
        }
    }

    /// Record a message at the current time.
    pub fn record(&self, event: &MessageEvent) -> SpamCheckResult {
        self.record_at(event, Utc::now())
    }

    /// Record a message observed at `now`.
    ///
    /// The map's entry guard is held for the whole read-modify-write, so a
    /// concurrent sweep can never remove an entry halfway through an update.
    pub fn record_at(&self, event: &MessageEvent, now: DateTime<Utc>) -> SpamCheckResult {
        let mut occupied = match self.entries.entry(HistoryKey::of(event)) {
            Entry::Vacant(vacant) => {
                vacant.insert(HistoryEntry::start(&event.content, event.message_id, now));
                return SpamCheckResult::ok();
            }
            Entry::Occupied(occupied) => occupied,
        };
        let entry = occupied.get_mut();

        let fresh = now - entry.last_seen_at < self.ttl;
        if entry.content != event.content || !fresh {
            *entry = HistoryEntry::start(&event.content, event.message_id, now);
            return SpamCheckResult::ok();
        }

        entry.count += 1;
        entry.message_ids.push(event.message_id);
        entry.last_seen_at = now;

        tracing::debug!(
            user_id = event.author_id,
            channel_id = event.channel_id,
            count = entry.count,
            "Repeated message"
        );

        if entry.count >= self.threshold {
            SpamCheckResult::spam(entry.message_ids.clone())
        } else {
            SpamCheckResult::ok()
        }
    }

    /// Forget a key, e.g. after its messages were removed.
    pub fn clear(&self, key: &HistoryKey) {
        self.entries.remove(key);
    }

    /// Drop everything (service shutdown).
    pub fn clear_all(&self) {
        self.entries.clear();
    }

    /// Remove entries idle for longer than the TTL. Returns how many went.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now - entry.last_seen_at <= self.ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn entry(&self, key: &HistoryKey) -> Option<HistoryEntry> {
        self.entries.get(key).map(|e| e.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(message_id: u64, author_id: u64, channel_id: u64, content: &str) -> MessageEvent {
        MessageEvent {
            message_id,
            author_id,
            author_name: "tester".to_string(),
            channel_id,
            guild_id: Some(1),
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[test]
    fn test_spam_exactly_at_threshold() {
        let tracker = MessageHistoryTracker::new(5, Duration::from_secs(30));

        for i in 1..=4u64 {
            let result = tracker.record_at(&event(i, 1, 2, "buy now"), t0() + secs(i as i64));
            assert!(!result.is_spam, "message {} should not be spam", i);
        }

        let result = tracker.record_at(&event(5, 1, 2, "buy now"), t0() + secs(5));
        assert!(result.is_spam);
        assert_eq!(result.message_ids, Some(vec![1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_entry_is_not_reset_after_spam() {
        let tracker = MessageHistoryTracker::new(5, Duration::from_secs(30));
        for i in 1..=6u64 {
            tracker.record_at(&event(i, 1, 2, "again"), t0() + secs(i as i64));
        }

        let entry = tracker.entry(&HistoryKey { author_id: 1, channel_id: 2 }).unwrap();
        assert_eq!(entry.count, 6);
        assert_eq!(entry.message_ids.len(), entry.count);
    }

    #[test]
    fn test_gap_beyond_ttl_resets_count() {
        let tracker = MessageHistoryTracker::new(5, Duration::from_secs(30));
        for i in 1..=4u64 {
            tracker.record_at(&event(i, 1, 2, "hello"), t0() + secs(i as i64));
        }

        let result = tracker.record_at(&event(5, 1, 2, "hello"), t0() + secs(4 + 31));
        assert!(!result.is_spam);

        let entry = tracker.entry(&HistoryKey { author_id: 1, channel_id: 2 }).unwrap();
        assert_eq!(entry.count, 1);
        assert_eq!(entry.message_ids, vec![5]);
    }

    #[test]
    fn test_different_content_resets_count() {
        let tracker = MessageHistoryTracker::new(3, Duration::from_secs(30));
        tracker.record_at(&event(1, 1, 2, "a"), t0());
        tracker.record_at(&event(2, 1, 2, "a"), t0() + secs(1));
        tracker.record_at(&event(3, 1, 2, "b"), t0() + secs(2));
        let result = tracker.record_at(&event(4, 1, 2, "b"), t0() + secs(3));
        assert!(!result.is_spam);

        let entry = tracker.entry(&HistoryKey { author_id: 1, channel_id: 2 }).unwrap();
        assert_eq!(entry.message_ids, vec![3, 4]);
    }

    #[test]
    fn test_keys_are_per_user_and_channel() {
        let tracker = MessageHistoryTracker::new(2, Duration::from_secs(30));
        tracker.record_at(&event(1, 1, 2, "x"), t0());
        assert!(!tracker.record_at(&event(2, 1, 3, "x"), t0()).is_spam);
        assert!(!tracker.record_at(&event(3, 9, 2, "x"), t0()).is_spam);
        assert!(tracker.record_at(&event(4, 1, 2, "x"), t0() + secs(1)).is_spam);
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_repeat_in_same_instant_still_counts() {
        let tracker = MessageHistoryTracker::new(2, Duration::from_secs(30));
        tracker.record_at(&event(1, 1, 2, "x"), t0());
        let result = tracker.record_at(&event(2, 1, 2, "x"), t0());
        assert!(result.is_spam);
        assert_eq!(result.message_ids, Some(vec![1, 2]));
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let tracker = MessageHistoryTracker::new(5, Duration::from_secs(30));
        tracker.record_at(&event(1, 1, 2, "old"), t0());
        tracker.record_at(&event(2, 3, 4, "new"), t0() + secs(50));

        assert_eq!(tracker.sweep_expired_at(t0() + secs(60)), 1);
        assert_eq!(tracker.sweep_expired_at(t0() + secs(60)), 0);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_clear_forgets_key() {
        let tracker = MessageHistoryTracker::new(5, Duration::from_secs(30));
        let e = event(1, 1, 2, "x");
        tracker.record_at(&e, t0());
        tracker.clear(&HistoryKey::of(&e));
        assert_eq!(tracker.len(), 0);
    }
}
