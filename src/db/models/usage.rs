use std::collections::HashMap;

use chrono::{NaiveDateTime, Utc};

use crate::db::models::channel::ChannelId;

/// A single command invocation, queued in memory until the batcher flushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageEvent {
    pub channel_id: ChannelId,
    pub user_id: String,
    pub command_name: String,
    pub recorded_at: NaiveDateTime,
}

impl UsageEvent {
    pub fn new(
        channel_id: impl Into<ChannelId>,
        user_id: impl Into<String>,
        command_name: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            command_name: command_name.into(),
            recorded_at: Utc::now().naive_utc(),
        }
    }
}

/// Folds raw events into one count per distinct (channel, command) pair so a
/// flush issues a single increment-by-N rather than N increments.
pub fn aggregate_counts(events: &[UsageEvent]) -> HashMap<(ChannelId, String), i64> {
    let mut counts: HashMap<(ChannelId, String), i64> = HashMap::new();
    for event in events {
        *counts
            .entry((event.channel_id.clone(), event.command_name.clone()))
            .or_insert(0) += 1;
    }

    counts
}
