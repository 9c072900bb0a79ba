use core::fmt;
use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_PREFIX;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct ChannelId(pub String);

impl From<String> for ChannelId {
    fn from(value: String) -> Self {
        ChannelId(value)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        ChannelId(value.to_string())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Base channel table model.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Channel {
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub is_active: bool,
    pub added_by: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// The id/name pair the reconciler works over; everything else on the row is
/// irrelevant to subscription management.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ChannelRef {
    pub channel_id: ChannelId,
    pub channel_name: String,
}

impl ChannelRef {
    pub fn new(id: impl Into<ChannelId>, name: impl Into<String>) -> Self {
        Self {
            channel_id: id.into(),
            channel_name: name.into(),
        }
    }
}

/// Per-channel configuration. Persisted as a `prefix` column plus a JSONB
/// `settings` document; unknown keys in the document survive a round trip on
/// the read side but are not rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub prefix: String,
    #[serde(default)]
    pub disabled_commands: BTreeSet<String>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            disabled_commands: BTreeSet::new(),
        }
    }
}

impl ChannelSettings {
    pub fn is_disabled(&self, command: &str) -> bool {
        self.disabled_commands.contains(command)
    }
}

/// Shape of the JSONB `settings` column.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SettingsDocument {
    #[serde(default)]
    pub disabled_commands: BTreeSet<String>,
}
