//! Read-through cache for per-channel settings. Entries live until they are
//! explicitly invalidated; a store failure falls back to defaults for that
//! one lookup and is never cached.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{instrument, warn};

use crate::db::models::channel::{ChannelId, ChannelSettings};
use crate::db::store::ChannelStore;

pub struct SettingsCache {
    store: Arc<dyn ChannelStore>,
    entries: RwLock<HashMap<ChannelId, ChannelSettings>>,
}

impl SettingsCache {
    pub fn new(store: Arc<dyn ChannelStore>) -> Self {
        Self {
            store,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the channel's settings, hitting the store only on a cache
    /// miss. Lookup failures yield [`ChannelSettings::default`] so command
    /// handling keeps working while the store is down.
    pub async fn get(&self, channel_id: &ChannelId) -> ChannelSettings {
        let cached = self
            .entries
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(channel_id)
            .cloned();

        if let Some(settings) = cached {
            return settings;
        }

        match self.store.get_channel_settings(channel_id).await {
            Ok(settings) => {
                self.entries
                    .write()
                    .unwrap_or_else(|poison| poison.into_inner())
                    .insert(channel_id.clone(), settings.clone());

                settings
            }
            Err(err) => {
                warn!(%channel_id, error = %err, "settings lookup failed, using defaults");
                ChannelSettings::default()
            }
        }
    }

    /// Drops one channel's entry, or every entry when no channel is given.
    #[instrument(skip(self))]
    pub fn invalidate(&self, channel_id: Option<&ChannelId>) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poison| poison.into_inner());

        match channel_id {
            Some(id) => {
                entries.remove(id);
            }
            None => entries.clear(),
        }
    }

    pub async fn is_command_enabled(&self, channel_id: &ChannelId, command: &str) -> bool {
        !self.get(channel_id).await.is_disabled(command)
    }
}
