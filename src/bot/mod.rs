//! Orchestration layer tying the stores, the settings cache, the usage
//! batcher and the subscription reconciler together behind one handle.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use crate::cache::settings::SettingsCache;
use crate::cache::usage::UsageBatcher;
use crate::constants::{LOW_BUDGET_THRESHOLD, MAX_PREFIX_LEN, PROTECTED_COMMANDS};
use crate::db::PgError;
use crate::db::models::channel::{ChannelId, ChannelSettings};
use crate::db::models::usage::UsageEvent;
use crate::db::store::{ChannelStore, TokenStore, UsageStore};
use crate::eventsub::manager::EventSubManager;
use crate::eventsub::payload::{ChatMessageEvent, EventPayload, Notification, TransportFrame};
use crate::eventsub::transport::EventSubTransport;
use crate::util::env::Var;
use crate::util::helix::{self, HelixErr};
use crate::var;

pub type BotResult<T> = core::result::Result<T, BotError>;

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Db(#[from] PgError),

    #[error("{0}")]
    Helix(#[from] HelixErr),

    #[error("invalid prefix {0:?}: 1 to {MAX_PREFIX_LEN} characters, no whitespace")]
    InvalidPrefix(String),

    #[error("command {0:?} is protected and cannot be disabled")]
    ProtectedCommand(String),

    #[error("no twitch account found for id {0}")]
    UnknownUser(String),
}

pub struct Service {
    channels: Arc<dyn ChannelStore>,
    tokens: Arc<dyn TokenStore>,
    transport: Arc<dyn EventSubTransport>,
    settings: SettingsCache,
    usage: UsageBatcher,
    manager: EventSubManager,
    initialized: Mutex<bool>,
}

impl Service {
    pub fn new(
        channels: Arc<dyn ChannelStore>,
        tokens: Arc<dyn TokenStore>,
        usage_store: Arc<dyn UsageStore>,
        transport: Arc<dyn EventSubTransport>,
    ) -> Self {
        Self {
            settings: SettingsCache::new(channels.clone()),
            usage: UsageBatcher::new(usage_store),
            manager: EventSubManager::new(channels.clone(), transport.clone()),
            channels,
            tokens,
            transport,
            initialized: Mutex::new(false),
        }
    }

    /// One-time startup: register the owner's channel, check the quota
    /// headroom, then run the first full reconciliation pass. Concurrent
    /// callers serialize on the gate and every caller after the first
    /// successful run is a no-op.
    #[instrument(skip(self))]
    pub async fn initialize_services(&self) -> BotResult<()> {
        let mut initialized = self.initialized.lock().await;
        if *initialized {
            return Ok(());
        }

        self.ensure_default_channel().await?;

        let budget = self.manager.check_cost_budget().await;
        if budget.remaining() < LOW_BUDGET_THRESHOLD {
            warn!(
                remaining = budget.remaining(),
                max = budget.max_total_cost,
                "eventsub cost budget is nearly exhausted"
            );
        }

        self.manager.reconcile(None, false, false).await?;
        *initialized = true;
        Ok(())
    }

    /// Best effort: a missing owner id or a failed lookup is logged and
    /// retried on the next startup rather than blocking initialization.
    async fn ensure_default_channel(&self) -> BotResult<()> {
        let owner_id = match var!(Var::OwnerId).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "owner id unavailable, skipping default channel");
                return Ok(());
            }
        };

        match helix::fetch_users_by_id(&[owner_id.to_string()]).await {
            Ok(users) if !users.is_empty() => {
                let id = ChannelId::from(owner_id);
                if self.channels.add_channel(&id, &users[0].login, None).await? {
                    info!(channel_name = %users[0].login, "registered owner channel");
                }
            }
            Ok(_) => warn!(owner_id, "owner account not found on helix"),
            Err(e) => warn!(error = %e, "owner lookup failed, skipping default channel"),
        }

        Ok(())
    }

    /// Stores a user OAuth credential. The first token triggers full
    /// initialization; later tokens upgrade an already chat-subscribed
    /// channel to the advanced tier.
    #[instrument(skip(self, token, refresh))]
    pub async fn add_token(&self, user_id: &str, token: &str, refresh: &str) -> BotResult<()> {
        self.tokens.upsert_token(user_id, token, refresh).await?;

        if !*self.initialized.lock().await {
            return self.initialize_services().await;
        }

        self.manager
            .reconcile(Some(&ChannelId::from(user_id)), true, false)
            .await?;
        Ok(())
    }

    /// Drops every stored credential, forcing full re-authorization.
    pub async fn reset_tokens(&self) -> BotResult<u64> {
        let cleared = self.tokens.clear_tokens().await?;
        info!(cleared, "cleared stored tokens");
        Ok(cleared)
    }

    /// Registers a channel already resolved to an id/name pair and brings up
    /// its subscriptions. Returns `false` when the channel was known.
    #[instrument(skip(self))]
    pub async fn add_channel(
        &self,
        channel_id: &ChannelId,
        channel_name: &str,
        added_by: Option<&str>,
    ) -> BotResult<bool> {
        if !self.channels.add_channel(channel_id, channel_name, added_by).await? {
            debug!(%channel_id, "channel already registered");
            return Ok(false);
        }

        self.manager.reconcile(Some(channel_id), false, false).await?;
        Ok(true)
    }

    /// Id-only variant for callers that have not resolved the channel name.
    pub async fn add_channel_by_id(
        &self,
        channel_id: &ChannelId,
        added_by: Option<&str>,
    ) -> BotResult<bool> {
        let users = helix::fetch_users_by_id(&[channel_id.to_string()]).await?;
        let user = users
            .first()
            .ok_or_else(|| BotError::UnknownUser(channel_id.to_string()))?;

        self.add_channel(channel_id, &user.login, added_by).await
    }

    /// Deactivates a channel and drops its cached settings. Its live
    /// subscriptions are left to lapse with the session.
    #[instrument(skip(self))]
    pub async fn remove_channel(&self, channel_id: &ChannelId) -> BotResult<bool> {
        let removed = self.channels.remove_channel(channel_id).await?;
        if removed {
            self.settings.invalidate(Some(channel_id));
            info!(%channel_id, "channel deactivated");
        }

        Ok(removed)
    }

    #[instrument(skip(self))]
    pub async fn set_prefix(&self, channel_id: &ChannelId, prefix: &str) -> BotResult<()> {
        let length = prefix.chars().count();
        if length == 0 || length > MAX_PREFIX_LEN || prefix.chars().any(char::is_whitespace) {
            return Err(BotError::InvalidPrefix(prefix.to_string()));
        }

        let mut settings = self.channels.get_channel_settings(channel_id).await?;
        settings.prefix = prefix.to_string();
        self.channels
            .upsert_channel_settings(channel_id, &settings)
            .await?;
        self.settings.invalidate(Some(channel_id));
        Ok(())
    }

    /// Disables a command for one channel. Returns `false` when it was
    /// already disabled.
    #[instrument(skip(self))]
    pub async fn disable_command(&self, channel_id: &ChannelId, command: &str) -> BotResult<bool> {
        let command = command.to_lowercase();
        if PROTECTED_COMMANDS.contains(&command.as_str()) {
            return Err(BotError::ProtectedCommand(command));
        }

        let mut settings = self.channels.get_channel_settings(channel_id).await?;
        if !settings.disabled_commands.insert(command) {
            return Ok(false);
        }

        self.channels
            .upsert_channel_settings(channel_id, &settings)
            .await?;
        self.settings.invalidate(Some(channel_id));
        Ok(true)
    }

    /// Re-enables a command. Returns `false` when it was not disabled.
    #[instrument(skip(self))]
    pub async fn enable_command(&self, channel_id: &ChannelId, command: &str) -> BotResult<bool> {
        let command = command.to_lowercase();
        let mut settings = self.channels.get_channel_settings(channel_id).await?;
        if !settings.disabled_commands.remove(&command) {
            return Ok(false);
        }

        self.channels
            .upsert_channel_settings(channel_id, &settings)
            .await?;
        self.settings.invalidate(Some(channel_id));
        Ok(true)
    }

    /// Cached settings for dispatch; defaults when the store is unreachable.
    pub async fn channel_settings(&self, channel_id: &ChannelId) -> ChannelSettings {
        self.settings.get(channel_id).await
    }

    pub async fn is_command_enabled(&self, channel_id: &ChannelId, command: &str) -> bool {
        self.settings.is_command_enabled(channel_id, command).await
    }

    pub fn invalidate_settings_cache(&self, channel_id: Option<&ChannelId>) {
        self.settings.invalidate(channel_id);
    }

    pub async fn record_usage(&self, channel_id: &ChannelId, user_id: &str, command: &str) {
        self.usage
            .record(UsageEvent::new(channel_id.clone(), user_id, command))
            .await;
    }

    /// Entry point for every decoded websocket frame.
    pub async fn handle_frame(&self, frame: TransportFrame) {
        match frame {
            TransportFrame::Welcome { session_id } => {
                self.transport.set_session(&session_id);
                self.manager.handle_reconnect().await;
            }
            TransportFrame::Keepalive => trace!("keepalive"),
            TransportFrame::Reconnect { reconnect_url } => {
                // The socket loop performs the actual reconnection; the new
                // welcome frame re-runs reconciliation.
                info!(reconnect_url, "reconnect requested by upstream");
            }
            TransportFrame::Revocation { kind } => {
                warn!(%kind, "subscription revoked by upstream");
            }
            TransportFrame::Notification(notification) => self.handle_notification(notification).await,
        }
    }

    async fn handle_notification(&self, notification: Notification) {
        match notification.event {
            EventPayload::ChatMessage(chat) => self.handle_chat(chat).await,
            EventPayload::StreamOnline(event) => {
                info!(channel_name = %event.broadcaster_user_name, "stream went live");
            }
            EventPayload::Raid(event) => {
                info!(
                    from = %event.from_broadcaster_user_name,
                    viewers = event.viewers,
                    "incoming raid"
                );
            }
            EventPayload::Follow(event) => {
                debug!(user_name = %event.user_name, "new follower");
            }
            EventPayload::Subscribe(event) => {
                info!(user_name = %event.user_name, tier = %event.tier, "new subscription");
            }
            EventPayload::SubscriptionGift(event) => {
                info!(
                    gifter = event.user_name.as_deref().unwrap_or("anonymous"),
                    total = event.total,
                    "gifted subscriptions"
                );
            }
            EventPayload::RedemptionAdd(event) => {
                info!(
                    user_name = %event.user_name,
                    reward = %event.reward.title,
                    "channel point redemption"
                );
            }
        }
    }

    /// Prefix-gates a chat message and records usage for enabled commands.
    async fn handle_chat(&self, chat: ChatMessageEvent) {
        let channel_id = ChannelId::from(chat.broadcaster_user_id.as_str());
        let settings = self.channel_settings(&channel_id).await;

        let Some(rest) = chat.message.text.strip_prefix(&settings.prefix) else {
            return;
        };
        let Some(command) = rest.split_whitespace().next() else {
            return;
        };

        let command = command.to_lowercase();
        if settings.is_disabled(&command) {
            debug!(%channel_id, command, "ignoring disabled command");
            return;
        }

        self.record_usage(&channel_id, &chat.chatter_user_id, &command)
            .await;
    }

    /// Flushes buffered usage before the process exits.
    pub async fn shutdown(&self) {
        let pending = self.usage.pending().await;
        if pending > 0 {
            info!(pending, "flushing usage buffer before shutdown");
        }

        self.usage.flush().await;
    }
}
