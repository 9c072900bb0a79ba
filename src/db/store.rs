//! Narrow async query boundary the rest of the bot depends on. The sqlx
//! repositories implement these against Postgres; tests swap in in-memory
//! fakes.

use async_trait::async_trait;

use crate::db::PgResult;
use crate::db::models::channel::{ChannelId, ChannelRef, ChannelSettings};
use crate::db::models::token::Token;
use crate::db::models::usage::UsageEvent;

#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn get_active_channels(&self) -> PgResult<Vec<ChannelRef>>;

    /// Active channels that hold an OAuth credential, i.e. the advanced tier.
    async fn get_channels_with_tokens(&self) -> PgResult<Vec<ChannelRef>>;

    async fn get_channel_settings(&self, channel_id: &ChannelId) -> PgResult<ChannelSettings>;

    async fn upsert_channel_settings(
        &self,
        channel_id: &ChannelId,
        settings: &ChannelSettings,
    ) -> PgResult<()>;

    /// Inserts the channel and its default settings row in one transaction.
    /// Returns `false` when the channel already existed.
    async fn add_channel(
        &self,
        channel_id: &ChannelId,
        channel_name: &str,
        added_by: Option<&str>,
    ) -> PgResult<bool>;

    /// Soft delete: flips `is_active`, never erases history.
    async fn remove_channel(&self, channel_id: &ChannelId) -> PgResult<bool>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn has_tokens(&self) -> PgResult<bool>;
    async fn upsert_token(&self, user_id: &str, token: &str, refresh: &str) -> PgResult<()>;
    async fn load_tokens(&self) -> PgResult<Vec<Token>>;

    /// Bulk reset used for full re-authorization; the only path that deletes
    /// credential rows.
    async fn clear_tokens(&self) -> PgResult<u64>;
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Commits the whole batch atomically: per-event `last_used` upserts plus
    /// counter updates pre-aggregated by (channel, command).
    async fn record_usage_batch(&self, events: &[UsageEvent]) -> PgResult<()>;
}
