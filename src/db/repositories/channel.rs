use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Pool, Postgres};
use tracing::instrument;

use crate::db::PgResult;
use crate::db::models::channel::{ChannelId, ChannelRef, ChannelSettings, SettingsDocument};
use crate::db::store::ChannelStore;

#[derive(Debug)]
pub struct ChannelRepository {
    pool: &'static Pool<Postgres>,
}

impl ChannelRepository {
    pub fn new(pool: &'static PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelStore for ChannelRepository {
    #[instrument(skip(self))]
    async fn get_active_channels(&self) -> PgResult<Vec<ChannelRef>> {
        let rows = sqlx::query_as::<_, ChannelRef>(
            r#"
            SELECT channel_id, channel_name
            FROM channels
            WHERE is_active = true
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn get_channels_with_tokens(&self) -> PgResult<Vec<ChannelRef>> {
        let rows = sqlx::query_as::<_, ChannelRef>(
            r#"
            SELECT c.channel_id, c.channel_name
            FROM channels c
            INNER JOIN tokens t ON c.channel_id = t.user_id
            WHERE c.is_active = true
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn get_channel_settings(&self, channel_id: &ChannelId) -> PgResult<ChannelSettings> {
        let row = sqlx::query_as::<_, (String, Value)>(
            r#"
            SELECT prefix, settings
            FROM channel_settings
            WHERE channel_id = $1
            "#,
        )
        .bind(channel_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(match row {
            Some((prefix, settings)) => {
                // A malformed document degrades to the empty one rather than
                // failing the read path.
                let document: SettingsDocument =
                    serde_json::from_value(settings).unwrap_or_default();
                ChannelSettings {
                    prefix,
                    disabled_commands: document.disabled_commands,
                }
            }
            None => ChannelSettings::default(),
        })
    }

    #[instrument(skip(self, settings))]
    async fn upsert_channel_settings(
        &self,
        channel_id: &ChannelId,
        settings: &ChannelSettings,
    ) -> PgResult<()> {
        let document = serde_json::to_value(SettingsDocument {
            disabled_commands: settings.disabled_commands.clone(),
        })
        .unwrap_or(Value::Null);

        sqlx::query(
            r#"
            INSERT INTO channel_settings (channel_id, prefix, settings)
            VALUES ($1, $2, $3)
            ON CONFLICT (channel_id)
            DO UPDATE SET
                prefix = EXCLUDED.prefix,
                settings = EXCLUDED.settings
            "#,
        )
        .bind(channel_id)
        .bind(&settings.prefix)
        .bind(document)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn add_channel(
        &self,
        channel_id: &ChannelId,
        channel_name: &str,
        added_by: Option<&str>,
    ) -> PgResult<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO channels (channel_id, channel_name, added_by)
            VALUES ($1, $2, $3)
            ON CONFLICT (channel_id) DO NOTHING
            "#,
        )
        .bind(channel_id)
        .bind(channel_name)
        .bind(added_by)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO channel_settings (channel_id)
            VALUES ($1)
            ON CONFLICT (channel_id) DO NOTHING
            "#,
        )
        .bind(channel_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if inserted > 0 {
            tracing::info!(%channel_id, channel_name, "added channel");
        }
        Ok(inserted > 0)
    }

    #[instrument(skip(self))]
    async fn remove_channel(&self, channel_id: &ChannelId) -> PgResult<bool> {
        let affected = sqlx::query(
            r#"
            UPDATE channels
            SET is_active = false, updated_at = NOW()
            WHERE channel_id = $1
            "#,
        )
        .bind(channel_id)
        .execute(self.pool)
        .await?
        .rows_affected();

        Ok(affected > 0)
    }
}
