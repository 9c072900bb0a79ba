use async_trait::async_trait;
use sqlx::{PgPool, Pool, Postgres};
use tracing::instrument;

use crate::db::PgResult;
use crate::db::models::usage::{UsageEvent, aggregate_counts};
use crate::db::store::UsageStore;

#[derive(Debug)]
pub struct UsageRepository {
    pool: &'static Pool<Postgres>,
}

impl UsageRepository {
    pub fn new(pool: &'static PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageStore for UsageRepository {
    #[instrument(skip(self, events), fields(event_count = events.len()))]
    async fn record_usage_batch(&self, events: &[UsageEvent]) -> PgResult<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO command_usage (channel_id, user_id, command_name, last_used)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (channel_id, user_id, command_name)
                DO UPDATE SET last_used = EXCLUDED.last_used
                "#,
            )
            .bind(&event.channel_id)
            .bind(&event.user_id)
            .bind(&event.command_name)
            .bind(event.recorded_at)
            .execute(&mut *tx)
            .await?;
        }

        // One counter update per distinct (channel, command) pair.
        for ((channel_id, command_name), count) in aggregate_counts(events) {
            sqlx::query(
                r#"
                INSERT INTO command_stats (channel_id, command_name, use_count, last_used)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (channel_id, command_name)
                DO UPDATE SET
                    use_count = command_stats.use_count + EXCLUDED.use_count,
                    last_used = NOW()
                "#,
            )
            .bind(&channel_id)
            .bind(&command_name)
            .bind(count)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(flushed = events.len(), "flushed usage records");
        Ok(())
    }
}
