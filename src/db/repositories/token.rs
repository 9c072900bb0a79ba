use async_trait::async_trait;
use sqlx::{PgPool, Pool, Postgres};
use tracing::instrument;

use crate::db::PgResult;
use crate::db::models::token::Token;
use crate::db::store::TokenStore;

#[derive(Debug)]
pub struct TokenRepository {
    pool: &'static Pool<Postgres>,
}

impl TokenRepository {
    pub fn new(pool: &'static PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for TokenRepository {
    #[instrument(skip(self))]
    async fn has_tokens(&self) -> PgResult<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tokens")
            .fetch_one(self.pool)
            .await?;

        Ok(count > 0)
    }

    #[instrument(skip(self, token, refresh))]
    async fn upsert_token(&self, user_id: &str, token: &str, refresh: &str) -> PgResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (user_id, token, refresh)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET
                token = EXCLUDED.token,
                refresh = EXCLUDED.refresh
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(refresh)
        .execute(self.pool)
        .await?;

        tracing::info!(user_id, "stored token");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_tokens(&self) -> PgResult<Vec<Token>> {
        let rows = sqlx::query_as::<_, Token>("SELECT user_id, token, refresh FROM tokens")
            .fetch_all(self.pool)
            .await?;

        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn clear_tokens(&self) -> PgResult<u64> {
        let cleared = sqlx::query("DELETE FROM tokens")
            .execute(self.pool)
            .await?
            .rows_affected();

        tracing::info!(cleared, "cleared tokens from database");
        Ok(cleared)
    }
}
