use sqlx::PgPool;
use tracing::instrument;

use crate::db::PgResult;

/// Bootstrap DDL, applied at startup. Every statement is idempotent so the
/// bot can run it unconditionally on every boot.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS channels (
        channel_id   TEXT PRIMARY KEY,
        channel_name TEXT NOT NULL,
        is_active    BOOLEAN NOT NULL DEFAULT true,
        added_by     TEXT,
        created_at   TIMESTAMP NOT NULL DEFAULT NOW(),
        updated_at   TIMESTAMP NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS channel_settings (
        channel_id TEXT PRIMARY KEY REFERENCES channels(channel_id),
        prefix     TEXT NOT NULL DEFAULT '!',
        settings   JSONB NOT NULL DEFAULT '{}'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tokens (
        user_id TEXT PRIMARY KEY,
        token   TEXT NOT NULL,
        refresh TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS command_usage (
        channel_id   TEXT NOT NULL,
        user_id      TEXT NOT NULL,
        command_name TEXT NOT NULL,
        last_used    TIMESTAMP NOT NULL DEFAULT NOW(),
        PRIMARY KEY (channel_id, user_id, command_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS command_stats (
        channel_id   TEXT NOT NULL,
        command_name TEXT NOT NULL,
        use_count    BIGINT NOT NULL DEFAULT 0,
        last_used    TIMESTAMP NOT NULL DEFAULT NOW(),
        PRIMARY KEY (channel_id, command_name)
    )
    "#,
];

#[instrument(skip(pool))]
pub async fn load_schema(pool: &PgPool) -> PgResult<()> {
    for ddl in SCHEMA {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::debug!(statement_count = SCHEMA.len(), "schema bootstrap complete");
    Ok(())
}
