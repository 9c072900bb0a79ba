use std::sync::LazyLock;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::util::env::{self, Var};
use crate::var;

pub mod models;
pub mod repositories;
pub mod schema;
pub mod store;

pub mod prelude {
    pub use crate::db::models::channel::{Channel, ChannelId, ChannelRef, ChannelSettings};
    pub use crate::db::models::token::Token;
    pub use crate::db::models::usage::UsageEvent;

    pub use crate::db::repositories::channel::ChannelRepository;
    pub use crate::db::repositories::token::TokenRepository;
    pub use crate::db::repositories::usage::UsageRepository;
    pub use crate::db::store::{ChannelStore, TokenStore, UsageStore};

    pub use crate::db::{PgError, PgResult, db_pool};
}

static DB_POOL: LazyLock<OnceCell<Db>> = LazyLock::new(OnceCell::new);

pub async fn db_pool() -> PgResult<&'static PgPool> {
    Ok(&DB_POOL
        .get_or_try_init(|| async { Db::new_pool().await })
        .await?
        .pool)
}

struct Db {
    pool: PgPool,
}

impl Db {
    async fn new_pool() -> PgResult<Self> {
        let db_url = var!(Var::DatabaseUrl).await?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(db_url)
            .await?;

        Ok(Self { pool })
    }
}

pub type PgResult<T> = core::result::Result<T, PgError>;

#[derive(Debug, Error)]
pub enum PgError {
    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error("{0}")]
    EnvError(#[from] env::EnvErr),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
