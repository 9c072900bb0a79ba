use std::sync::Arc;

use thiserror::Error;

use crate::bot::{BotError, Service};
use crate::db::prelude::*;
use crate::eventsub::transport::HelixTransport;
use crate::util::env::{EnvErr, Var};

mod bot;
mod cache;
mod constants;
mod db;
mod eventsub;
mod socket;
#[cfg(test)]
mod testing;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Db(#[from] PgError),

    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error("{0}")]
    Bot(#[from] BotError),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    util::tracing::init();
    tracing::info!("starting nii-bot");

    let pool = db_pool().await?;
    db::schema::load_schema(pool).await?;

    let bot_id = var!(Var::BotId).await?.to_string();
    let transport = Arc::new(HelixTransport::new(bot_id));

    let tokens = Arc::new(TokenRepository::new(pool));
    let has_tokens = tokens.has_tokens().await?;

    let service = Arc::new(Service::new(
        Arc::new(ChannelRepository::new(pool)),
        tokens,
        Arc::new(UsageRepository::new(pool)),
        transport,
    ));

    if has_tokens {
        service.initialize_services().await?;
    } else {
        tracing::warn!("no stored tokens, waiting for the first authorization");
    }

    let socket_handle = tokio::spawn(socket::run(service.clone()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    socket_handle.abort();
    service.shutdown().await;
    Ok(())
}
