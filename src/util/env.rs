use std::sync::LazyLock;

use thiserror::Error;
use tokio::sync::OnceCell;

static ENV_VARS: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);

pub async fn get_var(var: Var) -> EnvResult<&'static str> {
    let vars = ENV_VARS.get_or_try_init(|| async { Env::load() }).await?;
    Ok(match var {
        Var::ClientId => &vars.client_id,
        Var::ClientSecret => &vars.client_secret,
        Var::AppToken => &vars.app_token,
        Var::BotId => &vars.bot_id,
        Var::OwnerId => &vars.owner_id,
        Var::DatabaseUrl => &vars.database_url,
    })
}

#[derive(Debug, Clone)]
pub struct Env {
    pub client_id: String,
    pub client_secret: String,
    pub app_token: String,
    pub bot_id: String,
    pub owner_id: String,
    pub database_url: String,
}

impl Env {
    fn load() -> EnvResult<Self> {
        Ok(Self {
            client_id: dotenvy::var("CLIENT_ID")?,
            client_secret: dotenvy::var("CLIENT_SECRET")?,
            app_token: dotenvy::var("APP_TOKEN")?,
            bot_id: dotenvy::var("BOT_ID")?,
            owner_id: dotenvy::var("OWNER_ID")?,
            database_url: dotenvy::var("DATABASE_URL")?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Var {
    ClientId,
    ClientSecret,
    AppToken,
    BotId,
    OwnerId,
    DatabaseUrl,
}

#[macro_export]
macro_rules! var {
    ($ev:expr) => {
        $crate::util::env::get_var($ev)
    };
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),
}
