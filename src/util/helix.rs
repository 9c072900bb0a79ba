use std::sync::LazyLock;

use http::header::{AUTHORIZATION, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::constants::{API_HELIX_URL, HTTP_REQUEST_TIMEOUT};
use crate::util::env::{EnvErr, Var};
use crate::var;

#[derive(Debug, Clone, Deserialize)]
pub struct HelixDataResponse<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixUser {
    pub id: String,
    pub login: String,
    #[serde(rename = "display_name")]
    pub name: String,
}

static HEADERS: LazyLock<OnceCell<HeaderMap>> = LazyLock::new(OnceCell::new);
static CLIENT: LazyLock<OnceCell<reqwest::Client>> = LazyLock::new(OnceCell::new);

/// Shared HTTP client with the bounded request timeout, built once. A builder
/// failure surfaces to the caller instead of degrading to an unbounded client.
pub async fn http_client() -> HelixResult<&'static reqwest::Client> {
    CLIENT
        .get_or_try_init(|| async {
            Ok(reqwest::Client::builder()
                .timeout(HTTP_REQUEST_TIMEOUT)
                .build()?)
        })
        .await
}

/// App-token bearer headers, built once from the environment.
pub async fn auth_headers() -> HelixResult<&'static HeaderMap> {
    HEADERS
        .get_or_try_init(|| async {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", var!(Var::AppToken).await?))?;
            let client_id = HeaderValue::from_str(var!(Var::ClientId).await?)?;

            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, bearer);
            headers.insert("Client-Id", client_id);

            Ok(headers)
        })
        .await
}

#[instrument(skip(ids), fields(id_count = ids.len()))]
/// Fetch users' Twitch information via their IDs. IDs are stable where logins
/// are not, so this is the only lookup shape the bot uses.
pub async fn fetch_users_by_id(ids: &[String]) -> HelixResult<Vec<HelixUser>> {
    let mut retrieved = Vec::new();

    for chunk in ids.chunks(100) {
        let query: Vec<(&str, &str)> = chunk.iter().map(|id| ("id", id.as_str())).collect();
        let res = http_client()
            .await?
            .get(format!("{API_HELIX_URL}/users"))
            .headers(auth_headers().await?.clone())
            .query(&query)
            .send()
            .await?;

        if res.status() != 200 {
            let status = res.status().to_string();
            if let Ok(body) = res.json::<Value>().await {
                tracing::error!(%status, body = ?body, "helix user fetch rejected");
                return Err(HelixErr::FetchErrWithBody { body });
            }
            return Err(HelixErr::FetchErr(status));
        }

        let page = res.json::<HelixDataResponse<HelixUser>>().await?;
        retrieved.extend(page.data);
    }

    tracing::debug!(fetched_count = retrieved.len(), "fetched helix user data");
    Ok(retrieved)
}

pub type HelixResult<T> = core::result::Result<T, HelixErr>;

#[derive(Debug, Error)]
pub enum HelixErr {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("while parsing environment vars: {0}")]
    EnvError(#[from] EnvErr),

    #[error("while creating a HeaderValue ({0})")]
    HeaderError(#[from] InvalidHeaderValue),

    #[error("error during helix fetch: {0}")]
    FetchErr(String),

    #[error("error (with detail) during helix fetch: {:#?}", body)]
    FetchErrWithBody { body: Value },
}
