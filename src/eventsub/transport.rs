use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::constants::API_HELIX_URL;
use crate::db::models::channel::ChannelId;
use crate::eventsub::types::{CostBudget, SubscriptionKind, SubscriptionRequest};
use crate::util::helix::{self, HelixErr};

pub type SubscribeResult<T> = core::result::Result<T, SubscribeError>;

/// Subscription failures, classified so the reconciler can decide between
/// skip, halt and plain logging.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("subscription already exists")]
    AlreadyExists,

    #[error("subscription cost limit reached")]
    QuotaExceeded,

    #[error("missing required authorization scope")]
    MissingScope,

    #[error("websocket transport session is gone")]
    SessionInvalid,

    #[error("no websocket session established yet")]
    NoSession,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Helix(#[from] HelixErr),

    #[error("subscription rejected ({status}): {body}")]
    Rejected { status: u16, body: Value },
}

/// Maps an error response onto the taxonomy. Status codes take priority;
/// message substrings cover the cases Helix reports behind a generic code.
pub fn classify(status: u16, body: Value) -> SubscribeError {
    let message = body["message"].as_str().unwrap_or_default().to_lowercase();

    match status {
        409 => SubscribeError::AlreadyExists,
        429 => SubscribeError::QuotaExceeded,
        401 | 403 => SubscribeError::MissingScope,
        _ if message.contains("already exists") => SubscribeError::AlreadyExists,
        _ if message.contains("cost exceeded") || message.contains("exceeds the limit") => {
            SubscribeError::QuotaExceeded
        }
        _ if message.contains("authorization") || message.contains("scope") => {
            SubscribeError::MissingScope
        }
        _ if message.contains("transport session") || message.contains("disconnected") => {
            SubscribeError::SessionInvalid
        }
        _ => SubscribeError::Rejected { status, body },
    }
}

#[async_trait]
pub trait EventSubTransport: Send + Sync {
    /// Issues one subscription for one channel over the live websocket
    /// session.
    async fn subscribe(&self, kind: SubscriptionKind, broadcaster: &ChannelId)
    -> SubscribeResult<()>;

    /// Current quota snapshot from the subscriptions endpoint.
    async fn budget(&self) -> SubscribeResult<CostBudget>;

    /// Adopts the session id from the most recent welcome frame.
    fn set_session(&self, session_id: &str);
}

pub struct HelixTransport {
    bot_id: String,
    session: RwLock<Option<String>>,
}

impl HelixTransport {
    pub fn new(bot_id: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
            session: RwLock::new(None),
        }
    }

    fn current_session(&self) -> SubscribeResult<String> {
        self.session
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
            .ok_or(SubscribeError::NoSession)
    }
}

#[async_trait]
impl EventSubTransport for HelixTransport {
    #[instrument(skip(self))]
    async fn subscribe(
        &self,
        kind: SubscriptionKind,
        broadcaster: &ChannelId,
    ) -> SubscribeResult<()> {
        let session_id = self.current_session()?;
        let request = SubscriptionRequest::new(kind, broadcaster, &self.bot_id, &session_id);

        let res = helix::http_client()
            .await?
            .post(format!("{API_HELIX_URL}/eventsub/subscriptions"))
            .headers(helix::auth_headers().await?.clone())
            .json(&request)
            .send()
            .await?;

        let status = res.status().as_u16();
        if status == 200 || status == 202 {
            tracing::debug!(%kind, %broadcaster, "subscription created");
            return Ok(());
        }

        let body = res.json::<Value>().await.unwrap_or(Value::Null);
        Err(classify(status, body))
    }

    #[instrument(skip(self))]
    async fn budget(&self) -> SubscribeResult<CostBudget> {
        let res = helix::http_client()
            .await?
            .get(format!("{API_HELIX_URL}/eventsub/subscriptions"))
            .headers(helix::auth_headers().await?.clone())
            .send()
            .await?;

        let status = res.status().as_u16();
        if status != 200 {
            let body = res.json::<Value>().await.unwrap_or(Value::Null);
            return Err(classify(status, body));
        }

        // The list response carries the quota fields at the top level; the
        // data array itself is irrelevant here.
        Ok(res.json::<CostBudget>().await?)
    }

    fn set_session(&self, session_id: &str) {
        let mut session = self
            .session
            .write()
            .unwrap_or_else(|poison| poison.into_inner());

        *session = Some(session_id.to_string());
        tracing::debug!(session_id, "adopted websocket session");
    }
}
