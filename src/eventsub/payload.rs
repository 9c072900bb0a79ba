//! Typed adaptation layer for raw EventSub websocket traffic. Every frame and
//! event kind parses into a fixed-shape variant; anything unrecognized is a
//! classified parse error rather than a silently defaulted value.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::eventsub::types::{KindError, SubscriptionKind};

pub type PayloadResult<T> = core::result::Result<T, PayloadError>;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("frame deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    UnknownKind(#[from] KindError),

    #[error("unknown frame type: {0}")]
    UnknownFrame(String),

    #[error("notification frame without a subscription type")]
    MissingSubscriptionType,
}

/// One decoded websocket frame.
#[derive(Debug, Clone)]
pub enum TransportFrame {
    Welcome { session_id: String },
    Keepalive,
    Reconnect { reconnect_url: String },
    Revocation { kind: SubscriptionKind },
    Notification(Notification),
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: SubscriptionKind,
    pub event: EventPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessageText {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessageEvent {
    pub broadcaster_user_id: String,
    pub chatter_user_id: String,
    pub chatter_user_name: String,
    pub message: ChatMessageText,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamOnlineEvent {
    pub broadcaster_user_id: String,
    pub broadcaster_user_name: String,
    pub started_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RaidEvent {
    pub from_broadcaster_user_id: String,
    pub from_broadcaster_user_name: String,
    pub to_broadcaster_user_id: String,
    pub viewers: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowEvent {
    pub user_id: String,
    pub user_name: String,
    pub broadcaster_user_id: String,
    pub followed_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeEvent {
    pub user_id: String,
    pub user_name: String,
    pub broadcaster_user_id: String,
    pub tier: String,
    pub is_gift: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionGiftEvent {
    // Anonymous gifts carry no gifter identity.
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub broadcaster_user_id: String,
    pub total: i64,
    pub tier: String,
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedemptionReward {
    pub id: String,
    pub title: String,
    pub cost: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedemptionAddEvent {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub broadcaster_user_id: String,
    #[serde(default)]
    pub user_input: String,
    pub status: String,
    pub reward: RedemptionReward,
}

/// Discriminated event union; one variant per subscribed kind.
#[derive(Debug, Clone)]
pub enum EventPayload {
    ChatMessage(ChatMessageEvent),
    StreamOnline(StreamOnlineEvent),
    Raid(RaidEvent),
    Follow(FollowEvent),
    Subscribe(SubscribeEvent),
    SubscriptionGift(SubscriptionGiftEvent),
    RedemptionAdd(RedemptionAddEvent),
}

impl EventPayload {
    fn from_value(kind: SubscriptionKind, event: Value) -> PayloadResult<Self> {
        Ok(match kind {
            SubscriptionKind::ChatMessage => Self::ChatMessage(serde_json::from_value(event)?),
            SubscriptionKind::StreamOnline => Self::StreamOnline(serde_json::from_value(event)?),
            SubscriptionKind::Raid => Self::Raid(serde_json::from_value(event)?),
            SubscriptionKind::Follow => Self::Follow(serde_json::from_value(event)?),
            SubscriptionKind::Subscribe => Self::Subscribe(serde_json::from_value(event)?),
            SubscriptionKind::SubscriptionGift => {
                Self::SubscriptionGift(serde_json::from_value(event)?)
            }
            SubscriptionKind::RedemptionAdd => Self::RedemptionAdd(serde_json::from_value(event)?),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    metadata: RawMetadata,
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    message_type: String,
    #[serde(default)]
    subscription_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSessionPayload {
    session: RawSession,
}

#[derive(Debug, Deserialize)]
struct RawSession {
    id: String,
    #[serde(default)]
    reconnect_url: Option<String>,
}

pub fn parse_frame(text: &str) -> PayloadResult<TransportFrame> {
    let frame: RawFrame = serde_json::from_str(text)?;

    match frame.metadata.message_type.as_str() {
        "session_welcome" => {
            let payload: RawSessionPayload = serde_json::from_value(frame.payload)?;
            Ok(TransportFrame::Welcome {
                session_id: payload.session.id,
            })
        }
        "session_keepalive" => Ok(TransportFrame::Keepalive),
        "session_reconnect" => {
            let payload: RawSessionPayload = serde_json::from_value(frame.payload)?;
            Ok(TransportFrame::Reconnect {
                reconnect_url: payload.session.reconnect_url.unwrap_or_default(),
            })
        }
        "revocation" => {
            let kind = subscription_kind(&frame)?;
            Ok(TransportFrame::Revocation { kind })
        }
        "notification" => {
            let kind = subscription_kind(&frame)?;
            let event = EventPayload::from_value(kind, frame.payload["event"].clone())?;
            Ok(TransportFrame::Notification(Notification { kind, event }))
        }
        other => Err(PayloadError::UnknownFrame(other.to_string())),
    }
}

fn subscription_kind(frame: &RawFrame) -> PayloadResult<SubscriptionKind> {
    let raw = frame
        .metadata
        .subscription_type
        .as_deref()
        .or_else(|| frame.payload["subscription"]["type"].as_str())
        .ok_or(PayloadError::MissingSubscriptionType)?;

    Ok(raw.parse()?)
}
