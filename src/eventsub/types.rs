use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::DEFAULT_MAX_TOTAL_COST;
use crate::db::models::channel::ChannelId;

#[derive(Debug, Error)]
pub enum KindError {
    #[error("unknown subscription kind: {0}")]
    Conversion(String),
}

/// Every notification class the bot subscribes to, split across the two
/// authorization tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    ChatMessage,
    StreamOnline,
    Raid,
    Follow,
    Subscribe,
    SubscriptionGift,
    RedemptionAdd,
}

/// Issue order matters for the basic tier only in that chat comes first; the
/// advanced tier order is the fixed cost-sensitivity order the reconciler
/// walks per channel.
pub const BASIC_TIER: &[SubscriptionKind] = &[
    SubscriptionKind::ChatMessage,
    SubscriptionKind::StreamOnline,
    SubscriptionKind::Raid,
];

pub const ADVANCED_TIER: &[SubscriptionKind] = &[
    SubscriptionKind::Follow,
    SubscriptionKind::Subscribe,
    SubscriptionKind::SubscriptionGift,
    SubscriptionKind::RedemptionAdd,
];

impl SubscriptionKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ChatMessage => "channel.chat.message",
            Self::StreamOnline => "stream.online",
            Self::Raid => "channel.raid",
            Self::Follow => "channel.follow",
            Self::Subscribe => "channel.subscribe",
            Self::SubscriptionGift => "channel.subscription.gift",
            Self::RedemptionAdd => "channel.channel_points_custom_reward_redemption.add",
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            Self::Follow => "2",
            _ => "1",
        }
    }

    /// Builds the condition shape this kind requires. Chat needs the reading
    /// user, follow needs a moderator, raid keys on the receiving side.
    pub fn condition(&self, broadcaster_id: &ChannelId, bot_id: &str) -> Condition {
        let mut condition = Condition::default();
        match self {
            Self::Raid => {
                condition.to_broadcaster_user_id = Some(broadcaster_id.to_string());
            }
            Self::ChatMessage => {
                condition.broadcaster_user_id = Some(broadcaster_id.to_string());
                condition.user_id = Some(bot_id.to_string());
            }
            Self::Follow => {
                condition.broadcaster_user_id = Some(broadcaster_id.to_string());
                condition.moderator_user_id = Some(bot_id.to_string());
            }
            _ => {
                condition.broadcaster_user_id = Some(broadcaster_id.to_string());
            }
        }

        condition
    }
}

impl core::fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.event_type())
    }
}

impl core::str::FromStr for SubscriptionKind {
    type Err = KindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channel.chat.message" => Ok(Self::ChatMessage),
            "stream.online" => Ok(Self::StreamOnline),
            "channel.raid" => Ok(Self::Raid),
            "channel.follow" => Ok(Self::Follow),
            "channel.subscribe" => Ok(Self::Subscribe),
            "channel.subscription.gift" => Ok(Self::SubscriptionGift),
            "channel.channel_points_custom_reward_redemption.add" => Ok(Self::RedemptionAdd),
            _ => Err(KindError::Conversion(s.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Condition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcaster_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderator_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_broadcaster_user_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WebsocketTransport {
    pub method: String,
    pub session_id: String,
}

impl WebsocketTransport {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            method: "websocket".to_string(),
            session_id: session_id.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubscriptionRequest {
    pub r#type: String,
    pub version: String,
    pub condition: Condition,
    pub transport: WebsocketTransport,
}

impl SubscriptionRequest {
    pub fn new(
        kind: SubscriptionKind,
        broadcaster_id: &ChannelId,
        bot_id: &str,
        session_id: &str,
    ) -> Self {
        Self {
            r#type: kind.event_type().to_string(),
            version: kind.version().to_string(),
            condition: kind.condition(broadcaster_id, bot_id),
            transport: WebsocketTransport::new(session_id),
        }
    }
}

/// Quota snapshot reported by the subscriptions endpoint. Advisory only;
/// re-queried (or defaulted) per reconciliation pass, never cached across
/// passes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostBudget {
    pub total: i64,
    pub total_cost: i64,
    pub max_total_cost: i64,
}

impl CostBudget {
    pub fn remaining(&self) -> i64 {
        self.max_total_cost - self.total_cost
    }
}

impl Default for CostBudget {
    /// Conservative empty-usage snapshot used when the upstream query is
    /// unavailable; safer than blocking startup on an accurate figure.
    fn default() -> Self {
        Self {
            total: 0,
            total_cost: 0,
            max_total_cost: DEFAULT_MAX_TOTAL_COST,
        }
    }
}
