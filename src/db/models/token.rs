use serde::{Deserialize, Serialize};

/// One OAuth access/refresh pair per user id. A row existing for a channel id
/// marks that channel as eligible for advanced-tier subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Token {
    pub user_id: String,
    pub token: String,
    pub refresh: String,
}
