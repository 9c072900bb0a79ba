use std::time::Duration;

pub const API_HELIX_URL: &str = "https://api.twitch.tv/helix";
pub const EVENTSUB_WS_URL: &str = "wss://eventsub.wss.twitch.tv/ws";

pub const DEFAULT_PREFIX: &str = "!";
pub const MAX_PREFIX_LEN: usize = 5;

/// Commands the settings layer refuses to disable so that a channel can
/// always dig itself back out.
pub const PROTECTED_COMMANDS: &[&str] = &["help", "prefix", "enable", "disable"];

pub const USAGE_BATCH_SIZE: usize = 50;
pub const USAGE_BATCH_MAX_AGE: Duration = Duration::from_secs(30);

/// Welcome frames arrive in bursts after a dropped socket; passes within this
/// window collapse into one.
pub const RECONNECT_DEBOUNCE: Duration = Duration::from_secs(10);

pub const SOCKET_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Helix default when the budget endpoint is unavailable.
pub const DEFAULT_MAX_TOTAL_COST: i64 = 10_000;
pub const LOW_BUDGET_THRESHOLD: i64 = 100;
