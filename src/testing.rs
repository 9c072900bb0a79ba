//! In-memory fakes for the store and transport seams, shared by the module
//! tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::db::models::channel::{ChannelId, ChannelRef, ChannelSettings};
use crate::db::models::token::Token;
use crate::db::models::usage::UsageEvent;
use crate::db::store::{ChannelStore, TokenStore, UsageStore};
use crate::db::{PgError, PgResult};
use crate::eventsub::transport::{EventSubTransport, SubscribeError, SubscribeResult};
use crate::eventsub::types::{CostBudget, SubscriptionKind};

/// Scripted reply for one subscription attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    AlreadyExists,
    Quota,
    MissingScope,
    Session,
    Other,
}

impl Outcome {
    fn into_result(self) -> SubscribeResult<()> {
        match self {
            Outcome::Ok => Ok(()),
            Outcome::AlreadyExists => Err(SubscribeError::AlreadyExists),
            Outcome::Quota => Err(SubscribeError::QuotaExceeded),
            Outcome::MissingScope => Err(SubscribeError::MissingScope),
            Outcome::Session => Err(SubscribeError::SessionInvalid),
            Outcome::Other => Err(SubscribeError::Rejected {
                status: 500,
                body: Value::Null,
            }),
        }
    }
}

pub struct MockTransport {
    attempts: Mutex<Vec<(ChannelId, SubscriptionKind)>>,
    script: Mutex<HashMap<(ChannelId, SubscriptionKind), Outcome>>,
    default_outcome: Mutex<Outcome>,
    budget: Mutex<Option<CostBudget>>,
    session: Mutex<Option<String>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            attempts: Mutex::new(Vec::new()),
            script: Mutex::new(HashMap::new()),
            default_outcome: Mutex::new(Outcome::Ok),
            budget: Mutex::new(Some(CostBudget::default())),
            session: Mutex::new(None),
        }
    }
}

impl MockTransport {
    pub fn respond(&self, channel: impl Into<ChannelId>, kind: SubscriptionKind, outcome: Outcome) {
        self.script
            .lock()
            .unwrap()
            .insert((channel.into(), kind), outcome);
    }

    pub fn set_default(&self, outcome: Outcome) {
        *self.default_outcome.lock().unwrap() = outcome;
    }

    pub fn fail_budget(&self) {
        *self.budget.lock().unwrap() = None;
    }

    pub fn set_budget(&self, budget: CostBudget) {
        *self.budget.lock().unwrap() = Some(budget);
    }

    pub fn attempts(&self) -> Vec<(ChannelId, SubscriptionKind)> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempts_for_kind(&self, kind: SubscriptionKind) -> Vec<ChannelId> {
        self.attempts()
            .into_iter()
            .filter(|(_, k)| *k == kind)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn attempts_for_channel(&self, channel: impl Into<ChannelId>) -> Vec<SubscriptionKind> {
        let channel = channel.into();
        self.attempts()
            .into_iter()
            .filter(|(id, _)| *id == channel)
            .map(|(_, k)| k)
            .collect()
    }

    pub fn session(&self) -> Option<String> {
        self.session.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSubTransport for MockTransport {
    async fn subscribe(
        &self,
        kind: SubscriptionKind,
        broadcaster: &ChannelId,
    ) -> SubscribeResult<()> {
        self.attempts
            .lock()
            .unwrap()
            .push((broadcaster.clone(), kind));

        let scripted = self
            .script
            .lock()
            .unwrap()
            .get(&(broadcaster.clone(), kind))
            .copied();

        scripted
            .unwrap_or(*self.default_outcome.lock().unwrap())
            .into_result()
    }

    async fn budget(&self) -> SubscribeResult<CostBudget> {
        self.budget
            .lock()
            .unwrap()
            .ok_or(SubscribeError::Rejected {
                status: 503,
                body: Value::Null,
            })
    }

    fn set_session(&self, session_id: &str) {
        *self.session.lock().unwrap() = Some(session_id.to_string());
    }
}

#[derive(Default)]
pub struct MockChannelStore {
    channels: Mutex<Vec<(ChannelRef, bool)>>,
    tokened: Mutex<HashSet<ChannelId>>,
    settings: Mutex<HashMap<ChannelId, ChannelSettings>>,
    active_queries: AtomicUsize,
    settings_queries: AtomicUsize,
    fail_settings: AtomicBool,
}

impl MockChannelStore {
    pub fn seed_channel(&self, id: impl Into<ChannelId>, name: &str, has_token: bool) {
        let id = id.into();
        self.channels
            .lock()
            .unwrap()
            .push((ChannelRef::new(id.clone(), name), true));
        self.settings
            .lock()
            .unwrap()
            .insert(id.clone(), ChannelSettings::default());
        if has_token {
            self.tokened.lock().unwrap().insert(id);
        }
    }

    pub fn active_channel_queries(&self) -> usize {
        self.active_queries.load(Ordering::SeqCst)
    }

    pub fn settings_queries(&self) -> usize {
        self.settings_queries.load(Ordering::SeqCst)
    }

    pub fn set_fail_settings(&self, fail: bool) {
        self.fail_settings.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChannelStore for MockChannelStore {
    async fn get_active_channels(&self) -> PgResult<Vec<ChannelRef>> {
        self.active_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .channels
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, active)| *active)
            .map(|(ch, _)| ch.clone())
            .collect())
    }

    async fn get_channels_with_tokens(&self) -> PgResult<Vec<ChannelRef>> {
        let tokened = self.tokened.lock().unwrap().clone();
        Ok(self
            .channels
            .lock()
            .unwrap()
            .iter()
            .filter(|(ch, active)| *active && tokened.contains(&ch.channel_id))
            .map(|(ch, _)| ch.clone())
            .collect())
    }

    async fn get_channel_settings(&self, channel_id: &ChannelId) -> PgResult<ChannelSettings> {
        self.settings_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_settings.load(Ordering::SeqCst) {
            return Err(PgError::Unavailable("settings query failed".into()));
        }

        Ok(self
            .settings
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_channel_settings(
        &self,
        channel_id: &ChannelId,
        settings: &ChannelSettings,
    ) -> PgResult<()> {
        self.settings
            .lock()
            .unwrap()
            .insert(channel_id.clone(), settings.clone());
        Ok(())
    }

    async fn add_channel(
        &self,
        channel_id: &ChannelId,
        channel_name: &str,
        _added_by: Option<&str>,
    ) -> PgResult<bool> {
        let mut channels = self.channels.lock().unwrap();
        if channels.iter().any(|(ch, _)| &ch.channel_id == channel_id) {
            return Ok(false);
        }

        channels.push((ChannelRef::new(channel_id.clone(), channel_name), true));
        self.settings
            .lock()
            .unwrap()
            .entry(channel_id.clone())
            .or_default();
        Ok(true)
    }

    async fn remove_channel(&self, channel_id: &ChannelId) -> PgResult<bool> {
        let mut channels = self.channels.lock().unwrap();
        for (ch, active) in channels.iter_mut() {
            if &ch.channel_id == channel_id && *active {
                *active = false;
                return Ok(true);
            }
        }

        Ok(false)
    }
}

#[derive(Default)]
pub struct MockTokenStore {
    rows: Mutex<HashMap<String, Token>>,
}

#[async_trait]
impl TokenStore for MockTokenStore {
    async fn has_tokens(&self) -> PgResult<bool> {
        Ok(!self.rows.lock().unwrap().is_empty())
    }

    async fn upsert_token(&self, user_id: &str, token: &str, refresh: &str) -> PgResult<()> {
        self.rows.lock().unwrap().insert(
            user_id.to_string(),
            Token {
                user_id: user_id.to_string(),
                token: token.to_string(),
                refresh: refresh.to_string(),
            },
        );
        Ok(())
    }

    async fn load_tokens(&self) -> PgResult<Vec<Token>> {
        Ok(self.rows.lock().unwrap().values().cloned().collect())
    }

    async fn clear_tokens(&self) -> PgResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let cleared = rows.len() as u64;
        rows.clear();
        Ok(cleared)
    }
}

#[derive(Default)]
pub struct MockUsageStore {
    batches: Mutex<Vec<Vec<UsageEvent>>>,
    fail_next: AtomicBool,
}

impl MockUsageStore {
    pub fn fail_next_flush(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<UsageEvent>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageStore for MockUsageStore {
    async fn record_usage_batch(&self, events: &[UsageEvent]) -> PgResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PgError::Unavailable("flush failed".into()));
        }

        self.batches.lock().unwrap().push(events.to_vec());
        Ok(())
    }
}
