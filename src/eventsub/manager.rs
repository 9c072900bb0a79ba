use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::instrument;

use crate::constants::RECONNECT_DEBOUNCE;
use crate::db::PgResult;
use crate::db::models::channel::{ChannelId, ChannelRef};
use crate::db::store::ChannelStore;
use crate::eventsub::transport::{EventSubTransport, SubscribeError};
use crate::eventsub::types::{ADVANCED_TIER, BASIC_TIER, CostBudget, SubscriptionKind};

/// Reconciles the live subscription set against the channel roster: basic
/// tier fanned out for credentialed channels, chat-only issued sequentially
/// for the rest so a quota signal can stop the sequence early, then the
/// advanced tier per channel with a global quota halt.
pub struct EventSubManager {
    store: Arc<dyn ChannelStore>,
    transport: Arc<dyn EventSubTransport>,
    last_welcome: Mutex<Option<Instant>>,
}

impl EventSubManager {
    pub fn new(store: Arc<dyn ChannelStore>, transport: Arc<dyn EventSubTransport>) -> Self {
        Self {
            store,
            transport,
            last_welcome: Mutex::new(None),
        }
    }

    /// One reconciliation pass. Scoped to a single channel when `channel_id`
    /// is given; skips the basic/chat steps entirely when `advanced_only`
    /// (a channel completing OAuth after it was already chat-subscribed).
    ///
    /// Per-subscription failures are classified and absorbed here; only a
    /// channel store failure propagates.
    #[instrument(skip(self))]
    pub async fn reconcile(
        &self,
        channel_id: Option<&ChannelId>,
        advanced_only: bool,
        is_reconnect: bool,
    ) -> PgResult<()> {
        let mut channels = self.store.get_active_channels().await?;
        if let Some(id) = channel_id {
            channels.retain(|ch| &ch.channel_id == id);
            if channels.is_empty() {
                tracing::warn!(%id, "channel not found in active set");
                return Ok(());
            }
        }
        if channels.is_empty() {
            return Ok(());
        }

        let mut with_tokens = self.store.get_channels_with_tokens().await?;
        if let Some(id) = channel_id {
            with_tokens.retain(|ch| &ch.channel_id == id);
        }

        if advanced_only {
            self.subscribe_advanced(&with_tokens).await;
            tracing::info!(
                channel_count = with_tokens.len(),
                "advanced-only pass complete"
            );
            return Ok(());
        }

        let token_ids: HashSet<&ChannelId> =
            with_tokens.iter().map(|ch| &ch.channel_id).collect();
        let without_tokens: Vec<&ChannelRef> = channels
            .iter()
            .filter(|ch| !token_ids.contains(&ch.channel_id))
            .collect();

        let mut success_count = 0usize;

        // Credentialed channels are cheap and likely to succeed; fan the
        // basic tier out and collect, one slow channel must not delay others.
        if !with_tokens.is_empty() {
            let results = join_all(with_tokens.iter().map(|ch| self.subscribe_basic(ch))).await;
            success_count += results.into_iter().filter(|ok| *ok).count();
        }

        // Chat-only channels are the bulk of the roster and the first to hit
        // the quota wall; issue strictly in order so the first quota signal
        // stops the sequence instead of wasting doomed requests.
        for channel in &without_tokens {
            match self
                .transport
                .subscribe(SubscriptionKind::ChatMessage, &channel.channel_id)
                .await
            {
                Ok(()) => success_count += 1,
                Err(SubscribeError::AlreadyExists) => {}
                Err(SubscribeError::QuotaExceeded) => {
                    tracing::warn!(
                        channel_name = %channel.channel_name,
                        "cost limit reached, stopping chat-only subscriptions"
                    );
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        channel_name = %channel.channel_name,
                        error = %e,
                        "chat subscription failed"
                    );
                }
            }
        }

        if !with_tokens.is_empty() {
            self.subscribe_advanced(&with_tokens).await;
        }

        if is_reconnect {
            tracing::info!(
                resubscribed = success_count,
                total = channels.len(),
                "eventsub reconnect complete"
            );
        } else if channel_id.is_some() {
            tracing::info!(channel_name = %channels[0].channel_name, "eventsub configured");
        } else {
            tracing::info!(
                ready = success_count,
                total = channels.len(),
                "eventsub ready"
            );
        }

        Ok(())
    }

    /// Basic tier for one credentialed channel. Already-existing
    /// subscriptions are skipped, a torn session is left for the next
    /// reconnect pass, anything else fails the channel without affecting the
    /// rest of the fan-out.
    async fn subscribe_basic(&self, channel: &ChannelRef) -> bool {
        for kind in BASIC_TIER {
            match self.transport.subscribe(*kind, &channel.channel_id).await {
                Ok(()) => {}
                Err(SubscribeError::AlreadyExists) => {}
                Err(SubscribeError::SessionInvalid | SubscribeError::NoSession) => {
                    tracing::debug!(
                        channel_name = %channel.channel_name,
                        %kind,
                        "basic subscription skipped: websocket session issue"
                    );
                    return false;
                }
                Err(e) => {
                    tracing::warn!(
                        channel_name = %channel.channel_name,
                        %kind,
                        error = %e,
                        "basic subscription failed"
                    );
                    return false;
                }
            }
        }

        true
    }

    /// Advanced tier, per channel in fixed kind order. Quota exhaustion is a
    /// shared global signal: once one attempt reports it, no remaining kind
    /// or channel can succeed, so the whole tier halts.
    async fn subscribe_advanced(&self, channels: &[ChannelRef]) {
        let mut cost_limit_reached = false;

        for channel in channels {
            if cost_limit_reached {
                tracing::warn!(
                    channel_name = %channel.channel_name,
                    "skipping advanced events: global cost limit reached"
                );
                continue;
            }

            for kind in ADVANCED_TIER {
                match self.transport.subscribe(*kind, &channel.channel_id).await {
                    Ok(()) => {
                        tracing::info!(
                            channel_name = %channel.channel_name,
                            %kind,
                            "advanced subscription successful"
                        );
                    }
                    Err(e) => {
                        if Self::note_subscription_error(&e, &channel.channel_name, *kind) {
                            cost_limit_reached = true;
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Logs one advanced-tier failure at the severity its class deserves and
    /// reports whether it was the quota signal.
    fn note_subscription_error(error: &SubscribeError, channel_name: &str, kind: SubscriptionKind) -> bool {
        match error {
            SubscribeError::MissingScope => {
                tracing::warn!(channel_name, %kind, "subscription skipped: missing required scope");
            }
            SubscribeError::QuotaExceeded => {
                tracing::warn!(channel_name, %kind, "subscription skipped: cost limit reached");
                return true;
            }
            SubscribeError::SessionInvalid | SubscribeError::NoSession => {
                tracing::debug!(channel_name, %kind, "subscription skipped: websocket session issue");
            }
            SubscribeError::AlreadyExists => {
                tracing::debug!(channel_name, %kind, "subscription already exists");
            }
            other => {
                tracing::error!(channel_name, %kind, error = %other, "subscription failed");
            }
        }

        false
    }

    /// Best-effort quota snapshot; falls back to the conservative default
    /// rather than blocking the caller on an upstream hiccup.
    #[instrument(skip(self))]
    pub async fn check_cost_budget(&self) -> CostBudget {
        match self.transport.budget().await {
            Ok(budget) => budget,
            Err(e) => {
                tracing::debug!(error = %e, "budget query unavailable, using defaults");
                CostBudget::default()
            }
        }
    }

    /// Full resubscription after a fresh websocket session. Welcome frames
    /// arrive in bursts around a reconnect, so passes inside the debounce
    /// window collapse into the first one.
    #[instrument(skip(self))]
    pub async fn handle_reconnect(&self) {
        {
            let mut last = self.last_welcome.lock().await;
            if let Some(at) = *last
                && at.elapsed() < RECONNECT_DEBOUNCE
            {
                return;
            }
            *last = Some(Instant::now());
        }

        tracing::info!("websocket reconnected, resubscribing to all events");
        if let Err(e) = self.reconcile(None, false, true).await {
            tracing::error!(error = %e, "resubscription after reconnect failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockChannelStore, MockTransport, Outcome};
    use SubscriptionKind::*;

    fn manager(store: Arc<MockChannelStore>, transport: Arc<MockTransport>) -> EventSubManager {
        EventSubManager::new(store, transport)
    }

    #[tokio::test]
    async fn quota_halt_stops_remaining_chat_only_channels() {
        let store = Arc::new(MockChannelStore::default());
        for id in ["1", "2", "3", "4"] {
            store.seed_channel(id, &format!("chan-{id}"), false);
        }

        let transport = Arc::new(MockTransport::default());
        transport.respond("2", ChatMessage, Outcome::Quota);

        manager(store, transport.clone())
            .reconcile(None, false, false)
            .await
            .unwrap();

        let chats = transport.attempts_for_kind(ChatMessage);
        assert_eq!(chats, vec![ChannelId::from("1"), ChannelId::from("2")]);
    }

    #[tokio::test]
    async fn tier_split_and_advanced_order() {
        let store = Arc::new(MockChannelStore::default());
        store.seed_channel("10", "plain", false);
        store.seed_channel("20", "authed", true);

        let transport = Arc::new(MockTransport::default());
        manager(store, transport.clone())
            .reconcile(None, false, false)
            .await
            .unwrap();

        // Chat-only channel gets exactly the chat subscription.
        let plain = transport.attempts_for_channel("10");
        assert_eq!(plain, vec![ChatMessage]);

        // Credentialed channel gets the basic tier then the advanced tier in
        // fixed order.
        let authed = transport.attempts_for_channel("20");
        assert_eq!(
            authed,
            vec![
                ChatMessage,
                StreamOnline,
                Raid,
                Follow,
                Subscribe,
                SubscriptionGift,
                RedemptionAdd
            ]
        );
    }

    #[tokio::test]
    async fn advanced_quota_signal_halts_all_remaining_channels() {
        let store = Arc::new(MockChannelStore::default());
        store.seed_channel("1", "first", true);
        store.seed_channel("2", "second", true);

        let transport = Arc::new(MockTransport::default());
        transport.respond("1", Follow, Outcome::Quota);

        manager(store, transport.clone())
            .reconcile(None, false, false)
            .await
            .unwrap();

        let advanced: Vec<_> = transport
            .attempts()
            .into_iter()
            .filter(|(_, kind)| ADVANCED_TIER.contains(kind))
            .collect();
        assert_eq!(advanced, vec![(ChannelId::from("1"), Follow)]);
    }

    #[tokio::test]
    async fn missing_scope_skips_kind_but_not_channel() {
        let store = Arc::new(MockChannelStore::default());
        store.seed_channel("1", "partial", true);

        let transport = Arc::new(MockTransport::default());
        transport.respond("1", Follow, Outcome::MissingScope);

        manager(store, transport.clone())
            .reconcile(None, false, false)
            .await
            .unwrap();

        let attempts = transport.attempts_for_channel("1");
        assert!(attempts.contains(&Subscribe));
        assert!(attempts.contains(&RedemptionAdd));
    }

    #[tokio::test]
    async fn second_pass_with_existing_subscriptions_is_idempotent() {
        let store = Arc::new(MockChannelStore::default());
        store.seed_channel("10", "plain", false);
        store.seed_channel("20", "authed", true);

        let transport = Arc::new(MockTransport::default());
        let manager = manager(store, transport.clone());

        manager.reconcile(None, false, false).await.unwrap();
        let first_pass = transport.attempts();

        // Upstream now reports every subscription as existing.
        transport.set_default(Outcome::AlreadyExists);
        manager.reconcile(None, false, false).await.unwrap();

        let all = transport.attempts();
        assert_eq!(all.len(), first_pass.len() * 2);
        assert_eq!(&all[first_pass.len()..], &first_pass[..]);
    }

    #[tokio::test]
    async fn scoped_pass_touches_only_the_requested_channel() {
        let store = Arc::new(MockChannelStore::default());
        store.seed_channel("10", "other", false);
        store.seed_channel("20", "target", true);

        let transport = Arc::new(MockTransport::default());
        manager(store, transport.clone())
            .reconcile(Some(&ChannelId::from("20")), false, false)
            .await
            .unwrap();

        assert!(transport.attempts_for_channel("10").is_empty());
        assert!(!transport.attempts_for_channel("20").is_empty());
    }

    #[tokio::test]
    async fn advanced_only_pass_skips_basic_tier() {
        let store = Arc::new(MockChannelStore::default());
        store.seed_channel("20", "authed", true);

        let transport = Arc::new(MockTransport::default());
        manager(store, transport.clone())
            .reconcile(None, true, false)
            .await
            .unwrap();

        let attempts = transport.attempts_for_channel("20");
        assert_eq!(attempts, ADVANCED_TIER.to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_inside_debounce_window_collapse() {
        let store = Arc::new(MockChannelStore::default());
        store.seed_channel("1", "chan", false);

        let transport = Arc::new(MockTransport::default());
        let manager = manager(store.clone(), transport);

        manager.handle_reconnect().await;
        manager.handle_reconnect().await;
        assert_eq!(store.active_channel_queries(), 1);

        tokio::time::advance(RECONNECT_DEBOUNCE + std::time::Duration::from_secs(1)).await;
        manager.handle_reconnect().await;
        assert_eq!(store.active_channel_queries(), 2);
    }

    #[tokio::test]
    async fn budget_falls_back_to_conservative_default() {
        let store = Arc::new(MockChannelStore::default());
        let transport = Arc::new(MockTransport::default());
        transport.fail_budget();

        let budget = manager(store, transport).check_cost_budget().await;
        assert_eq!(budget.total_cost, 0);
        assert_eq!(budget.remaining(), budget.max_total_cost);
    }
}
