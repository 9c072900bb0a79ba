//! Write-behind buffer for command usage rows. Events accumulate in memory
//! and flush as one batch once the buffer is large enough or old enough;
//! a failed flush keeps the events queued for the next attempt.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::constants::{USAGE_BATCH_MAX_AGE, USAGE_BATCH_SIZE};
use crate::db::models::usage::UsageEvent;
use crate::db::store::UsageStore;

#[derive(Default)]
struct BatchState {
    events: Vec<UsageEvent>,
    // Set when the first event of the current batch arrives.
    opened_at: Option<Instant>,
}

pub struct UsageBatcher {
    store: Arc<dyn UsageStore>,
    state: Mutex<BatchState>,
    batch_size: usize,
    max_age: Duration,
}

impl UsageBatcher {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self::with_limits(store, USAGE_BATCH_SIZE, USAGE_BATCH_MAX_AGE)
    }

    pub fn with_limits(store: Arc<dyn UsageStore>, batch_size: usize, max_age: Duration) -> Self {
        Self {
            store,
            state: Mutex::new(BatchState::default()),
            batch_size,
            max_age,
        }
    }

    /// Queues one event, flushing inline when the batch crosses the size or
    /// age threshold. Both checks run here, so a quiet channel's batch is
    /// carried out by the next event rather than a background timer.
    pub async fn record(&self, event: UsageEvent) {
        let mut state = self.state.lock().await;
        if state.opened_at.is_none() {
            state.opened_at = Some(Instant::now());
        }
        state.events.push(event);

        let over_size = state.events.len() >= self.batch_size;
        let over_age = state
            .opened_at
            .is_some_and(|opened| opened.elapsed() >= self.max_age);

        if over_size || over_age {
            self.flush_locked(&mut state).await;
        }
    }

    /// Flushes whatever is queued, regardless of thresholds. Used on
    /// shutdown so no recorded usage is dropped.
    pub async fn flush(&self) {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await;
    }

    pub async fn pending(&self) -> usize {
        self.state.lock().await.events.len()
    }

    async fn flush_locked(&self, state: &mut BatchState) {
        if state.events.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut state.events);
        let opened_at = state.opened_at.take();

        match self.store.record_usage_batch(&batch).await {
            Ok(()) => debug!(events = batch.len(), "flushed usage batch"),
            Err(err) => {
                warn!(error = %err, retained = batch.len(), "usage flush failed, retaining batch");

                // Requeue ahead of anything recorded since, keeping the
                // original batch age so the next event retries promptly.
                state.events.splice(0..0, batch);
                state.opened_at = opened_at;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::channel::ChannelId;
    use crate::db::models::usage::aggregate_counts;
    use crate::testing::MockUsageStore;

    fn event(channel: &str, command: &str) -> UsageEvent {
        UsageEvent::new(ChannelId::from(channel), "200", command)
    }

    #[tokio::test]
    async fn small_young_batch_stays_queued() {
        let store = Arc::new(MockUsageStore::default());
        let batcher = UsageBatcher::with_limits(store.clone(), 5, Duration::from_secs(30));

        for _ in 0..3 {
            batcher.record(event("10", "dice")).await;
        }

        assert!(store.batches().is_empty());
        assert_eq!(batcher.pending().await, 3);
    }

    #[tokio::test]
    async fn size_threshold_triggers_a_flush() {
        let store = Arc::new(MockUsageStore::default());
        let batcher = UsageBatcher::with_limits(store.clone(), 5, Duration::from_secs(30));

        for _ in 0..5 {
            batcher.record(event("10", "dice")).await;
        }

        let batches = store.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 5);
        assert_eq!(batcher.pending().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn age_threshold_triggers_on_the_next_event() {
        let store = Arc::new(MockUsageStore::default());
        let batcher = UsageBatcher::with_limits(store.clone(), 50, Duration::from_secs(30));

        batcher.record(event("10", "dice")).await;
        assert!(store.batches().is_empty());

        tokio::time::advance(Duration::from_secs(31)).await;
        batcher.record(event("10", "help")).await;

        let batches = store.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[tokio::test]
    async fn failed_flush_retains_events_for_retry() {
        let store = Arc::new(MockUsageStore::default());
        let batcher = UsageBatcher::with_limits(store.clone(), 3, Duration::from_secs(30));

        store.fail_next_flush();
        for _ in 0..3 {
            batcher.record(event("10", "dice")).await;
        }

        assert!(store.batches().is_empty());
        assert_eq!(batcher.pending().await, 3);

        batcher.flush().await;
        let batches = store.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batcher.pending().await, 0);
    }

    #[tokio::test]
    async fn flushed_batch_aggregates_per_channel_and_command() {
        let store = Arc::new(MockUsageStore::default());
        let batcher = UsageBatcher::with_limits(store.clone(), 4, Duration::from_secs(30));

        batcher.record(event("10", "dice")).await;
        batcher.record(event("10", "dice")).await;
        batcher.record(event("11", "dice")).await;
        batcher.record(event("10", "help")).await;

        let batches = store.batches();
        assert_eq!(batches.len(), 1);

        let counts = aggregate_counts(&batches[0]);
        assert_eq!(counts[&(ChannelId::from("10"), "dice".to_string())], 2);
        assert_eq!(counts[&(ChannelId::from("11"), "dice".to_string())], 1);
        assert_eq!(counts[&(ChannelId::from("10"), "help".to_string())], 1);
    }
}
