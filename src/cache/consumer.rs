//! Cache consumer for executing invalidation plans.
//!
//! Drains events from the queue, merges them into a plan and drops every
//! cache entry registered under a touched kind.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{info, instrument};
use uuid::Uuid;

use super::config::CacheConfig;
use super::events::EventQueue;
use super::planner::InvalidationPlan;
use super::registry::CacheRegistry;
use super::store::ListStore;

pub(crate) const METRIC_CACHE_CONSUME_MS: &str = "plaudit_cache_consume_ms";

/// Cache consumer that processes events and maintains cache consistency.
///
/// The consumer:
/// 1. Drains a batch of events from the queue
/// 2. Merges the batch into an invalidation plan
/// 3. Drops the registered entries of every touched kind
pub struct CacheConsumer {
    config: CacheConfig,
    store: Arc<ListStore>,
    registry: Arc<CacheRegistry>,
    queue: Arc<EventQueue>,
}

impl CacheConsumer {
    pub fn new(
        config: CacheConfig,
        store: Arc<ListStore>,
        registry: Arc<CacheRegistry>,
        queue: Arc<EventQueue>,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            queue,
        }
    }

    /// Consume pending events and execute the plan.
    ///
    /// Returns true if any events were processed.
    #[instrument(skip(self))]
    pub async fn consume(&self) -> bool {
        let consume_started_at = Instant::now();
        let events = self.queue.drain(self.config.consume_batch_limit);
        if events.is_empty() {
            return false;
        }

        let event_count = events.len();
        let event_ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let plan = InvalidationPlan::from_events(events);

        info!(
            event_count,
            event_ids = ?event_ids,
            plan = %plan,
            "Cache consumption starting"
        );

        let mut dropped = 0usize;
        for kind in &plan.touched_kinds {
            for key in self.registry.keys_for_kind(*kind) {
                self.store.invalidate(&key);
                dropped += 1;
            }
        }

        info!(
            event_count,
            touched_kinds = plan.touched_kinds.len(),
            dropped,
            "Cache consumption complete"
        );

        histogram!(METRIC_CACHE_CONSUME_MS)
            .record(consume_started_at.elapsed().as_secs_f64() * 1000.0);

        true
    }

    /// Get reference to the event queue.
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Get reference to the list store.
    pub fn store(&self) -> &Arc<ListStore> {
        &self.store
    }

    /// Get reference to the registry.
    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }
}
