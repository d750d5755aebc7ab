//! Cache trigger service.
//!
//! Provides a high-level API for publishing cache events and optionally
//! consuming them immediately.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::domain::catalog::SubjectKind;

use super::config::CacheConfig;
use super::consumer::CacheConsumer;
use super::events::{EventKind, EventQueue};

/// Cache trigger for publishing cache events.
///
/// Wraps the event queue and consumer with convenience methods for the
/// write paths.
///
/// # Usage
///
/// ```ignore
/// // After a committed review write:
/// trigger.subject_reviewed(subject.kind, subject.id).await;
/// ```
pub struct CacheTrigger {
    config: CacheConfig,
    queue: Arc<EventQueue>,
    consumer: Arc<CacheConsumer>,
}

impl CacheTrigger {
    pub fn new(config: CacheConfig, queue: Arc<EventQueue>, consumer: Arc<CacheConsumer>) -> Self {
        Self {
            config,
            queue,
            consumer,
        }
    }

    /// Publish an event and optionally consume immediately.
    ///
    /// With `consume_now` false the event waits for the auto-consume loop or
    /// the next explicit consumption.
    pub async fn trigger(&self, kind: EventKind, consume_now: bool) {
        if !self.config.is_enabled() {
            debug!(event_kind = ?kind, "Cache trigger skipped: cache disabled");
            return;
        }

        self.queue.publish(kind);

        if consume_now {
            self.consumer.consume().await;
        }
    }

    /// Trigger a subject create/update event.
    pub async fn subject_upserted(&self, kind: SubjectKind, subject_id: Uuid) {
        self.trigger(EventKind::SubjectUpserted { kind, subject_id }, true)
            .await;
    }

    /// Trigger a subject delete event.
    pub async fn subject_deleted(&self, kind: SubjectKind, subject_id: Uuid) {
        self.trigger(EventKind::SubjectDeleted { kind, subject_id }, true)
            .await;
    }

    /// Trigger an event for a review lifecycle write against a subject.
    pub async fn subject_reviewed(&self, kind: SubjectKind, subject_id: Uuid) {
        self.trigger(EventKind::SubjectReviewed { kind, subject_id }, true)
            .await;
    }

    /// Spawn the periodic consumption loop for events published without
    /// immediate consumption. Returns None when the cache is disabled.
    pub fn spawn_auto_consume(&self) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.is_enabled() {
            return None;
        }

        let consumer = self.consumer.clone();
        let interval_ms = self.config.auto_consume_interval_ms;
        Some(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            interval.tick().await; // Skip the first immediate tick
            loop {
                interval.tick().await;
                consumer.consume().await;
            }
        }))
    }

    /// Get the underlying config.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the underlying event queue.
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Get the underlying consumer.
    pub fn consumer(&self) -> &Arc<CacheConsumer> {
        &self.consumer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::registry::CacheRegistry;
    use crate::cache::store::ListStore;

    fn create_trigger(config: CacheConfig) -> CacheTrigger {
        let registry = Arc::new(CacheRegistry::new());
        let store = Arc::new(ListStore::new(&config, registry.clone()));
        let queue = Arc::new(EventQueue::new());
        let consumer = Arc::new(CacheConsumer::new(
            config.clone(),
            store,
            registry,
            queue.clone(),
        ));

        CacheTrigger::new(config, queue, consumer)
    }

    #[tokio::test]
    async fn trigger_publishes_event() {
        let trigger = create_trigger(CacheConfig::default());

        assert!(trigger.queue.is_empty());

        trigger
            .trigger(
                EventKind::SubjectReviewed {
                    kind: SubjectKind::Song,
                    subject_id: Uuid::nil(),
                },
                false,
            )
            .await;

        // Not consumed since consume_now was false.
        assert_eq!(trigger.queue.len(), 1);
    }

    #[tokio::test]
    async fn trigger_respects_disabled_config() {
        let trigger = create_trigger(CacheConfig {
            enable_list_cache: false,
            ..Default::default()
        });

        trigger
            .subject_upserted(SubjectKind::Song, Uuid::nil())
            .await;

        assert!(trigger.queue.is_empty());
    }

    #[tokio::test]
    async fn convenience_methods_consume_immediately() {
        let trigger = create_trigger(CacheConfig::default());

        trigger
            .subject_upserted(SubjectKind::Project, Uuid::nil())
            .await;
        trigger
            .subject_deleted(SubjectKind::Project, Uuid::nil())
            .await;
        trigger
            .subject_reviewed(SubjectKind::Podcast, Uuid::nil())
            .await;

        assert!(trigger.queue.is_empty());
    }

    #[tokio::test]
    async fn auto_consume_spawns_only_when_enabled() {
        let enabled = create_trigger(CacheConfig::default());
        let handle = enabled.spawn_auto_consume().expect("spawned task");
        handle.abort();

        let disabled = create_trigger(CacheConfig {
            enable_list_cache: false,
            ..Default::default()
        });
        assert!(disabled.spawn_auto_consume().is_none());
    }
}
