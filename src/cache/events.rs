//! Cache event system.
//!
//! Write operations publish events here; the consumer drains them and turns
//! them into invalidation plans.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::gauge;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::domain::catalog::SubjectKind;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";

pub(crate) const METRIC_EVENT_QUEUE_LEN: &str = "plaudit_cache_event_queue_len";

/// Monotonic epoch for ordering events.
///
/// Each event gets a unique, monotonically increasing epoch number, used to
/// decide which event is newest when merging several for the same subject.
pub type Epoch = u64;

/// Cache event with idempotency and ordering support.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    /// Monotonic epoch for ordering within this process.
    pub epoch: Epoch,
    /// The mutation the event reports.
    pub kind: EventKind,
    /// When the event was created.
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Mutations that trigger invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A subject was created or its catalog fields updated.
    SubjectUpserted {
        kind: SubjectKind,
        subject_id: Uuid,
    },
    /// A subject was deleted (reviews cascade with it).
    SubjectDeleted {
        kind: SubjectKind,
        subject_id: Uuid,
    },
    /// A review lifecycle write touched the subject's aggregates.
    SubjectReviewed {
        kind: SubjectKind,
        subject_id: Uuid,
    },
}

impl EventKind {
    pub fn subject_kind(&self) -> SubjectKind {
        match self {
            EventKind::SubjectUpserted { kind, .. }
            | EventKind::SubjectDeleted { kind, .. }
            | EventKind::SubjectReviewed { kind, .. } => *kind,
        }
    }

    pub fn subject_id(&self) -> Uuid {
        match self {
            EventKind::SubjectUpserted { subject_id, .. }
            | EventKind::SubjectDeleted { subject_id, .. }
            | EventKind::SubjectReviewed { subject_id, .. } => *subject_id,
        }
    }
}

/// In-memory event queue for cache invalidation.
///
/// Events are published by write operations and consumed by the cache
/// consumer. The queue uses a mutex since contention is expected to be low.
pub struct EventQueue {
    queue: Mutex<VecDeque<CacheEvent>>,
    epoch_counter: AtomicU64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    /// Get the next epoch number.
    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Publish an event to the queue.
    ///
    /// The event is logged for observability.
    pub fn publish(&self, kind: EventKind) {
        let epoch = self.next_epoch();
        let event = CacheEvent::new(kind.clone(), epoch);

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = ?kind,
            "Cache event enqueued"
        );

        let mut queue = mutex_lock(&self.queue, SOURCE, "publish");
        queue.push_back(event);
        gauge!(METRIC_EVENT_QUEUE_LEN).set(queue.len() as f64);
    }

    /// Drain up to `limit` events, in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<CacheEvent> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        let events = queue.drain(..count).collect();
        gauge!(METRIC_EVENT_QUEUE_LEN).set(queue.len() as f64);
        events
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut queue = mutex_lock(&self.queue, SOURCE, "clear");
        queue.clear();
        gauge!(METRIC_EVENT_QUEUE_LEN).set(0.0);
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn reviewed(id: u128) -> EventKind {
        EventKind::SubjectReviewed {
            kind: SubjectKind::Song,
            subject_id: Uuid::from_u128(id),
        }
    }

    #[test]
    fn event_creation() {
        let kind = reviewed(7);
        let event = CacheEvent::new(kind.clone(), 42);

        assert_eq!(event.epoch, 42);
        assert_eq!(event.kind, kind);
        assert!(!event.id.is_nil());
    }

    #[test]
    fn epoch_monotonicity() {
        let queue = EventQueue::new();

        let e1 = queue.next_epoch();
        let e2 = queue.next_epoch();
        let e3 = queue.next_epoch();

        assert!(e1 < e2);
        assert!(e2 < e3);
    }

    #[test]
    fn publish_and_drain_in_fifo_order() {
        let queue = EventQueue::new();

        queue.publish(reviewed(1));
        queue.publish(reviewed(2));
        queue.publish(EventKind::SubjectUpserted {
            kind: SubjectKind::Event,
            subject_id: Uuid::from_u128(3),
        });

        assert_eq!(queue.len(), 3);

        let events = queue.drain(2);
        assert_eq!(events.len(), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(events[0].kind, reviewed(1));
        assert_eq!(events[1].kind, reviewed(2));
    }

    #[test]
    fn drain_more_than_available() {
        let queue = EventQueue::new();

        queue.publish(reviewed(1));

        let events = queue.drain(100);
        assert_eq!(events.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_queue() {
        let queue = EventQueue::new();

        queue.publish(reviewed(1));
        queue.publish(reviewed(2));
        assert!(!queue.is_empty());

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn accessors_expose_the_subject() {
        let kind = EventKind::SubjectDeleted {
            kind: SubjectKind::Outfit,
            subject_id: Uuid::from_u128(9),
        };
        assert_eq!(kind.subject_kind(), SubjectKind::Outfit);
        assert_eq!(kind.subject_id(), Uuid::from_u128(9));
    }

    #[test]
    fn event_queue_recovers_from_poisoned_lock() {
        let queue = EventQueue::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = queue.queue.lock().expect("queue lock should be acquired");
            panic!("poison queue lock");
        }));

        queue.publish(reviewed(1));
        assert_eq!(queue.len(), 1);
    }
}
