//! Invalidation plan generation.
//!
//! Merges a batch of cache events into one plan before any store is touched,
//! so a burst of writes against the same subject costs a single pass.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use uuid::Uuid;

use crate::domain::catalog::SubjectKind;

use super::events::{CacheEvent, EventKind};

/// The merged outcome of a batch of events.
///
/// Invalidation is coarse-grained by subject kind: the plan carries the set
/// of kinds the batch touched, and the consumer drops every cache key
/// registered under any of them.
#[derive(Debug, Default)]
pub struct InvalidationPlan {
    /// Kinds whose registered cache keys must drop.
    pub touched_kinds: BTreeSet<SubjectKind>,
    /// Distinct subjects behind the batch, after merging.
    pub subject_count: usize,
    /// Distinct events in the batch, after id-level deduplication.
    pub event_count: usize,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InvalidationPlan {{ kinds: [")?;
        for (index, kind) in self.touched_kinds.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{kind}")?;
        }
        write!(
            f,
            "], subjects: {}, events: {} }}",
            self.subject_count, self.event_count
        )
    }
}

impl InvalidationPlan {
    /// Merge a batch of events into a plan.
    ///
    /// - Deduplicates by event id (redelivery is harmless)
    /// - Keeps only the newest event per subject, by epoch
    /// - Collects the touched kinds from what remains
    pub fn from_events(events: Vec<CacheEvent>) -> Self {
        let mut seen_ids = HashSet::new();
        let events: Vec<_> = events
            .into_iter()
            .filter(|event| seen_ids.insert(event.id))
            .collect();
        let event_count = events.len();

        let mut latest_per_subject: HashMap<Uuid, (u64, EventKind)> = HashMap::new();
        for event in events {
            latest_per_subject
                .entry(event.kind.subject_id())
                .and_modify(|(epoch, kind)| {
                    if event.epoch > *epoch {
                        *epoch = event.epoch;
                        *kind = event.kind.clone();
                    }
                })
                .or_insert((event.epoch, event.kind));
        }

        let subject_count = latest_per_subject.len();
        let touched_kinds = latest_per_subject
            .into_values()
            .map(|(_, kind)| kind.subject_kind())
            .collect();

        Self {
            touched_kinds,
            subject_count,
            event_count,
        }
    }

    /// Check if the plan has anything to do.
    pub fn is_empty(&self) -> bool {
        self.touched_kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upserted(id: u128, kind: SubjectKind, epoch: u64) -> CacheEvent {
        CacheEvent::new(
            EventKind::SubjectUpserted {
                kind,
                subject_id: Uuid::from_u128(id),
            },
            epoch,
        )
    }

    fn reviewed(id: u128, kind: SubjectKind, epoch: u64) -> CacheEvent {
        CacheEvent::new(
            EventKind::SubjectReviewed {
                kind,
                subject_id: Uuid::from_u128(id),
            },
            epoch,
        )
    }

    #[test]
    fn collects_touched_kinds() {
        let plan = InvalidationPlan::from_events(vec![
            upserted(1, SubjectKind::Song, 0),
            reviewed(2, SubjectKind::Podcast, 1),
            reviewed(3, SubjectKind::Song, 2),
        ]);

        assert_eq!(
            plan.touched_kinds,
            BTreeSet::from([SubjectKind::Song, SubjectKind::Podcast])
        );
        assert_eq!(plan.subject_count, 3);
        assert_eq!(plan.event_count, 3);
    }

    #[test]
    fn dedupes_by_event_id() {
        let event = reviewed(1, SubjectKind::Cover, 0);
        let plan = InvalidationPlan::from_events(vec![event.clone(), event]);

        assert_eq!(plan.event_count, 1);
        assert_eq!(plan.subject_count, 1);
    }

    #[test]
    fn merges_a_subject_to_its_newest_event() {
        let plan = InvalidationPlan::from_events(vec![
            upserted(1, SubjectKind::Outfit, 0),
            CacheEvent::new(
                EventKind::SubjectDeleted {
                    kind: SubjectKind::Outfit,
                    subject_id: Uuid::from_u128(1),
                },
                1,
            ),
        ]);

        assert_eq!(plan.subject_count, 1);
        assert_eq!(plan.event_count, 2);
        assert_eq!(plan.touched_kinds, BTreeSet::from([SubjectKind::Outfit]));
    }

    #[test]
    fn empty_batch_yields_an_empty_plan() {
        let plan = InvalidationPlan::from_events(Vec::new());
        assert!(plan.is_empty());

        let plan = InvalidationPlan::from_events(vec![reviewed(1, SubjectKind::Song, 0)]);
        assert!(!plan.is_empty());
    }

    #[test]
    fn display_format() {
        let plan = InvalidationPlan::from_events(vec![
            reviewed(1, SubjectKind::Song, 0),
            reviewed(2, SubjectKind::Cover, 1),
        ]);
        let display = format!("{plan}");
        assert!(display.contains("InvalidationPlan"));
        assert!(display.contains("song"));
        assert!(display.contains("cover"));
        assert!(display.contains("subjects: 2"));
    }
}
