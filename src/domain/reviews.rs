//! Review rules: star validation, incremental aggregate maintenance and
//! sub-review ordering.
//!
//! The aggregate math is deliberately incremental. A subject row carries
//! `reviews_count` and `star_average`; every review lifecycle operation
//! adjusts the pair from the old value and the stars involved instead of
//! recounting the table. Only reviews flagged latest participate.

use serde::Serialize;
use uuid::Uuid;

use crate::domain::error::DomainError;

pub const STAR_MIN: f64 = 0.0;
pub const STAR_MAX: f64 = 5.0;

/// Rounding guard for the running average. The mean of values in [0, 5] is
/// mathematically in [0, 5]; repeated incremental updates can drift a few
/// ulps past the ends, so every transition clamps back into range.
fn clamp_stars(value: f64) -> f64 {
    value.clamp(STAR_MIN, STAR_MAX)
}

pub fn validate_stars(stars: f64) -> Result<(), DomainError> {
    if !stars.is_finite() {
        return Err(DomainError::validation("stars must be a finite number"));
    }
    if !(STAR_MIN..=STAR_MAX).contains(&stars) {
        return Err(DomainError::validation(format!(
            "stars must be between {STAR_MIN} and {STAR_MAX}, got {stars}"
        )));
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<(), DomainError> {
    if title.trim().is_empty() {
        return Err(DomainError::validation("title must not be empty"));
    }
    Ok(())
}

pub fn validate_topic(topic: &str) -> Result<(), DomainError> {
    if topic.trim().is_empty() {
        return Err(DomainError::validation("topic must not be empty"));
    }
    Ok(())
}

/// The (`reviews_count`, `star_average`) pair stored on a subject.
///
/// `star_average` is the mean of `stars` over the subject's latest-flagged
/// reviews, 0.0 while there are none.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReviewAggregate {
    pub reviews_count: i64,
    pub star_average: f64,
}

impl ReviewAggregate {
    pub const EMPTY: ReviewAggregate = ReviewAggregate {
        reviews_count: 0,
        star_average: 0.0,
    };

    pub fn new(reviews_count: i64, star_average: f64) -> Self {
        Self {
            reviews_count,
            star_average,
        }
    }

    /// A new latest review joins the aggregate: the author had no latest
    /// review on this subject before.
    pub fn attach(self, stars: f64) -> Self {
        let count = self.reviews_count + 1;
        let total = self.star_average * self.reviews_count as f64 + stars;
        Self {
            reviews_count: count,
            star_average: clamp_stars(total / count as f64),
        }
    }

    /// One latest review's stars change without the count moving: the author
    /// re-reviewed the subject, edited their latest review, or had a deleted
    /// latest review replaced by a promoted predecessor.
    pub fn replace(self, old_stars: f64, new_stars: f64) -> Result<Self, DomainError> {
        if self.reviews_count < 1 {
            return Err(DomainError::invariant(
                "cannot replace stars in an empty aggregate",
            ));
        }
        let count = self.reviews_count as f64;
        let total = self.star_average * count - old_stars + new_stars;
        Ok(Self {
            reviews_count: self.reviews_count,
            star_average: clamp_stars(total / count),
        })
    }

    /// A latest review leaves with no successor to promote.
    pub fn detach(self, stars: f64) -> Result<Self, DomainError> {
        if self.reviews_count < 1 {
            return Err(DomainError::invariant(
                "cannot detach a review from an empty aggregate",
            ));
        }
        let count = self.reviews_count - 1;
        if count == 0 {
            return Ok(Self::EMPTY);
        }
        let total = self.star_average * self.reviews_count as f64 - stars;
        Ok(Self {
            reviews_count: count,
            star_average: clamp_stars(total / count as f64),
        })
    }
}

/// Resolves the position for a new sub-review among `existing` siblings.
/// `None` appends; an explicit position must land inside `1..=existing + 1`.
pub fn insertion_position(requested: Option<i32>, existing: usize) -> Result<i32, DomainError> {
    let append_at = existing as i32 + 1;
    match requested {
        None => Ok(append_at),
        Some(position) if (1..=append_at).contains(&position) => Ok(position),
        Some(position) => Err(DomainError::validation(format!(
            "position {position} is outside 1..={append_at}"
        ))),
    }
}

/// Checks that `proposed` is a permutation of `current` (same ids, each
/// exactly once). The caller assigns positions 1..n in proposed order.
pub fn validate_reorder(current: &[Uuid], proposed: &[Uuid]) -> Result<(), DomainError> {
    if proposed.len() != current.len() {
        return Err(DomainError::validation(format!(
            "reorder names {} sub-reviews, review has {}",
            proposed.len(),
            current.len()
        )));
    }
    let mut seen = std::collections::HashSet::with_capacity(proposed.len());
    for id in proposed {
        if !current.contains(id) {
            return Err(DomainError::validation(format!(
                "reorder names unknown sub-review `{id}`"
            )));
        }
        if !seen.insert(*id) {
            return Err(DomainError::validation(format!(
                "reorder names sub-review `{id}` twice"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn attach_starts_from_empty() {
        let aggregate = ReviewAggregate::EMPTY.attach(4.0);
        assert_eq!(aggregate.reviews_count, 1);
        assert_close(aggregate.star_average, 4.0);
    }

    #[test]
    fn re_review_replaces_without_growing_the_count() {
        let aggregate = ReviewAggregate::EMPTY.attach(4.0);
        let aggregate = aggregate.replace(4.0, 2.0).expect("replace");
        assert_eq!(aggregate.reviews_count, 1);
        assert_close(aggregate.star_average, 2.0);
    }

    #[test]
    fn second_author_attaches_into_the_mean() {
        let aggregate = ReviewAggregate::new(1, 2.0).attach(5.0);
        assert_eq!(aggregate.reviews_count, 2);
        assert_close(aggregate.star_average, 3.5);
    }

    #[test]
    fn detach_restores_the_remaining_mean() {
        let aggregate = ReviewAggregate::new(2, 3.5).detach(5.0).expect("detach");
        assert_eq!(aggregate.reviews_count, 1);
        assert_close(aggregate.star_average, 2.0);
    }

    #[test]
    fn detach_of_the_last_review_zeroes_the_average() {
        let aggregate = ReviewAggregate::new(1, 4.5).detach(4.5).expect("detach");
        assert_eq!(aggregate, ReviewAggregate::EMPTY);
    }

    #[test]
    fn replace_and_detach_reject_an_empty_aggregate() {
        assert!(ReviewAggregate::EMPTY.replace(1.0, 2.0).is_err());
        assert!(ReviewAggregate::EMPTY.detach(1.0).is_err());
    }

    #[test]
    fn averages_never_leave_the_star_range() {
        // Drift from many incremental updates must stay clamped.
        let mut aggregate = ReviewAggregate::EMPTY;
        for _ in 0..1000 {
            aggregate = aggregate.attach(5.0);
        }
        for _ in 0..999 {
            aggregate = aggregate.detach(5.0).expect("detach");
        }
        assert!(aggregate.star_average <= STAR_MAX);
        assert!(aggregate.star_average >= STAR_MIN);
        assert_close(aggregate.star_average, 5.0);
    }

    #[test]
    fn stars_outside_the_range_fail_validation() {
        assert!(validate_stars(0.0).is_ok());
        assert!(validate_stars(5.0).is_ok());
        assert!(validate_stars(3.25).is_ok());
        assert!(validate_stars(-0.1).is_err());
        assert!(validate_stars(5.1).is_err());
        assert!(validate_stars(f64::NAN).is_err());
        assert!(validate_stars(f64::INFINITY).is_err());
    }

    #[test]
    fn blank_titles_and_topics_fail_validation() {
        assert!(validate_title("Listened twice").is_ok());
        assert!(validate_title("   ").is_err());
        assert!(validate_topic("Production").is_ok());
        assert!(validate_topic("").is_err());
    }

    #[test]
    fn insertion_defaults_to_append() {
        assert_eq!(insertion_position(None, 0).expect("position"), 1);
        assert_eq!(insertion_position(None, 3).expect("position"), 4);
    }

    #[test]
    fn insertion_accepts_in_range_and_rejects_the_rest() {
        assert_eq!(insertion_position(Some(2), 3).expect("position"), 2);
        assert_eq!(insertion_position(Some(4), 3).expect("position"), 4);
        assert!(insertion_position(Some(0), 3).is_err());
        assert!(insertion_position(Some(5), 3).is_err());
    }

    #[test]
    fn reorder_must_be_a_permutation() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let current = vec![a, b, c];

        assert!(validate_reorder(&current, &[c, a, b]).is_ok());
        assert!(validate_reorder(&current, &[a, b]).is_err());
        assert!(validate_reorder(&current, &[a, b, b]).is_err());
        assert!(validate_reorder(&current, &[a, b, Uuid::from_u128(9)]).is_err());
    }
}
