//! In-process backend implementing the repository traits.
//!
//! One mutex guards the whole state, so every write is as atomic as the
//! Postgres transactions it mirrors: aggregate arithmetic, latest-flag
//! handover and position shifts all happen under a single lock and either
//! complete together or not at all.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::application::repos::{
    AddSubReviewParams, AuditRepo, CatalogRepo, CatalogWriteRepo, CreateSubjectParams, RepoError,
    ReviewsRepo, ReviewsWriteRepo, ReviseReviewParams, SubjectSearchQuery, SubmitReviewParams,
    UpdateSubReviewParams, UpdateSubjectParams,
};
use crate::domain::catalog::SubjectKind;
use crate::domain::entities::{AuditLogRecord, ReviewRecord, SubReviewRecord, SubjectRecord};
use crate::domain::reviews::{ReviewAggregate, insertion_position, validate_reorder};

use super::util::map_domain_error;

#[derive(Default)]
struct MemoryState {
    subjects: HashMap<Uuid, SubjectRecord>,
    reviews: HashMap<Uuid, ReviewRecord>,
    sub_reviews: HashMap<Uuid, SubReviewRecord>,
    audit: Vec<AuditLogRecord>,
}

#[derive(Clone, Default)]
pub struct MemoryRepositories {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("memory repository lock poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

fn matches_tokens(subject: &SubjectRecord, tokens: &[String]) -> bool {
    let title = subject.title.to_lowercase();
    let creator = subject.creator.as_deref().map(str::to_lowercase);
    tokens.iter().all(|token| {
        title.contains(token)
            || creator
                .as_deref()
                .is_some_and(|creator| creator.contains(token))
    })
}

fn by_popularity(a: &SubjectRecord, b: &SubjectRecord) -> std::cmp::Ordering {
    b.reviews_count
        .cmp(&a.reviews_count)
        .then_with(|| a.title.cmp(&b.title))
}

fn newest_first(a: &ReviewRecord, b: &ReviewRecord) -> std::cmp::Ordering {
    (b.created_at, b.id).cmp(&(a.created_at, a.id))
}

#[async_trait]
impl CatalogRepo for MemoryRepositories {
    async fn find_subject(&self, id: Uuid) -> Result<Option<SubjectRecord>, RepoError> {
        Ok(self.state().subjects.get(&id).cloned())
    }

    async fn list_subjects_by_ids(&self, ids: &[Uuid]) -> Result<Vec<SubjectRecord>, RepoError> {
        let state = self.state();
        Ok(ids
            .iter()
            .filter_map(|id| state.subjects.get(id).cloned())
            .collect())
    }

    async fn search_subject_ids(&self, query: &SubjectSearchQuery) -> Result<Vec<Uuid>, RepoError> {
        if query.kinds.is_empty() || query.tokens.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state();
        let mut matches: Vec<&SubjectRecord> = state
            .subjects
            .values()
            .filter(|subject| query.kinds.contains(&subject.kind))
            .filter(|subject| matches_tokens(subject, &query.tokens))
            .collect();
        matches.sort_by(|a, b| by_popularity(a, b));
        Ok(matches
            .into_iter()
            .take(query.limit as usize)
            .map(|subject| subject.id)
            .collect())
    }

    async fn popular_subject_ids(
        &self,
        kind: SubjectKind,
        limit: u32,
    ) -> Result<Vec<Uuid>, RepoError> {
        let state = self.state();
        let mut matches: Vec<&SubjectRecord> = state
            .subjects
            .values()
            .filter(|subject| subject.kind == kind)
            .collect();
        matches.sort_by(|a, b| by_popularity(a, b));
        Ok(matches
            .into_iter()
            .take(limit as usize)
            .map(|subject| subject.id)
            .collect())
    }

    async fn top_rated_subject_ids(
        &self,
        kind: SubjectKind,
        limit: u32,
        min_reviews: i64,
    ) -> Result<Vec<Uuid>, RepoError> {
        let state = self.state();
        let mut matches: Vec<&SubjectRecord> = state
            .subjects
            .values()
            .filter(|subject| subject.kind == kind && subject.reviews_count >= min_reviews)
            .collect();
        matches.sort_by(|a, b| {
            b.star_average
                .total_cmp(&a.star_average)
                .then_with(|| by_popularity(a, b))
        });
        Ok(matches
            .into_iter()
            .take(limit as usize)
            .map(|subject| subject.id)
            .collect())
    }
}

#[async_trait]
impl CatalogWriteRepo for MemoryRepositories {
    async fn create_subject(
        &self,
        params: CreateSubjectParams,
    ) -> Result<SubjectRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let record = SubjectRecord {
            id: Uuid::new_v4(),
            kind: params.kind,
            title: params.title,
            creator: params.creator,
            released_on: params.released_on,
            reviews_count: 0,
            star_average: 0.0,
            created_at: now,
            updated_at: now,
        };
        self.state().subjects.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_subject(
        &self,
        params: UpdateSubjectParams,
    ) -> Result<SubjectRecord, RepoError> {
        let mut state = self.state();
        let subject = state
            .subjects
            .get_mut(&params.id)
            .ok_or(RepoError::NotFound)?;
        subject.title = params.title;
        subject.creator = params.creator;
        subject.released_on = params.released_on;
        subject.updated_at = OffsetDateTime::now_utc();
        Ok(subject.clone())
    }

    async fn delete_subject(&self, id: Uuid) -> Result<(), RepoError> {
        let mut state = self.state();
        state.subjects.remove(&id).ok_or(RepoError::NotFound)?;

        let removed_reviews: Vec<Uuid> = state
            .reviews
            .values()
            .filter(|review| review.subject_id == id)
            .map(|review| review.id)
            .collect();
        state.reviews.retain(|_, review| review.subject_id != id);
        state
            .sub_reviews
            .retain(|_, sub| !removed_reviews.contains(&sub.review_id));
        Ok(())
    }
}

#[async_trait]
impl ReviewsRepo for MemoryRepositories {
    async fn find_review(&self, id: Uuid) -> Result<Option<ReviewRecord>, RepoError> {
        Ok(self.state().reviews.get(&id).cloned())
    }

    async fn latest_reviews(
        &self,
        subject_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ReviewRecord>, RepoError> {
        let state = self.state();
        let mut matches: Vec<ReviewRecord> = state
            .reviews
            .values()
            .filter(|review| review.subject_id == subject_id && review.is_latest)
            .cloned()
            .collect();
        matches.sort_by(newest_first);
        matches.truncate(limit as usize);
        Ok(matches)
    }

    async fn reviews_by_author(
        &self,
        author_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ReviewRecord>, RepoError> {
        let state = self.state();
        let mut matches: Vec<ReviewRecord> = state
            .reviews
            .values()
            .filter(|review| review.author_id == author_id && review.is_latest)
            .cloned()
            .collect();
        matches.sort_by(newest_first);
        matches.truncate(limit as usize);
        Ok(matches)
    }

    async fn review_history(
        &self,
        subject_id: Uuid,
        author_id: Uuid,
    ) -> Result<Vec<ReviewRecord>, RepoError> {
        let state = self.state();
        let mut matches: Vec<ReviewRecord> = state
            .reviews
            .values()
            .filter(|review| review.subject_id == subject_id && review.author_id == author_id)
            .cloned()
            .collect();
        matches.sort_by(newest_first);
        Ok(matches)
    }

    async fn list_sub_reviews(&self, review_id: Uuid) -> Result<Vec<SubReviewRecord>, RepoError> {
        let state = self.state();
        let mut matches: Vec<SubReviewRecord> = state
            .sub_reviews
            .values()
            .filter(|sub| sub.review_id == review_id)
            .cloned()
            .collect();
        matches.sort_by_key(|sub| sub.position);
        Ok(matches)
    }

    async fn find_sub_review(&self, id: Uuid) -> Result<Option<SubReviewRecord>, RepoError> {
        Ok(self.state().sub_reviews.get(&id).cloned())
    }
}

#[async_trait]
impl ReviewsWriteRepo for MemoryRepositories {
    async fn submit_review(&self, params: SubmitReviewParams) -> Result<ReviewRecord, RepoError> {
        let mut state = self.state();
        let now = OffsetDateTime::now_utc();

        let (subject_kind, aggregate) = {
            let subject = state
                .subjects
                .get(&params.subject_id)
                .ok_or(RepoError::NotFound)?;
            (
                subject.kind,
                ReviewAggregate::new(subject.reviews_count, subject.star_average),
            )
        };

        let previous = state
            .reviews
            .values()
            .find(|review| {
                review.subject_id == params.subject_id
                    && review.author_id == params.author_id
                    && review.is_latest
            })
            .map(|review| (review.id, review.stars));

        let next = match previous {
            Some((previous_id, previous_stars)) => {
                if let Some(previous) = state.reviews.get_mut(&previous_id) {
                    previous.is_latest = false;
                    previous.updated_at = now;
                }
                aggregate
                    .replace(previous_stars, params.stars)
                    .map_err(map_domain_error)?
            }
            None => aggregate.attach(params.stars),
        };

        let record = ReviewRecord {
            id: Uuid::new_v4(),
            subject_id: params.subject_id,
            subject_kind,
            author_id: params.author_id,
            stars: params.stars,
            title: params.title,
            body: params.body,
            is_latest: true,
            created_at: now,
            updated_at: now,
        };
        state.reviews.insert(record.id, record.clone());

        if let Some(subject) = state.subjects.get_mut(&params.subject_id) {
            subject.reviews_count = next.reviews_count;
            subject.star_average = next.star_average;
            subject.updated_at = now;
        }

        Ok(record)
    }

    async fn revise_review(&self, params: ReviseReviewParams) -> Result<ReviewRecord, RepoError> {
        let mut state = self.state();
        let now = OffsetDateTime::now_utc();

        let current = state
            .reviews
            .get(&params.review_id)
            .cloned()
            .ok_or(RepoError::NotFound)?;

        let stars = params.stars.unwrap_or(current.stars);
        let title = params.title.unwrap_or_else(|| current.title.clone());
        let body = params.body.unwrap_or_else(|| current.body.clone());

        if current.is_latest && stars != current.stars {
            let subject = state
                .subjects
                .get(&current.subject_id)
                .ok_or(RepoError::NotFound)?;
            let next = ReviewAggregate::new(subject.reviews_count, subject.star_average)
                .replace(current.stars, stars)
                .map_err(map_domain_error)?;
            if let Some(subject) = state.subjects.get_mut(&current.subject_id) {
                subject.reviews_count = next.reviews_count;
                subject.star_average = next.star_average;
                subject.updated_at = now;
            }
        }

        let review = state
            .reviews
            .get_mut(&params.review_id)
            .ok_or(RepoError::NotFound)?;
        review.stars = stars;
        review.title = title;
        review.body = body;
        review.updated_at = now;
        Ok(review.clone())
    }

    async fn withdraw_review(&self, review_id: Uuid) -> Result<(), RepoError> {
        let mut state = self.state();
        let now = OffsetDateTime::now_utc();

        let removed = state
            .reviews
            .remove(&review_id)
            .ok_or(RepoError::NotFound)?;
        state.sub_reviews.retain(|_, sub| sub.review_id != review_id);

        if removed.is_latest {
            let aggregate = {
                let subject = state
                    .subjects
                    .get(&removed.subject_id)
                    .ok_or(RepoError::NotFound)?;
                ReviewAggregate::new(subject.reviews_count, subject.star_average)
            };

            let successor = state
                .reviews
                .values()
                .filter(|review| {
                    review.subject_id == removed.subject_id
                        && review.author_id == removed.author_id
                })
                .max_by_key(|review| (review.created_at, review.id))
                .map(|review| (review.id, review.stars));

            let next = match successor {
                Some((successor_id, successor_stars)) => {
                    if let Some(successor) = state.reviews.get_mut(&successor_id) {
                        successor.is_latest = true;
                        successor.updated_at = now;
                    }
                    aggregate
                        .replace(removed.stars, successor_stars)
                        .map_err(map_domain_error)?
                }
                None => aggregate.detach(removed.stars).map_err(map_domain_error)?,
            };

            if let Some(subject) = state.subjects.get_mut(&removed.subject_id) {
                subject.reviews_count = next.reviews_count;
                subject.star_average = next.star_average;
                subject.updated_at = now;
            }
        }

        Ok(())
    }

    async fn add_sub_review(
        &self,
        params: AddSubReviewParams,
    ) -> Result<SubReviewRecord, RepoError> {
        let mut state = self.state();
        let now = OffsetDateTime::now_utc();

        if !state.reviews.contains_key(&params.review_id) {
            return Err(RepoError::NotFound);
        }

        let existing = state
            .sub_reviews
            .values()
            .filter(|sub| sub.review_id == params.review_id)
            .count();
        let position =
            insertion_position(params.position, existing).map_err(map_domain_error)?;

        for sub in state
            .sub_reviews
            .values_mut()
            .filter(|sub| sub.review_id == params.review_id && sub.position >= position)
        {
            sub.position += 1;
            sub.updated_at = now;
        }

        let record = SubReviewRecord {
            id: Uuid::new_v4(),
            review_id: params.review_id,
            position,
            topic: params.topic,
            body: params.body,
            stars: params.stars,
            created_at: now,
            updated_at: now,
        };
        state.sub_reviews.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_sub_review(
        &self,
        params: UpdateSubReviewParams,
    ) -> Result<SubReviewRecord, RepoError> {
        let mut state = self.state();
        let sub = state
            .sub_reviews
            .get_mut(&params.sub_review_id)
            .ok_or(RepoError::NotFound)?;
        if let Some(topic) = params.topic {
            sub.topic = topic;
        }
        if let Some(body) = params.body {
            sub.body = body;
        }
        if let Some(stars) = params.stars {
            sub.stars = stars;
        }
        sub.updated_at = OffsetDateTime::now_utc();
        Ok(sub.clone())
    }

    async fn remove_sub_review(&self, sub_review_id: Uuid) -> Result<(), RepoError> {
        let mut state = self.state();
        let now = OffsetDateTime::now_utc();

        let removed = state
            .sub_reviews
            .remove(&sub_review_id)
            .ok_or(RepoError::NotFound)?;

        for sub in state
            .sub_reviews
            .values_mut()
            .filter(|sub| sub.review_id == removed.review_id && sub.position > removed.position)
        {
            sub.position -= 1;
            sub.updated_at = now;
        }

        Ok(())
    }

    async fn reorder_sub_reviews(
        &self,
        review_id: Uuid,
        order: &[Uuid],
    ) -> Result<Vec<SubReviewRecord>, RepoError> {
        let mut state = self.state();
        let now = OffsetDateTime::now_utc();

        if !state.reviews.contains_key(&review_id) {
            return Err(RepoError::NotFound);
        }

        let mut current: Vec<(i32, Uuid)> = state
            .sub_reviews
            .values()
            .filter(|sub| sub.review_id == review_id)
            .map(|sub| (sub.position, sub.id))
            .collect();
        current.sort();
        let current: Vec<Uuid> = current.into_iter().map(|(_, id)| id).collect();

        validate_reorder(&current, order).map_err(map_domain_error)?;

        for (index, id) in order.iter().enumerate() {
            if let Some(sub) = state.sub_reviews.get_mut(id) {
                sub.position = index as i32 + 1;
                sub.updated_at = now;
            }
        }

        let mut reordered: Vec<SubReviewRecord> = state
            .sub_reviews
            .values()
            .filter(|sub| sub.review_id == review_id)
            .cloned()
            .collect();
        reordered.sort_by_key(|sub| sub.position);
        Ok(reordered)
    }
}

#[async_trait]
impl AuditRepo for MemoryRepositories {
    async fn append_log(&self, record: AuditLogRecord) -> Result<(), RepoError> {
        self.state().audit.push(record);
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<AuditLogRecord>, RepoError> {
        let state = self.state();
        Ok(state
            .audit
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_subject(repos: &MemoryRepositories, kind: SubjectKind) -> SubjectRecord {
        repos
            .create_subject(CreateSubjectParams {
                kind,
                title: "Mezzanine".to_string(),
                creator: Some("Massive Attack".to_string()),
                released_on: None,
            })
            .await
            .unwrap()
    }

    fn submit(subject_id: Uuid, author_id: Uuid, stars: f64) -> SubmitReviewParams {
        SubmitReviewParams {
            subject_id,
            author_id,
            stars,
            title: "notes".to_string(),
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn resubmission_demotes_the_previous_review() {
        let repos = MemoryRepositories::new();
        let subject = seed_subject(&repos, SubjectKind::Project).await;
        let author = Uuid::new_v4();

        let first = repos
            .submit_review(submit(subject.id, author, 4.0))
            .await
            .unwrap();
        let second = repos
            .submit_review(submit(subject.id, author, 2.0))
            .await
            .unwrap();

        let stored_first = repos.find_review(first.id).await.unwrap().unwrap();
        assert!(!stored_first.is_latest);
        assert!(second.is_latest);

        let stored_subject = repos.find_subject(subject.id).await.unwrap().unwrap();
        assert_eq!(stored_subject.reviews_count, 1);
        assert!((stored_subject.star_average - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn withdraw_promotes_the_previous_submission() {
        let repos = MemoryRepositories::new();
        let subject = seed_subject(&repos, SubjectKind::Song).await;
        let author = Uuid::new_v4();

        let first = repos
            .submit_review(submit(subject.id, author, 4.0))
            .await
            .unwrap();
        let second = repos
            .submit_review(submit(subject.id, author, 1.0))
            .await
            .unwrap();

        repos.withdraw_review(second.id).await.unwrap();

        let promoted = repos.find_review(first.id).await.unwrap().unwrap();
        assert!(promoted.is_latest);

        let stored_subject = repos.find_subject(subject.id).await.unwrap().unwrap();
        assert_eq!(stored_subject.reviews_count, 1);
        assert!((stored_subject.star_average - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn positions_stay_contiguous_through_insert_and_remove() {
        let repos = MemoryRepositories::new();
        let subject = seed_subject(&repos, SubjectKind::Outfit).await;
        let author = Uuid::new_v4();
        let review = repos
            .submit_review(submit(subject.id, author, 3.0))
            .await
            .unwrap();

        let add = |topic: &str, position: Option<i32>| AddSubReviewParams {
            review_id: review.id,
            topic: topic.to_string(),
            body: String::new(),
            stars: 3.0,
            position,
        };

        repos.add_sub_review(add("fit", None)).await.unwrap();
        let fabric = repos.add_sub_review(add("fabric", None)).await.unwrap();
        repos.add_sub_review(add("color", Some(1))).await.unwrap();

        let listed = repos.list_sub_reviews(review.id).await.unwrap();
        let topics: Vec<&str> = listed.iter().map(|sub| sub.topic.as_str()).collect();
        assert_eq!(topics, vec!["color", "fit", "fabric"]);
        assert_eq!(
            listed.iter().map(|sub| sub.position).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        repos.remove_sub_review(fabric.id).await.unwrap();
        let listed = repos.list_sub_reviews(review.id).await.unwrap();
        assert_eq!(
            listed.iter().map(|sub| sub.position).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn deleting_a_subject_cascades_to_reviews_and_sub_reviews() {
        let repos = MemoryRepositories::new();
        let subject = seed_subject(&repos, SubjectKind::Event).await;
        let review = repos
            .submit_review(submit(subject.id, Uuid::new_v4(), 5.0))
            .await
            .unwrap();
        repos
            .add_sub_review(AddSubReviewParams {
                review_id: review.id,
                topic: "venue".to_string(),
                body: String::new(),
                stars: 5.0,
                position: None,
            })
            .await
            .unwrap();

        repos.delete_subject(subject.id).await.unwrap();

        assert!(repos.find_review(review.id).await.unwrap().is_none());
        assert!(repos.list_sub_reviews(review.id).await.unwrap().is_empty());
    }
}
