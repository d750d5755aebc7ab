//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::Date;
use uuid::Uuid;

use crate::domain::catalog::SubjectKind;
use crate::domain::entities::{AuditLogRecord, ReviewRecord, SubReviewRecord, SubjectRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Token search over subjects, restricted to a kind set.
///
/// `tokens` are already normalized (lowercased, deduplicated); adapters
/// AND them together and order results by review count, then title.
#[derive(Debug, Clone)]
pub struct SubjectSearchQuery {
    pub kinds: Vec<SubjectKind>,
    pub tokens: Vec<String>,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct CreateSubjectParams {
    pub kind: SubjectKind,
    pub title: String,
    pub creator: Option<String>,
    pub released_on: Option<Date>,
}

#[derive(Debug, Clone)]
pub struct UpdateSubjectParams {
    pub id: Uuid,
    pub title: String,
    pub creator: Option<String>,
    pub released_on: Option<Date>,
}

#[derive(Debug, Clone)]
pub struct SubmitReviewParams {
    pub subject_id: Uuid,
    pub author_id: Uuid,
    pub stars: f64,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct ReviseReviewParams {
    pub review_id: Uuid,
    pub stars: Option<f64>,
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AddSubReviewParams {
    pub review_id: Uuid,
    pub topic: String,
    pub body: String,
    pub stars: f64,
    /// 1-based slot; `None` appends after the current last entry.
    pub position: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct UpdateSubReviewParams {
    pub sub_review_id: Uuid,
    pub topic: Option<String>,
    pub body: Option<String>,
    pub stars: Option<f64>,
}

#[async_trait]
pub trait CatalogRepo: Send + Sync {
    async fn find_subject(&self, id: Uuid) -> Result<Option<SubjectRecord>, RepoError>;
    /// Fetches whichever of `ids` still exist; order is unspecified.
    async fn list_subjects_by_ids(&self, ids: &[Uuid]) -> Result<Vec<SubjectRecord>, RepoError>;
    async fn search_subject_ids(&self, query: &SubjectSearchQuery) -> Result<Vec<Uuid>, RepoError>;
    async fn popular_subject_ids(
        &self,
        kind: SubjectKind,
        limit: u32,
    ) -> Result<Vec<Uuid>, RepoError>;
    async fn top_rated_subject_ids(
        &self,
        kind: SubjectKind,
        limit: u32,
        min_reviews: i64,
    ) -> Result<Vec<Uuid>, RepoError>;
}

#[async_trait]
pub trait CatalogWriteRepo: Send + Sync {
    async fn create_subject(&self, params: CreateSubjectParams)
    -> Result<SubjectRecord, RepoError>;
    async fn update_subject(&self, params: UpdateSubjectParams)
    -> Result<SubjectRecord, RepoError>;
    /// Removes the subject together with its reviews and sub-reviews.
    async fn delete_subject(&self, id: Uuid) -> Result<(), RepoError>;
}

#[async_trait]
pub trait ReviewsRepo: Send + Sync {
    async fn find_review(&self, id: Uuid) -> Result<Option<ReviewRecord>, RepoError>;
    /// Current (`is_latest`) reviews for a subject, newest first.
    async fn latest_reviews(
        &self,
        subject_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ReviewRecord>, RepoError>;
    /// Current reviews written by one author across all subjects, newest first.
    async fn reviews_by_author(
        &self,
        author_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ReviewRecord>, RepoError>;
    /// Every review one author has filed against one subject, newest first.
    async fn review_history(
        &self,
        subject_id: Uuid,
        author_id: Uuid,
    ) -> Result<Vec<ReviewRecord>, RepoError>;
    /// Sub-reviews of a review ordered by position.
    async fn list_sub_reviews(&self, review_id: Uuid) -> Result<Vec<SubReviewRecord>, RepoError>;
    async fn find_sub_review(&self, id: Uuid) -> Result<Option<SubReviewRecord>, RepoError>;
}

/// Write side of the review store.
///
/// Every method runs as one atomic unit: the subject row is locked, the
/// review tables and the subject's aggregate columns change together, and
/// a failure leaves no partial state behind. Aggregate arithmetic follows
/// [`crate::domain::reviews::ReviewAggregate`].
#[async_trait]
pub trait ReviewsWriteRepo: Send + Sync {
    /// Inserts a new latest review, demoting the author's previous latest
    /// review of the same subject if one exists.
    async fn submit_review(&self, params: SubmitReviewParams) -> Result<ReviewRecord, RepoError>;
    /// Applies edits in place. Adjusts the subject aggregate only when the
    /// review is the author's latest and the star value actually changed.
    async fn revise_review(&self, params: ReviseReviewParams) -> Result<ReviewRecord, RepoError>;
    /// Deletes a review. When the latest review is withdrawn, the author's
    /// next most recent review of the subject (if any) is promoted in its
    /// place; otherwise the subject aggregate drops the star value.
    async fn withdraw_review(&self, review_id: Uuid) -> Result<(), RepoError>;
    async fn add_sub_review(&self, params: AddSubReviewParams)
    -> Result<SubReviewRecord, RepoError>;
    async fn update_sub_review(
        &self,
        params: UpdateSubReviewParams,
    ) -> Result<SubReviewRecord, RepoError>;
    /// Deletes a sub-review and closes the position gap it leaves.
    async fn remove_sub_review(&self, sub_review_id: Uuid) -> Result<(), RepoError>;
    /// Rewrites positions to match `order`, which must be a permutation of
    /// the review's current sub-review ids.
    async fn reorder_sub_reviews(
        &self,
        review_id: Uuid,
        order: &[Uuid],
    ) -> Result<Vec<SubReviewRecord>, RepoError>;
}

#[async_trait]
pub trait AuditRepo: Send + Sync {
    async fn append_log(&self, record: AuditLogRecord) -> Result<(), RepoError>;
    async fn list_recent(&self, limit: u32) -> Result<Vec<AuditLogRecord>, RepoError>;
}
