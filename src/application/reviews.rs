use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::application::audit::AuditService;
use crate::application::error::AppError;
use crate::application::identity::Actor;
use crate::application::repos::{
    AddSubReviewParams, CatalogRepo, ReviewsRepo, ReviewsWriteRepo, ReviseReviewParams,
    SubmitReviewParams, UpdateSubReviewParams,
};
use crate::cache::CacheTrigger;
use crate::domain::entities::{ReviewRecord, SubReviewRecord};
use crate::domain::reviews::{validate_stars, validate_title, validate_topic};

#[derive(Debug, Clone)]
pub struct SubmitReviewCommand {
    pub subject_id: Uuid,
    pub stars: f64,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct ReviseReviewCommand {
    pub review_id: Uuid,
    pub stars: Option<f64>,
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AddSubReviewCommand {
    pub review_id: Uuid,
    pub topic: String,
    pub body: String,
    pub stars: f64,
    pub position: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct UpdateSubReviewCommand {
    pub sub_review_id: Uuid,
    pub topic: Option<String>,
    pub body: Option<String>,
    pub stars: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ReorderSubReviewsCommand {
    pub review_id: Uuid,
    pub order: Vec<Uuid>,
}

#[derive(Serialize)]
struct ReviewSnapshot<'a> {
    subject_id: Uuid,
    stars: f64,
    title: &'a str,
}

#[derive(Serialize)]
struct SubReviewSnapshot<'a> {
    review_id: Uuid,
    position: i32,
    topic: &'a str,
}

/// Review lifecycle operations and the star-aggregate bookkeeping that
/// rides along with them.
///
/// The service validates input, enforces authorship, and records audit
/// entries; the write repository performs each state change as a single
/// atomic unit so the subject's `reviews_count`/`star_average` can never
/// drift from its review rows.
#[derive(Clone)]
pub struct ReviewService {
    catalog: Arc<dyn CatalogRepo>,
    reader: Arc<dyn ReviewsRepo>,
    writer: Arc<dyn ReviewsWriteRepo>,
    audit: AuditService,
    cache_trigger: Option<Arc<CacheTrigger>>,
}

impl ReviewService {
    pub fn new(
        catalog: Arc<dyn CatalogRepo>,
        reader: Arc<dyn ReviewsRepo>,
        writer: Arc<dyn ReviewsWriteRepo>,
        audit: AuditService,
    ) -> Self {
        Self {
            catalog,
            reader,
            writer,
            audit,
            cache_trigger: None,
        }
    }

    /// Set the cache trigger for this service.
    pub fn with_cache_trigger(mut self, trigger: Arc<CacheTrigger>) -> Self {
        self.cache_trigger = Some(trigger);
        self
    }

    /// Set the cache trigger for this service (optional).
    pub fn with_cache_trigger_opt(mut self, trigger: Option<Arc<CacheTrigger>>) -> Self {
        self.cache_trigger = trigger;
        self
    }

    pub async fn find_review(&self, id: Uuid) -> Result<Option<ReviewRecord>, AppError> {
        Ok(self.reader.find_review(id).await?)
    }

    /// Current reviews of a subject, newest first. One entry per author.
    pub async fn latest_reviews(
        &self,
        subject_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ReviewRecord>, AppError> {
        Ok(self.reader.latest_reviews(subject_id, limit).await?)
    }

    pub async fn reviews_by_author(
        &self,
        author_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ReviewRecord>, AppError> {
        Ok(self.reader.reviews_by_author(author_id, limit).await?)
    }

    /// Full submission history one author has for one subject, newest first.
    pub async fn review_history(
        &self,
        subject_id: Uuid,
        author_id: Uuid,
    ) -> Result<Vec<ReviewRecord>, AppError> {
        Ok(self.reader.review_history(subject_id, author_id).await?)
    }

    pub async fn sub_reviews(&self, review_id: Uuid) -> Result<Vec<SubReviewRecord>, AppError> {
        Ok(self.reader.list_sub_reviews(review_id).await?)
    }

    /// Files a new review. If the author already reviewed this subject, the
    /// previous review stays as history and the new one takes its place in
    /// the subject aggregate.
    pub async fn submit_review(
        &self,
        actor: &Actor,
        command: SubmitReviewCommand,
    ) -> Result<ReviewRecord, AppError> {
        let author_id = actor.require_user()?;
        validate_stars(command.stars)?;
        validate_title(&command.title)?;

        let subject = self
            .catalog
            .find_subject(command.subject_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let review = self
            .writer
            .submit_review(SubmitReviewParams {
                subject_id: subject.id,
                author_id,
                stars: command.stars,
                title: command.title,
                body: command.body,
            })
            .await?;

        let snapshot = ReviewSnapshot {
            subject_id: subject.id,
            stars: review.stars,
            title: review.title.as_str(),
        };
        self.audit
            .record(
                &actor.label(),
                "review.submit",
                "review",
                Some(&review.id.to_string()),
                Some(&snapshot),
            )
            .await;

        if let Some(trigger) = &self.cache_trigger {
            trigger.subject_reviewed(subject.kind, subject.id).await;
        }

        Ok(review)
    }

    /// Edits a review in place. Only the author may revise, and the subject
    /// aggregate moves only when the review is the author's current one and
    /// the star value actually changed.
    pub async fn revise_review(
        &self,
        actor: &Actor,
        command: ReviseReviewCommand,
    ) -> Result<ReviewRecord, AppError> {
        let author_id = actor.require_user()?;
        if let Some(stars) = command.stars {
            validate_stars(stars)?;
        }
        if let Some(title) = &command.title {
            validate_title(title)?;
        }

        let existing = self
            .reader
            .find_review(command.review_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if existing.author_id != author_id {
            return Err(AppError::permission_denied("only the author may revise a review"));
        }

        let aggregate_moves = existing.is_latest
            && command.stars.is_some_and(|stars| stars != existing.stars);

        let review = self
            .writer
            .revise_review(ReviseReviewParams {
                review_id: command.review_id,
                stars: command.stars,
                title: command.title,
                body: command.body,
            })
            .await?;

        let snapshot = ReviewSnapshot {
            subject_id: review.subject_id,
            stars: review.stars,
            title: review.title.as_str(),
        };
        self.audit
            .record(
                &actor.label(),
                "review.revise",
                "review",
                Some(&review.id.to_string()),
                Some(&snapshot),
            )
            .await;

        if aggregate_moves && let Some(trigger) = &self.cache_trigger {
            trigger
                .subject_reviewed(existing.subject_kind, existing.subject_id)
                .await;
        }

        Ok(review)
    }

    /// Deletes a review. Withdrawing the author's current review promotes
    /// their next most recent one for the same subject, or detaches the
    /// stars from the aggregate when no earlier review exists.
    pub async fn withdraw_review(&self, actor: &Actor, review_id: Uuid) -> Result<(), AppError> {
        let author_id = actor.require_user()?;

        let existing = self
            .reader
            .find_review(review_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if existing.author_id != author_id {
            return Err(AppError::permission_denied(
                "only the author may withdraw a review",
            ));
        }

        self.writer.withdraw_review(review_id).await?;

        let snapshot = ReviewSnapshot {
            subject_id: existing.subject_id,
            stars: existing.stars,
            title: existing.title.as_str(),
        };
        self.audit
            .record(
                &actor.label(),
                "review.withdraw",
                "review",
                Some(&review_id.to_string()),
                Some(&snapshot),
            )
            .await;

        if existing.is_latest && let Some(trigger) = &self.cache_trigger {
            trigger
                .subject_reviewed(existing.subject_kind, existing.subject_id)
                .await;
        }

        Ok(())
    }

    /// Appends or inserts an itemized verdict under a review. Positions are
    /// 1-based and stay contiguous.
    pub async fn add_sub_review(
        &self,
        actor: &Actor,
        command: AddSubReviewCommand,
    ) -> Result<SubReviewRecord, AppError> {
        let author_id = actor.require_user()?;
        validate_topic(&command.topic)?;
        validate_stars(command.stars)?;

        let review = self
            .reader
            .find_review(command.review_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if review.author_id != author_id {
            return Err(AppError::permission_denied(
                "only the author may extend a review",
            ));
        }

        let sub_review = self
            .writer
            .add_sub_review(AddSubReviewParams {
                review_id: command.review_id,
                topic: command.topic,
                body: command.body,
                stars: command.stars,
                position: command.position,
            })
            .await?;

        let snapshot = SubReviewSnapshot {
            review_id: sub_review.review_id,
            position: sub_review.position,
            topic: sub_review.topic.as_str(),
        };
        self.audit
            .record(
                &actor.label(),
                "sub_review.add",
                "sub_review",
                Some(&sub_review.id.to_string()),
                Some(&snapshot),
            )
            .await;

        Ok(sub_review)
    }

    pub async fn update_sub_review(
        &self,
        actor: &Actor,
        command: UpdateSubReviewCommand,
    ) -> Result<SubReviewRecord, AppError> {
        let author_id = actor.require_user()?;
        if let Some(topic) = &command.topic {
            validate_topic(topic)?;
        }
        if let Some(stars) = command.stars {
            validate_stars(stars)?;
        }

        let existing = self
            .reader
            .find_sub_review(command.sub_review_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.ensure_review_author(existing.review_id, author_id)
            .await?;

        let sub_review = self
            .writer
            .update_sub_review(UpdateSubReviewParams {
                sub_review_id: command.sub_review_id,
                topic: command.topic,
                body: command.body,
                stars: command.stars,
            })
            .await?;

        let snapshot = SubReviewSnapshot {
            review_id: sub_review.review_id,
            position: sub_review.position,
            topic: sub_review.topic.as_str(),
        };
        self.audit
            .record(
                &actor.label(),
                "sub_review.update",
                "sub_review",
                Some(&sub_review.id.to_string()),
                Some(&snapshot),
            )
            .await;

        Ok(sub_review)
    }

    /// Deletes a sub-review; later entries shift up to close the gap.
    pub async fn remove_sub_review(
        &self,
        actor: &Actor,
        sub_review_id: Uuid,
    ) -> Result<(), AppError> {
        let author_id = actor.require_user()?;

        let existing = self
            .reader
            .find_sub_review(sub_review_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.ensure_review_author(existing.review_id, author_id)
            .await?;

        self.writer.remove_sub_review(sub_review_id).await?;

        let snapshot = SubReviewSnapshot {
            review_id: existing.review_id,
            position: existing.position,
            topic: existing.topic.as_str(),
        };
        self.audit
            .record(
                &actor.label(),
                "sub_review.remove",
                "sub_review",
                Some(&sub_review_id.to_string()),
                Some(&snapshot),
            )
            .await;

        Ok(())
    }

    /// Rewrites sub-review positions to match `order`, which must list every
    /// current sub-review id exactly once.
    pub async fn reorder_sub_reviews(
        &self,
        actor: &Actor,
        command: ReorderSubReviewsCommand,
    ) -> Result<Vec<SubReviewRecord>, AppError> {
        let author_id = actor.require_user()?;

        let review = self
            .reader
            .find_review(command.review_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if review.author_id != author_id {
            return Err(AppError::permission_denied(
                "only the author may reorder a review",
            ));
        }

        let reordered = self
            .writer
            .reorder_sub_reviews(command.review_id, &command.order)
            .await?;

        self.audit
            .record::<()>(
                &actor.label(),
                "sub_review.reorder",
                "review",
                Some(&command.review_id.to_string()),
                None,
            )
            .await;

        Ok(reordered)
    }

    async fn ensure_review_author(&self, review_id: Uuid, author_id: Uuid) -> Result<(), AppError> {
        let review = self
            .reader
            .find_review(review_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if review.author_id != author_id {
            return Err(AppError::permission_denied(
                "only the author may edit a review",
            ));
        }
        Ok(())
    }
}
