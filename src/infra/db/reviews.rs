//! Review lifecycle transactions.
//!
//! Every write locks the subject row first (`SELECT ... FOR UPDATE`), then
//! adjusts review rows and the subject's aggregate columns inside the same
//! transaction. Sub-review writes lock their parent review instead; they
//! never touch aggregates. Locks are always taken subject before review so
//! concurrent writers queue instead of deadlocking.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    AddSubReviewParams, RepoError, ReviewsRepo, ReviewsWriteRepo, ReviseReviewParams,
    SubmitReviewParams, UpdateSubReviewParams,
};
use crate::domain::catalog::SubjectKind;
use crate::domain::entities::{ReviewRecord, SubReviewRecord};
use crate::domain::reviews::{ReviewAggregate, insertion_position, validate_reorder};

use super::types::{ReviewRow, SubReviewRow};
use super::util::map_domain_error;
use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct LockedSubject {
    kind: SubjectKind,
    reviews_count: i64,
    star_average: f64,
}

#[derive(sqlx::FromRow)]
struct LatestReview {
    id: Uuid,
    stars: f64,
}

async fn lock_subject(
    tx: &mut Transaction<'_, Postgres>,
    subject_id: Uuid,
) -> Result<LockedSubject, RepoError> {
    sqlx::query_as::<_, LockedSubject>(
        "SELECT kind, reviews_count, star_average FROM subjects WHERE id = $1 FOR UPDATE",
    )
    .bind(subject_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(map_sqlx_error)?
    .ok_or(RepoError::NotFound)
}

async fn store_aggregate(
    tx: &mut Transaction<'_, Postgres>,
    subject_id: Uuid,
    aggregate: ReviewAggregate,
    now: OffsetDateTime,
) -> Result<(), RepoError> {
    sqlx::query(
        "UPDATE subjects SET reviews_count = $2, star_average = $3, updated_at = $4 WHERE id = $1",
    )
    .bind(subject_id)
    .bind(aggregate.reviews_count)
    .bind(aggregate.star_average)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

#[async_trait]
impl ReviewsRepo for PostgresRepositories {
    async fn find_review(&self, id: Uuid) -> Result<Option<ReviewRecord>, RepoError> {
        let row = sqlx::query_as::<_, ReviewRow>(
            "SELECT id, subject_id, subject_kind, author_id, stars, title, body, is_latest, \
                    created_at, updated_at \
             FROM reviews WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ReviewRecord::from))
    }

    async fn latest_reviews(
        &self,
        subject_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ReviewRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT id, subject_id, subject_kind, author_id, stars, title, body, is_latest, \
                    created_at, updated_at \
             FROM reviews WHERE subject_id = $1 AND is_latest \
             ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(subject_id)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ReviewRecord::from).collect())
    }

    async fn reviews_by_author(
        &self,
        author_id: Uuid,
        limit: u32,
    ) -> Result<Vec<ReviewRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT id, subject_id, subject_kind, author_id, stars, title, body, is_latest, \
                    created_at, updated_at \
             FROM reviews WHERE author_id = $1 AND is_latest \
             ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(author_id)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ReviewRecord::from).collect())
    }

    async fn review_history(
        &self,
        subject_id: Uuid,
        author_id: Uuid,
    ) -> Result<Vec<ReviewRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT id, subject_id, subject_kind, author_id, stars, title, body, is_latest, \
                    created_at, updated_at \
             FROM reviews WHERE subject_id = $1 AND author_id = $2 \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(subject_id)
        .bind(author_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ReviewRecord::from).collect())
    }

    async fn list_sub_reviews(&self, review_id: Uuid) -> Result<Vec<SubReviewRecord>, RepoError> {
        let rows = sqlx::query_as::<_, SubReviewRow>(
            "SELECT id, review_id, position, topic, body, stars, created_at, updated_at \
             FROM sub_reviews WHERE review_id = $1 ORDER BY position ASC",
        )
        .bind(review_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SubReviewRecord::from).collect())
    }

    async fn find_sub_review(&self, id: Uuid) -> Result<Option<SubReviewRecord>, RepoError> {
        let row = sqlx::query_as::<_, SubReviewRow>(
            "SELECT id, review_id, position, topic, body, stars, created_at, updated_at \
             FROM sub_reviews WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SubReviewRecord::from))
    }
}

#[async_trait]
impl ReviewsWriteRepo for PostgresRepositories {
    async fn submit_review(&self, params: SubmitReviewParams) -> Result<ReviewRecord, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        let now = OffsetDateTime::now_utc();

        let subject = lock_subject(&mut tx, params.subject_id).await?;
        let aggregate = ReviewAggregate::new(subject.reviews_count, subject.star_average);

        let previous = sqlx::query_as::<_, LatestReview>(
            "SELECT id, stars FROM reviews \
             WHERE subject_id = $1 AND author_id = $2 AND is_latest FOR UPDATE",
        )
        .bind(params.subject_id)
        .bind(params.author_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let next = match &previous {
            Some(previous) => {
                sqlx::query("UPDATE reviews SET is_latest = FALSE, updated_at = $2 WHERE id = $1")
                    .bind(previous.id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;
                aggregate
                    .replace(previous.stars, params.stars)
                    .map_err(map_domain_error)?
            }
            None => aggregate.attach(params.stars),
        };

        let row = sqlx::query_as::<_, ReviewRow>(
            "INSERT INTO reviews \
                 (id, subject_id, subject_kind, author_id, stars, title, body, is_latest, \
                  created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $8) \
             RETURNING id, subject_id, subject_kind, author_id, stars, title, body, is_latest, \
                       created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(params.subject_id)
        .bind(subject.kind)
        .bind(params.author_id)
        .bind(params.stars)
        .bind(params.title)
        .bind(params.body)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        store_aggregate(&mut tx, params.subject_id, next, now).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(ReviewRecord::from(row))
    }

    async fn revise_review(&self, params: ReviseReviewParams) -> Result<ReviewRecord, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        let now = OffsetDateTime::now_utc();

        // Resolve the subject without a lock, then lock subject before review.
        let subject_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT subject_id FROM reviews WHERE id = $1",
        )
        .bind(params.review_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        let subject = lock_subject(&mut tx, subject_id).await?;

        let current = sqlx::query_as::<_, ReviewRow>(
            "SELECT id, subject_id, subject_kind, author_id, stars, title, body, is_latest, \
                    created_at, updated_at \
             FROM reviews WHERE id = $1 FOR UPDATE",
        )
        .bind(params.review_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        let stars = params.stars.unwrap_or(current.stars);
        let title = params.title.unwrap_or_else(|| current.title.clone());
        let body = params.body.unwrap_or_else(|| current.body.clone());

        if current.is_latest && stars != current.stars {
            let aggregate = ReviewAggregate::new(subject.reviews_count, subject.star_average)
                .replace(current.stars, stars)
                .map_err(map_domain_error)?;
            store_aggregate(&mut tx, subject_id, aggregate, now).await?;
        }

        let row = sqlx::query_as::<_, ReviewRow>(
            "UPDATE reviews SET stars = $2, title = $3, body = $4, updated_at = $5 \
             WHERE id = $1 \
             RETURNING id, subject_id, subject_kind, author_id, stars, title, body, is_latest, \
                       created_at, updated_at",
        )
        .bind(params.review_id)
        .bind(stars)
        .bind(title)
        .bind(body)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(ReviewRecord::from(row))
    }

    async fn withdraw_review(&self, review_id: Uuid) -> Result<(), RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        let now = OffsetDateTime::now_utc();

        let subject_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT subject_id FROM reviews WHERE id = $1",
        )
        .bind(review_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        let subject = lock_subject(&mut tx, subject_id).await?;

        let current = sqlx::query_as::<_, ReviewRow>(
            "SELECT id, subject_id, subject_kind, author_id, stars, title, body, is_latest, \
                    created_at, updated_at \
             FROM reviews WHERE id = $1 FOR UPDATE",
        )
        .bind(review_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(review_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if current.is_latest {
            let aggregate = ReviewAggregate::new(subject.reviews_count, subject.star_average);

            // The author's next most recent review of this subject takes over.
            let successor = sqlx::query_as::<_, LatestReview>(
                "SELECT id, stars FROM reviews \
                 WHERE subject_id = $1 AND author_id = $2 \
                 ORDER BY created_at DESC, id DESC LIMIT 1",
            )
            .bind(subject_id)
            .bind(current.author_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            let next = match &successor {
                Some(successor) => {
                    sqlx::query(
                        "UPDATE reviews SET is_latest = TRUE, updated_at = $2 WHERE id = $1",
                    )
                    .bind(successor.id)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;
                    aggregate
                        .replace(current.stars, successor.stars)
                        .map_err(map_domain_error)?
                }
                None => aggregate.detach(current.stars).map_err(map_domain_error)?,
            };

            store_aggregate(&mut tx, subject_id, next, now).await?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn add_sub_review(
        &self,
        params: AddSubReviewParams,
    ) -> Result<SubReviewRecord, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        let now = OffsetDateTime::now_utc();

        // Lock the parent review to serialize position assignment.
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM reviews WHERE id = $1 FOR UPDATE")
            .bind(params.review_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sub_reviews WHERE review_id = $1",
        )
        .bind(params.review_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let position =
            insertion_position(params.position, existing as usize).map_err(map_domain_error)?;

        sqlx::query(
            "UPDATE sub_reviews SET position = position + 1, updated_at = $3 \
             WHERE review_id = $1 AND position >= $2",
        )
        .bind(params.review_id)
        .bind(position)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let row = sqlx::query_as::<_, SubReviewRow>(
            "INSERT INTO sub_reviews \
                 (id, review_id, position, topic, body, stars, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7) \
             RETURNING id, review_id, position, topic, body, stars, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(params.review_id)
        .bind(position)
        .bind(params.topic)
        .bind(params.body)
        .bind(params.stars)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(SubReviewRecord::from(row))
    }

    async fn update_sub_review(
        &self,
        params: UpdateSubReviewParams,
    ) -> Result<SubReviewRecord, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        let now = OffsetDateTime::now_utc();

        let current = sqlx::query_as::<_, SubReviewRow>(
            "SELECT id, review_id, position, topic, body, stars, created_at, updated_at \
             FROM sub_reviews WHERE id = $1 FOR UPDATE",
        )
        .bind(params.sub_review_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        let topic = params.topic.unwrap_or_else(|| current.topic.clone());
        let body = params.body.unwrap_or_else(|| current.body.clone());
        let stars = params.stars.unwrap_or(current.stars);

        let row = sqlx::query_as::<_, SubReviewRow>(
            "UPDATE sub_reviews SET topic = $2, body = $3, stars = $4, updated_at = $5 \
             WHERE id = $1 \
             RETURNING id, review_id, position, topic, body, stars, created_at, updated_at",
        )
        .bind(params.sub_review_id)
        .bind(topic)
        .bind(body)
        .bind(stars)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(SubReviewRecord::from(row))
    }

    async fn remove_sub_review(&self, sub_review_id: Uuid) -> Result<(), RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        let now = OffsetDateTime::now_utc();

        let review_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT review_id FROM sub_reviews WHERE id = $1",
        )
        .bind(sub_review_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        sqlx::query_scalar::<_, Uuid>("SELECT id FROM reviews WHERE id = $1 FOR UPDATE")
            .bind(review_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        let position = sqlx::query_scalar::<_, i32>(
            "SELECT position FROM sub_reviews WHERE id = $1 FOR UPDATE",
        )
        .bind(sub_review_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        sqlx::query("DELETE FROM sub_reviews WHERE id = $1")
            .bind(sub_review_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        // Close the gap the deleted entry leaves behind.
        sqlx::query(
            "UPDATE sub_reviews SET position = position - 1, updated_at = $3 \
             WHERE review_id = $1 AND position > $2",
        )
        .bind(review_id)
        .bind(position)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn reorder_sub_reviews(
        &self,
        review_id: Uuid,
        order: &[Uuid],
    ) -> Result<Vec<SubReviewRecord>, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        let now = OffsetDateTime::now_utc();

        sqlx::query_scalar::<_, Uuid>("SELECT id FROM reviews WHERE id = $1 FOR UPDATE")
            .bind(review_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        let current = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM sub_reviews WHERE review_id = $1 ORDER BY position ASC",
        )
        .bind(review_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        validate_reorder(&current, order).map_err(map_domain_error)?;

        sqlx::query(
            "UPDATE sub_reviews AS s \
                SET position = u.ord::int, updated_at = $3 \
               FROM UNNEST($2::uuid[]) WITH ORDINALITY AS u(id, ord) \
              WHERE s.id = u.id AND s.review_id = $1",
        )
        .bind(review_id)
        .bind(order.to_vec())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let rows = sqlx::query_as::<_, SubReviewRow>(
            "SELECT id, review_id, position, topic, body, stars, created_at, updated_at \
             FROM sub_reviews WHERE review_id = $1 ORDER BY position ASC",
        )
        .bind(review_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SubReviewRecord::from).collect())
    }
}
