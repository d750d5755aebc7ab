//! Row structs shared by the Postgres repositories.

use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::domain::catalog::SubjectKind;
use crate::domain::entities::{ReviewRecord, SubReviewRecord, SubjectRecord};

#[derive(sqlx::FromRow)]
pub(super) struct SubjectRow {
    pub id: Uuid,
    pub kind: SubjectKind,
    pub title: String,
    pub creator: Option<String>,
    pub released_on: Option<Date>,
    pub reviews_count: i64,
    pub star_average: f64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<SubjectRow> for SubjectRecord {
    fn from(row: SubjectRow) -> Self {
        Self {
            id: row.id,
            kind: row.kind,
            title: row.title,
            creator: row.creator,
            released_on: row.released_on,
            reviews_count: row.reviews_count,
            star_average: row.star_average,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct ReviewRow {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub subject_kind: SubjectKind,
    pub author_id: Uuid,
    pub stars: f64,
    pub title: String,
    pub body: String,
    pub is_latest: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<ReviewRow> for ReviewRecord {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: row.id,
            subject_id: row.subject_id,
            subject_kind: row.subject_kind,
            author_id: row.author_id,
            stars: row.stars,
            title: row.title,
            body: row.body,
            is_latest: row.is_latest,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct SubReviewRow {
    pub id: Uuid,
    pub review_id: Uuid,
    pub position: i32,
    pub topic: String,
    pub body: String,
    pub stars: f64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<SubReviewRow> for SubReviewRecord {
    fn from(row: SubReviewRow) -> Self {
        Self {
            id: row.id,
            review_id: row.review_id,
            position: row.position,
            topic: row.topic,
            body: row.body,
            stars: row.stars,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
