//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::domain::catalog::SubjectKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectRecord {
    pub id: Uuid,
    pub kind: SubjectKind,
    pub title: String,
    /// Display credit: the artist, host, designer or organiser behind the
    /// subject. Free text, never a foreign key.
    pub creator: Option<String>,
    pub released_on: Option<Date>,
    pub reviews_count: i64,
    pub star_average: f64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRecord {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub subject_kind: SubjectKind,
    pub author_id: Uuid,
    pub stars: f64,
    pub title: String,
    pub body: String,
    /// Exactly one review per (author, subject) carries this flag; only
    /// flagged rows count toward the subject aggregates.
    pub is_latest: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubReviewRecord {
    pub id: Uuid,
    pub review_id: Uuid,
    /// 1-based, contiguous within the parent review.
    pub position: i32,
    pub topic: String,
    pub body: String,
    pub stars: f64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLogRecord {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub payload_text: Option<String>,
    pub created_at: OffsetDateTime,
}
