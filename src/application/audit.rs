use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::application::repos::{AuditRepo, RepoError};
use crate::domain::entities::AuditLogRecord;

/// Thin wrapper around the audit repository for recording catalogue and
/// review actions.
///
/// Recording is best effort: by the time an entry is written the business
/// write has already committed, so a failing audit insert is logged and
/// swallowed rather than turned into a caller-visible error.
#[derive(Clone)]
pub struct AuditService {
    repo: Arc<dyn AuditRepo>,
}

impl AuditService {
    pub fn new(repo: Arc<dyn AuditRepo>) -> Self {
        Self { repo }
    }

    pub async fn record<S>(
        &self,
        actor: &str,
        action: &str,
        entity_type: &str,
        entity_id: Option<&str>,
        payload: Option<&S>,
    ) where
        S: Serialize,
    {
        let payload_text = match payload {
            Some(value) => match serde_json::to_string(value) {
                Ok(text) => Some(text),
                Err(err) => {
                    warn!(action, entity_type, error = %err, "audit payload serialization failed");
                    None
                }
            },
            None => None,
        };

        let record = AuditLogRecord {
            id: Uuid::new_v4(),
            actor: actor.to_string(),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(|value| value.to_string()),
            payload_text,
            created_at: OffsetDateTime::now_utc(),
        };

        if let Err(err) = self.repo.append_log(record).await {
            warn!(action, entity_type, error = %err, "audit append failed");
        }
    }

    pub async fn list_recent(&self, limit: u32) -> Result<Vec<AuditLogRecord>, RepoError> {
        self.repo.list_recent(limit).await
    }
}
