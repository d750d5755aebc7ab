use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

/// Failure taxonomy shared by every application service.
///
/// Callers embedding the crate match on this enum to decide how to
/// surface a failure; the variants deliberately distinguish "who are
/// you" ([`AppError::AuthenticationRequired`]) from "you may not"
/// ([`AppError::PermissionDenied`]).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(RepoError),
    #[error(transparent)]
    Infra(#[from] InfraError),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// True when the failure is the caller's fault rather than ours.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            AppError::AuthenticationRequired
                | AppError::PermissionDenied { .. }
                | AppError::NotFound
                | AppError::Validation(_)
                | AppError::Domain(DomainError::Validation { .. })
                | AppError::Domain(DomainError::NotFound { .. })
        )
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => AppError::NotFound,
            RepoError::InvalidInput { message } => AppError::Validation(message),
            other => AppError::Repo(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_not_found_becomes_app_not_found() {
        let err = AppError::from(RepoError::NotFound);
        assert!(matches!(err, AppError::NotFound));
    }

    #[test]
    fn repo_invalid_input_becomes_validation() {
        let err = AppError::from(RepoError::InvalidInput {
            message: "stars out of range".into(),
        });
        match err {
            AppError::Validation(message) => assert_eq!(message, "stars out of range"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn persistence_errors_stay_wrapped() {
        let err = AppError::from(RepoError::from_persistence("connection reset"));
        assert!(matches!(err, AppError::Repo(RepoError::Persistence(_))));
        assert!(!err.is_caller_error());
    }

    #[test]
    fn caller_errors_are_flagged() {
        assert!(AppError::AuthenticationRequired.is_caller_error());
        assert!(AppError::permission_denied("not the author").is_caller_error());
        assert!(AppError::NotFound.is_caller_error());
        assert!(AppError::validation("title required").is_caller_error());
    }
}
