use crate::application::repos::RepoError;
use crate::domain::error::DomainError;

/// Domain rule failures surfacing inside a repository transaction.
pub(super) fn map_domain_error(err: DomainError) -> RepoError {
    match err {
        DomainError::Validation { message } => RepoError::InvalidInput { message },
        DomainError::NotFound { .. } => RepoError::NotFound,
        DomainError::Invariant { message } => RepoError::Integrity { message },
    }
}

/// Translate driver errors into the repository taxonomy.
///
/// Check-constraint breaks map to `InvalidInput` because the schema uses
/// them to guard caller-supplied values (star bounds, position ranges);
/// anything else the database refuses is an integrity problem on our side.
pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) if db.message().contains("duplicate key") => {
            RepoError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db.message().contains("violates check constraint")
                || db.message().contains("invalid input syntax") =>
        {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db) if db.message().contains("violates") => RepoError::Integrity {
            message: db.message().to_string(),
        },
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        other => RepoError::from_persistence(other),
    }
}
