use std::fmt;

use uuid::Uuid;

use crate::application::error::AppError;

/// Caller identity attached to every service invocation.
///
/// The crate does not run a login flow; embedding code resolves its own
/// sessions and hands the result in here. Reads accept any actor, writes
/// call [`Actor::require_user`] first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Anonymous,
    User(Uuid),
}

impl Actor {
    pub fn require_user(&self) -> Result<Uuid, AppError> {
        match self {
            Actor::User(id) => Ok(*id),
            Actor::Anonymous => Err(AppError::AuthenticationRequired),
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Actor::User(id) => Some(*id),
            Actor::Anonymous => None,
        }
    }

    /// Audit-log label for this caller.
    pub fn label(&self) -> String {
        match self {
            Actor::User(id) => format!("user:{id}"),
            Actor::Anonymous => "anonymous".to_string(),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
