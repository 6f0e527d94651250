//! Caller identity, passed explicitly into every lifecycle operation.

use crate::errors::{Denied, LifecycleError};
use crate::types::UserId;

pub trait Identity: Send + Sync {
    /// The authenticated user, or `None` for anonymous callers.
    fn current_user(&self) -> Option<UserId>;

    fn require_user(&self) -> Result<UserId, LifecycleError> {
        self.current_user()
            .ok_or(LifecycleError::Authorization(Denied::Unauthenticated))
    }
}

/// A per-request session value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    user: Option<UserId>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn user(user: UserId) -> Self {
        Self { user: Some(user) }
    }
}

impl Identity for Session {
    fn current_user(&self) -> Option<UserId> {
        self.user
    }
}
