//! Lifecycle and store error types.

use std::fmt;

use thiserror::Error;

/// Why an authorization check refused the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
    /// No authenticated user.
    Unauthenticated,
    /// Caller does not own the donation.
    NotOwner,
    /// Caller is neither the claimant nor the donation owner.
    NotParty,
    /// Owners cannot claim their own donation.
    SelfClaim,
}

impl fmt::Display for Denied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Denied::Unauthenticated => "you must be logged in",
            Denied::NotOwner => "only the donation owner may do this",
            Denied::NotParty => "only the claimant or the donation owner may do this",
            Denied::SelfClaim => "you cannot claim your own donation",
        })
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not authorized: {0}")]
    Authorization(Denied),

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("store error: {0}")]
    Store(String),
}

/// Failures reported by a [`crate::store::Store`] backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// A conditional write found a different current state.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => LifecycleError::NotFound(what),
            StoreError::Precondition(what) => LifecycleError::Conflict(what),
            other => LifecycleError::Store(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
