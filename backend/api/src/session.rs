//! Per-request session extraction.
//!
//! Authentication itself happens upstream; the auth proxy forwards the
//! verified user id in the `x-user-id` header. No header means an
//! anonymous caller.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use foodshare_core::{Session, UserId};

use crate::errors::ApiError;

pub const USER_HEADER: &str = "x-user-id";

/// Extractor wrapping the caller's [`Session`].
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Session);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(USER_HEADER) else {
            return Ok(Caller(Session::anonymous()));
        };
        let user: UserId = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| ApiError::BadRequest(format!("malformed {USER_HEADER} header")))?;
        Ok(Caller(Session::user(user)))
    }
}
