//! Custom Axum extractors for request authentication.
//!
//! Authentication itself happens upstream (gateway or session layer);
//! this server only requires the authenticated identity to be forwarded
//! in the `X-Authenticated-User` header. The value is opaque: it is
//! attached to logs for attribution and never interpreted.

use axum::extract::FromRequestParts;
use axum::http::{StatusCode, request::Parts};
use axum::response::{IntoResponse, Response};
use bakong_core::recon::Principal;

use crate::state::AppState;

/// Header carrying the caller identity set by the upstream auth layer.
pub const PRINCIPAL_HEADER: &str = "x-authenticated-user";

/// Extracts the caller's [`Principal`] from [`PRINCIPAL_HEADER`].
pub struct AuthenticatedUser(pub Principal);

/// Errors returned by the [`AuthenticatedUser`] extractor.
#[derive(Debug)]
pub enum AuthError {
    /// The header is absent.
    MissingHeader,
    /// The header is present but empty or not valid UTF-8.
    InvalidHeader,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingHeader => "missing X-Authenticated-User header",
            AuthError::InvalidHeader => "invalid X-Authenticated-User header",
        };
        (StatusCode::UNAUTHORIZED, message).into_response()
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(PRINCIPAL_HEADER)
            .ok_or(AuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidHeader)?;

        if value.is_empty() {
            return Err(AuthError::InvalidHeader);
        }

        Ok(AuthenticatedUser(Principal(value.to_owned())))
    }
}
