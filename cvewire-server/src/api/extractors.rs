//! Custom Axum extractors for request authentication.
//!
//! Provides:
//! - `AuthenticatedIdentity`: verifies the identity token presented on the
//!   WebSocket upgrade (`Authorization: Bearer` or `?token=`).
//! - `IngestKey`: checks the `Cvewire-Ingest-Key` header against the
//!   hashed ingest secret (used by `/internal/*`).
//!
//! Both reject before any upgrade or handler work happens.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use cvewire_core::auth::AuthError;
use cvewire_sdk::objects::Identity;
use cvewire_sdk::signature::{INGEST_KEY_HEADER, TOKEN_QUERY_PARAM};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// AuthenticatedIdentity: WebSocket upgrade authentication
// ---------------------------------------------------------------------------

/// The identity behind a verified token.
///
/// The bearer header wins over the query parameter when both are present.
pub struct AuthenticatedIdentity(pub Identity);

/// Returned when the upgrade request carries no valid identity token.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct AuthRejected(#[from] AuthError);

impl IntoResponse for AuthRejected {
    fn into_response(self) -> Response {
        let message = match self.0 {
            AuthError::MissingToken => "missing identity token",
            AuthError::InvalidToken(_) => "invalid identity token",
        };
        (StatusCode::UNAUTHORIZED, message).into_response()
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim().to_owned())
}

fn query_token(parts: &Parts) -> Option<String> {
    let query = parts.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == TOKEN_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
}

impl FromRequestParts<AppState> for AuthenticatedIdentity {
    type Rejection = AuthRejected;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| query_token(parts))
            .ok_or(AuthError::MissingToken)?;

        match state.authenticator.authenticate(&token).await {
            Ok(identity) => Ok(AuthenticatedIdentity(identity)),
            Err(e) => {
                tracing::info!(error = %e, "WebSocket upgrade rejected");
                Err(e.into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// IngestKey: ingestion pipeline authentication
// ---------------------------------------------------------------------------

/// Marker extractor proving the request carried the ingest secret.
pub struct IngestKey;

/// Errors returned by the [`IngestKey`] extractor.
#[derive(Debug)]
pub enum IngestKeyError {
    MissingHeader,
    InvalidHeader,
    Mismatch,
    Internal,
}

impl IntoResponse for IngestKeyError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            IngestKeyError::MissingHeader => {
                (StatusCode::UNAUTHORIZED, "missing Cvewire-Ingest-Key header")
            }
            IngestKeyError::InvalidHeader => {
                (StatusCode::BAD_REQUEST, "invalid Cvewire-Ingest-Key header")
            }
            IngestKeyError::Mismatch => (StatusCode::UNAUTHORIZED, "invalid ingest key"),
            IngestKeyError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        };
        (status, message).into_response()
    }
}

impl FromRequestParts<AppState> for IngestKey {
    type Rejection = IngestKeyError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(INGEST_KEY_HEADER)
            .ok_or(IngestKeyError::MissingHeader)?
            .to_str()
            .map_err(|_| IngestKeyError::InvalidHeader)?
            .to_owned();

        let ingest = state.config.ingest.read().await.clone();
        // Argon2 verification is CPU-bound.
        let verified = tokio::task::spawn_blocking(move || ingest.verify_secret(&key))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Ingest key verification task failed");
                IngestKeyError::Internal
            })?;

        if verified {
            Ok(IngestKey)
        } else {
            tracing::warn!("Ingest request rejected: key mismatch");
            Err(IngestKeyError::Mismatch)
        }
    }
}
