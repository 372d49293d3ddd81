//! Handshake authentication.
//!
//! Browsers cannot set headers on a WebSocket upgrade, so the access token is
//! usually passed as `?token=...`. An `Authorization: Bearer` header is accepted
//! as well. Every rejection is a 401 before the upgrade.

use axum::extract::Query;
use axum::http::{header, HeaderMap, Uri};
use lib_auth::{TokenVerifier, UserIdentity};
use lib_core::{AppError, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct HandshakeParams {
    token: Option<String>,
}

/// Access token from the query string, else from the bearer header.
pub fn extract_token(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    let from_query = Query::<HandshakeParams>::try_from_uri(uri)
        .ok()
        .and_then(|Query(params)| params.token)
        .filter(|token| !token.is_empty());

    from_query.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    })
}

/// Verify the handshake token and resolve the user behind it.
pub async fn authenticate(verifier: &dyn TokenVerifier, token: Option<&str>) -> Result<UserIdentity> {
    let Some(token) = token else {
        return Err(AppError::Unauthorized("Authentication required".to_string()));
    };

    let verification = verifier.verify(token).await;
    if verification.expired {
        return Err(AppError::Unauthorized("Token expired".to_string()));
    }

    verification
        .accepted()
        .ok_or_else(|| AppError::Unauthorized("Invalid token".to_string()))
}
