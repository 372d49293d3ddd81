//! # Token Verification
//!
//! The gateway asks a [`TokenVerifier`] once per handshake. The result mirrors the
//! login service's contract: an identity when the token is good, plus an `expired`
//! flag so expired and forged tokens can be told apart in logs.

use async_trait::async_trait;
use tracing::debug;

use crate::token::{decode_access_token, TokenError};

/// Authenticated user bound to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: String,
}

/// Outcome of verifying one access token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Verification {
    pub identity: Option<UserIdentity>,
    pub expired: bool,
}

impl Verification {
    pub fn valid(user_id: impl Into<String>) -> Self {
        Self {
            identity: Some(UserIdentity {
                user_id: user_id.into(),
            }),
            expired: false,
        }
    }

    pub fn expired() -> Self {
        Self {
            identity: None,
            expired: true,
        }
    }

    pub fn invalid() -> Self {
        Self::default()
    }

    /// Identity if the token is usable.
    pub fn accepted(self) -> Option<UserIdentity> {
        if self.expired {
            None
        } else {
            self.identity
        }
    }
}

/// Token-verification collaborator.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Verification;
}

/// Verifies HS256 access tokens signed with a shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    secret: String,
}

impl JwtVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Verification {
        match decode_access_token(token, &self.secret) {
            Ok(claims) => Verification::valid(claims.sub),
            Err(TokenError::Expired) => Verification::expired(),
            Err(e) => {
                debug!("[AUTH] Access token rejected: {}", e);
                Verification::invalid()
            }
        }
    }
}
