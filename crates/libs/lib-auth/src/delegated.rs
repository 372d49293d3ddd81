//! # Delegated Task Tokens
//!
//! Each enqueued task carries a token scoped to exactly one
//! `{userId, chatId, sessionId, taskId}` tuple with a few minutes of validity.
//! The worker presents it to the AI responder as a bearer credential, so the
//! responder can act on the user's behalf without ever seeing the user's own
//! access token.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::token::{decode_claims, encode_claims, TokenError};

/// What a delegated token is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskScope {
    pub user_id: String,
    pub chat_id: String,
    pub session_id: String,
    pub task_id: String,
}

/// Claims of a delegated token, camelCase to match what the responder reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedClaims {
    pub user_id: String,
    pub chat_id: String,
    pub session_id: String,
    pub task_id: String,
    pub exp: i64,
    pub iat: i64,
}

impl DelegatedClaims {
    pub fn scope(&self) -> TaskScope {
        TaskScope {
            user_id: self.user_id.clone(),
            chat_id: self.chat_id.clone(),
            session_id: self.session_id.clone(),
            task_id: self.task_id.clone(),
        }
    }
}

/// Signs delegated tokens with the responder-shared secret.
#[derive(Clone)]
pub struct DelegatedTokenMinter {
    secret: String,
    ttl: Duration,
}

impl DelegatedTokenMinter {
    pub fn new(secret: impl Into<String>, ttl: Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token for `scope`, expiring `ttl` from now.
    pub fn mint(&self, scope: &TaskScope) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = DelegatedClaims {
            user_id: scope.user_id.clone(),
            chat_id: scope.chat_id.clone(),
            session_id: scope.session_id.clone(),
            task_id: scope.task_id.clone(),
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode_claims(&claims, &self.secret)
    }
}

impl std::fmt::Debug for DelegatedTokenMinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatedTokenMinter")
            .field("secret", &"***")
            .field("ttl_secs", &self.ttl.num_seconds())
            .finish()
    }
}

/// Decode and validate a delegated token.
pub fn decode_delegated_token(token: &str, secret: &str) -> Result<DelegatedClaims, TokenError> {
    decode_claims(token, secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "delegated-secret-key-at-least-32-chars!!";

    fn scope() -> TaskScope {
        TaskScope {
            user_id: "u1".to_string(),
            chat_id: "c1".to_string(),
            session_id: "s1".to_string(),
            task_id: "t1".to_string(),
        }
    }

    #[test]
    fn test_minted_token_carries_scope() {
        let minter = DelegatedTokenMinter::new(SECRET, Duration::minutes(5));
        let token = minter.mint(&scope()).unwrap();

        let claims = decode_delegated_token(&token, SECRET).unwrap();
        assert_eq!(claims.scope(), scope());
        assert_eq!(claims.exp - claims.iat, 300);
    }

    #[test]
    fn test_expired_delegated_token() {
        let minter = DelegatedTokenMinter::new(SECRET, Duration::minutes(-10));
        let token = minter.mint(&scope()).unwrap();

        assert_eq!(decode_delegated_token(&token, SECRET).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn test_debug_hides_secret() {
        let minter = DelegatedTokenMinter::new(SECRET, Duration::minutes(5));
        assert!(!format!("{minter:?}").contains(SECRET));
    }
}
