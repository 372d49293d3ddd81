//! # Authentication Library
//!
//! JWT handling for the relay:
//!
//! - **[`token`]**: user access tokens presented on the WebSocket handshake
//! - **[`delegated`]**: short-lived per-task tokens the worker presents to the responder
//! - **[`verifier`]**: the token-verification seam used by the gateway

pub mod delegated;
pub mod token;
pub mod verifier;

// Re-export commonly used types
pub use delegated::{decode_delegated_token, DelegatedClaims, DelegatedTokenMinter, TaskScope};
pub use token::{decode_access_token, encode_access_token, Claims, TokenError};
pub use verifier::{JwtVerifier, TokenVerifier, UserIdentity, Verification};
