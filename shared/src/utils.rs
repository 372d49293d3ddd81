//! # Shared Utility Functions
//!
//! ## Chat Naming
//!
//! A chat started without an explicit id is named after its first message:
//!
//! ```rust
//! use shared::utils::derive_chat_name;
//!
//! assert_eq!(derive_chat_name("hello"), "hello");
//! assert_eq!(derive_chat_name(""), "Новый чат");
//! ```

/// Maximum number of characters of the first message used as a chat name.
pub const CHAT_NAME_MAX_CHARS: usize = 50;

/// Name given to a chat whose first message yields no usable name.
pub const DEFAULT_CHAT_NAME: &str = "Новый чат";

/// Derive a chat name from the first `CHAT_NAME_MAX_CHARS` characters of `text`.
///
/// Counts characters, not bytes, so multi-byte text is never split mid code point.
pub fn derive_chat_name(text: &str) -> String {
    let name: String = text.chars().take(CHAT_NAME_MAX_CHARS).collect();
    if name.is_empty() {
        DEFAULT_CHAT_NAME.to_string()
    } else {
        name
    }
}
