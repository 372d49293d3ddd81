//! # Database Store
//!
//! Database connection pool, embedded migrations, and the chat repository.

// region: --- Modules
pub mod chat_repository;
pub mod chat_store;
pub mod models;
// endregion: --- Modules

// region: --- Re-exports
pub use chat_repository::ChatRepository;
pub use chat_store::{ChatStore, SqliteChatStore};
pub use models::{Chat, ChatForCreate, ChatMessage};
// endregion: --- Re-exports

// region: --- Types and Functions
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Type alias for SQLite connection pool.
pub type DbPool = SqlitePool;

/// Create a new SQLite connection pool for `database_url`.
///
/// In-memory databases are private to one connection, so they get a pool of one.
pub async fn create_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let max_connections = if database_url.contains(":memory:") { 1 } else { 8 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Apply the embedded schema migrations.
pub async fn migrate(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
// endregion: --- Types and Functions
