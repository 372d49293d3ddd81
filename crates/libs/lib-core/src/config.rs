//! # Application Configuration
//!
//! This module manages application configuration loaded from environment variables.
//! All configuration is validated on startup to fail fast if misconfigured.
//!
//! The loaded [`Config`] is handed to the server, gateway and worker explicitly at
//! startup; nothing reads the environment after that.
//!
//! ```rust,no_run
//! use lib_core::Config;
//!
//! let config = Config::from_env().expect("configuration");
//! config.validate().expect("valid configuration");
//! ```

use std::str::FromStr;
use std::time::Duration;

use lib_utils::envs::{self, get_env, get_env_or, get_env_parse_or};
use lib_utils::validation::validate_min_length;

const MIN_SECRET_LEN: usize = 32;

/// Which transport backs the task queue and the result channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueBackend {
    /// Durable log in the application's SQLite database, in-process result channel.
    Sqlite,
    /// Redis Streams + Pub/Sub (requires the `redis` feature).
    Redis,
}

impl FromStr for QueueBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(QueueBackend::Sqlite),
            "redis" => Ok(QueueBackend::Redis),
            _ => Err(format!("Invalid queue backend: {}", s)),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug)]
pub struct Config {
    /// SQLite database connection URL (chats, messages, durable queue)
    pub database_url: String,

    /// Secret verifying client access tokens on the WebSocket handshake
    ///
    /// **Must be at least 32 characters long** for security.
    pub access_token_secret: String,

    /// Secret signing delegated per-task tokens, shared with the AI responder
    pub delegated_token_secret: String,

    /// Delegated token validity in seconds (30..=3600)
    pub delegated_token_ttl_secs: i64,

    /// AI responder webhook URL
    pub responder_url: String,

    /// Upper bound on one responder call, enforced by the worker
    pub responder_timeout_secs: u64,

    pub queue_backend: QueueBackend,
    pub redis_url: String,

    /// Name of the task log
    pub queue_stream: String,

    /// Consumer group the worker joins
    pub consumer_group: String,

    /// Longest a claim blocks waiting for a new entry
    pub claim_block_ms: u64,

    /// Pause after a queue infrastructure fault
    pub worker_backoff_ms: u64,

    /// Claimed-but-unacknowledged entries idle this long are redelivered
    pub reclaim_idle_secs: u64,

    /// Name of the result channel
    pub result_channel: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        let queue_backend = get_env_or("QUEUE_BACKEND", "sqlite").parse::<QueueBackend>()?;

        Ok(Self {
            database_url: get_env_or("DATABASE_URL", "sqlite:data/relay.db"),
            access_token_secret: get_env("ACCESS_TOKEN_SECRET").map_err(env_err)?,
            delegated_token_secret: get_env("JWT_SECRET").map_err(env_err)?,
            delegated_token_ttl_secs: get_env_parse_or("DELEGATED_TOKEN_TTL_SECS", 300).map_err(env_err)?,
            responder_url: get_env_or("RESPONDER_URL", "http://localhost:5678/webhook/ai-chat"),
            responder_timeout_secs: get_env_parse_or("RESPONDER_TIMEOUT_SECS", 60).map_err(env_err)?,
            queue_backend,
            redis_url: get_env_or("REDIS_URL", "redis://127.0.0.1:6379/1"),
            queue_stream: get_env_or("QUEUE_STREAM", "message:stream"),
            consumer_group: get_env_or("CONSUMER_GROUP", "message_workers"),
            claim_block_ms: get_env_parse_or("CLAIM_BLOCK_MS", 5000).map_err(env_err)?,
            worker_backoff_ms: get_env_parse_or("WORKER_BACKOFF_MS", 5000).map_err(env_err)?,
            reclaim_idle_secs: get_env_parse_or("RECLAIM_IDLE_SECS", 300).map_err(env_err)?,
            result_channel: get_env_or("RESULT_CHANNEL", "message:processed"),
        })
    }

    /// Validate configuration values against security and operational rules.
    pub fn validate(&self) -> Result<(), String> {
        validate_min_length(&self.access_token_secret, MIN_SECRET_LEN, "ACCESS_TOKEN_SECRET")?;
        validate_min_length(&self.delegated_token_secret, MIN_SECRET_LEN, "JWT_SECRET")?;

        if !(30..=3600).contains(&self.delegated_token_ttl_secs) {
            return Err("DELEGATED_TOKEN_TTL_SECS must be between 30 and 3600".to_string());
        }

        if self.responder_timeout_secs == 0 || self.claim_block_ms == 0 || self.worker_backoff_ms == 0 {
            return Err("RESPONDER_TIMEOUT_SECS, CLAIM_BLOCK_MS and WORKER_BACKOFF_MS must be positive".to_string());
        }

        if self.reclaim_idle_secs <= self.responder_timeout_secs {
            return Err("RECLAIM_IDLE_SECS must exceed RESPONDER_TIMEOUT_SECS".to_string());
        }

        if self.queue_stream.is_empty() || self.consumer_group.is_empty() || self.result_channel.is_empty() {
            return Err("QUEUE_STREAM, CONSUMER_GROUP and RESULT_CHANNEL must not be empty".to_string());
        }

        Ok(())
    }

    pub fn delegated_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.delegated_token_ttl_secs)
    }

    pub fn responder_timeout(&self) -> Duration {
        Duration::from_secs(self.responder_timeout_secs)
    }

    pub fn claim_block(&self) -> Duration {
        Duration::from_millis(self.claim_block_ms)
    }

    pub fn worker_backoff(&self) -> Duration {
        Duration::from_millis(self.worker_backoff_ms)
    }

    pub fn reclaim_idle(&self) -> Duration {
        Duration::from_secs(self.reclaim_idle_secs)
    }
}

fn env_err(err: envs::Error) -> String {
    err.to_string()
}
