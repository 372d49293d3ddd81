//! # Chat Relay
//!
//! Thin entry point that delegates to lib-web for server setup.
//!
//! `BIND_ADDRESS` picks the listener, `ALLOWED_ORIGINS` (comma separated) the CORS
//! origins; everything else is read by `lib_core::Config`.

use lib_utils::get_env;
use lib_web::{start_server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let mut config = ServerConfig::default();

    if let Ok(bind_address) = get_env("BIND_ADDRESS") {
        config.bind_address = bind_address;
    }

    if let Ok(origins) = get_env("ALLOWED_ORIGINS") {
        config.allowed_origins = origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
    }

    start_server(config).await
}
