//! Rendezvous relay server -- two-party signaling rendezvous point.
//!
//! An axum WebSocket server that pairs participants sharing a secret and
//! password into a room, then relays their offer / answer / candidate /
//! leave messages to each other without inspecting payloads.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9000
//! cargo run --bin rendezvous-relay
//!
//! # Run on custom address with a fixed token secret
//! cargo run --bin rendezvous-relay -- --bind 127.0.0.1:8080 --app-secret s3cret
//!
//! # Or via environment variables
//! RENDEZVOUS_ADDR=127.0.0.1:8080 RENDEZVOUS_LOG=debug cargo run --bin rendezvous-relay
//! ```

use std::sync::Arc;

use clap::Parser;
use rendezvous_relay::config::{RelayCliArgs, RelayConfig};
use rendezvous_relay::relay;

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        max_room_members = config.max_room_members,
        fixed_secret = config.app_secret.is_some(),
        "starting rendezvous relay server"
    );

    let state = Arc::new(config.build_state());

    match relay::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}
