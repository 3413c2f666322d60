//! Replica binary for the Beacon demos.
//!
//! Runs one replica of either the todo list or the sudoku board, depending
//! on `node.mode`. Start two with different labels and replica indices, then
//! reconcile them with `POST /sync` or by posting one node's `/export` to the
//! other's `/merge`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `beacon.yaml` (or `BEACON_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Build the peer HTTP client
//! 4. Seed the store for the configured mode
//! 5. Serve until `Ctrl-C`

mod config;
mod error;

use std::sync::Arc;
use std::time::Duration;

use beacon_core::{SudokuState, TodoState};
use beacon_server::{AppState, ServerConfig, build_sudoku_router, build_todo_router};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, LogFormat, Mode, NodeConfig, config_path};
use crate::error::NodeError;

#[tokio::main]
async fn main() -> Result<(), NodeError> {
    // 1. Load configuration. Logging depends on it, so it comes first.
    let path = config_path();
    let config = NodeConfig::load(&path)?;

    // 2. Initialize structured logging.
    init_tracing(&config)?;
    info!(
        config_path = %path.display(),
        mode = %config.node.mode,
        label = config.node.label,
        replica = config.node.replica,
        "beacon-node starting"
    );

    // 3. Peer client.
    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.sync.peer_timeout_ms))
        .build()?;

    // 4. Seed the store and build the router.
    let label = config.node.label.clone();
    let router = match config.node.mode {
        Mode::Todo => {
            let band = config.id_band().ok_or_else(|| ConfigError::Invalid {
                key: "node.replica",
                value: config.node.replica.to_string(),
            })?;
            info!(first_id = band.start(), last_id = band.end(), "todo replica seeded");
            build_todo_router(Arc::new(AppState::with_client(
                TodoState::in_band(band),
                label,
                http,
            )))
        }
        Mode::Sudoku => {
            info!("sudoku replica seeded with an empty board");
            build_sudoku_router(Arc::new(AppState::with_client(
                SudokuState::new(),
                label,
                http,
            )))
        }
    };

    // 5. Serve.
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    beacon_server::start_server(&server_config, router).await?;

    info!("beacon-node exiting");
    Ok(())
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(config: &NodeConfig) -> Result<(), NodeError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .map_err(|e| NodeError::Logging {
            message: format!("invalid log level {:?}: {e}", config.logging.level),
        })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match config.logging.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| NodeError::Logging {
        message: e.to_string(),
    })
}
