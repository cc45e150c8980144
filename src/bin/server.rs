//! Math Museums Sync Server
//!
//! Stores one versioned record per (user, concept-type) and reconciles
//! batches of client edits against them.
//!
//! # Configuration
//!
//! Environment variables:
//! - `MATHMUSEUMS_PORT`: Port to listen on (default: 8080)
//! - `MATHMUSEUMS_DB`: Path to the SQLite database
//!   (default: ~/.local/share/mathmuseums-server/sync.db)
//! - `MATHMUSEUMS_CONFIG`: Path to config file
//!   (default: ~/.config/mathmuseums-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mathmuseums_sync::db;
use mathmuseums_sync::server::{app, ApiKeyStore, AppState};

/// Server configuration, from environment variables.
#[derive(Debug, Clone)]
struct Config {
    port: u16,
    db_path: PathBuf,
    config_path: PathBuf,
}

impl Config {
    fn from_env() -> Self {
        let port = std::env::var("MATHMUSEUMS_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let db_path = std::env::var("MATHMUSEUMS_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("mathmuseums-server")
                    .join("sync.db")
            });

        let config_path = std::env::var("MATHMUSEUMS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("mathmuseums-server")
                    .join("config.yaml")
            });

        Self {
            port,
            db_path,
            config_path,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mathmuseums_sync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    tracing::info!("Database: {}", config.db_path.display());
    tracing::info!("Config file: {}", config.config_path.display());

    let pool = match db::init_db(config.db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let api_keys = Arc::new(ApiKeyStore::load(&config.config_path));

    let state = AppState { pool, api_keys };
    let router = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, router).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
