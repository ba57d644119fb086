//! # lanchat-server
//!
//! HTTP server for a small trusted-LAN chat room.
//!
//! This binary provides:
//! - **Message log** with bounded retention, mirrored to a JSON file on
//!   every append (via the `lanchat-store` crate)
//! - **REST surface** (axum) for posting messages and polling the log
//! - **Attachment storage** for uploaded images and files, served back with
//!   guessed content types
//! - **Static assets** for the browser chat page

mod api;
mod attachments;
mod config;
mod error;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use lanchat_store::MessageStore;

use crate::api::AppState;
use crate::attachments::AttachmentStore;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lanchat_server=debug")),
        )
        .init();

    info!("Starting lanchat server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Message store (restores the log from disk when a mirror exists)
    let store = Arc::new(MessageStore::open(&config.storage_path, config.max_messages).await?);
    info!(restored = store.len().await, "Message store ready");

    // Attachment store (creates directories if missing)
    let attachments = Arc::new(
        AttachmentStore::new(config.images_dir.clone(), config.files_dir.clone()).await?,
    );

    let http_addr = config.http_addr;
    let state = AppState {
        store,
        attachments,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
