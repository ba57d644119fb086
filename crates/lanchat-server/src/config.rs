//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration on a LAN host.

use std::net::SocketAddr;
use std::path::PathBuf;

use lanchat_store::store::DEFAULT_MAX_MESSAGES;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP server.
    /// Env: `PORT` (bound on all interfaces)
    /// Default: `0.0.0.0:8000`
    pub http_addr: SocketAddr,

    /// Retention cap for the message log.
    /// Env: `MAX_MESSAGES`
    /// Default: `100`
    pub max_messages: usize,

    /// Path of the persisted message log (one JSON document).
    /// Env: `STORAGE_PATH`
    /// Default: `./chat_messages.json`
    pub storage_path: PathBuf,

    /// Directory holding uploaded images.
    /// Env: `IMAGES_DIR`
    /// Default: `./images`
    pub images_dir: PathBuf,

    /// Directory holding uploaded generic files.
    /// Env: `FILES_DIR`
    /// Default: `./files`
    pub files_dir: PathBuf,

    /// Directory holding the chat page and its scripts/styles.
    /// Env: `STATIC_DIR`
    /// Default: `./static`
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8000).into(),
            max_messages: DEFAULT_MAX_MESSAGES,
            storage_path: PathBuf::from("./chat_messages.json"),
            images_dir: PathBuf::from("./images"),
            files_dir: PathBuf::from("./files"),
            static_dir: PathBuf::from("./static"),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                config.http_addr = ([0, 0, 0, 0], parsed).into();
            } else {
                tracing::warn!(value = %port, "Invalid PORT, using default");
            }
        }

        if let Ok(cap) = std::env::var("MAX_MESSAGES") {
            match cap.parse::<usize>() {
                Ok(n) if n > 0 => config.max_messages = n,
                _ => tracing::warn!(value = %cap, "Invalid MAX_MESSAGES, using default"),
            }
        }

        if let Ok(path) = std::env::var("STORAGE_PATH") {
            config.storage_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("IMAGES_DIR") {
            config.images_dir = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("FILES_DIR") {
            config.files_dir = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("STATIC_DIR") {
            config.static_dir = PathBuf::from(path);
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8000).into());
        assert_eq!(config.max_messages, 100);
        assert_eq!(config.storage_path, PathBuf::from("./chat_messages.json"));
    }
}
