//! The message store: a bounded in-memory log with a durable JSON mirror.
//!
//! One exclusive lock guards the whole append-evict-persist sequence as well
//! as snapshot copies, so concurrent request handlers always observe a
//! consistent log.  The mirror is rewritten wholesale on every mutation;
//! write cost is bounded by the retention cap, which is small.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::Message;

/// Default retention cap, matching the stock client's display window.
pub const DEFAULT_MAX_MESSAGES: usize = 100;

/// Owns the ordered log of chat messages and its on-disk mirror.  The only
/// legal access path to message state.
pub struct MessageStore {
    log: Mutex<Vec<Message>>,
    path: PathBuf,
    max_messages: usize,
}

impl MessageStore {
    /// Open the store, restoring the log from `path` if a readable mirror
    /// exists there.
    ///
    /// A missing or unparseable mirror is never fatal: the store starts
    /// empty and logs a warning.  Only failure to create the parent
    /// directory is reported as an error.
    pub async fn open(path: impl Into<PathBuf>, max_messages: usize) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let log = Self::load(&path).await;
        info!(
            path = %path.display(),
            restored = log.len(),
            cap = max_messages,
            "message store opened"
        );

        Ok(Self {
            log: Mutex::new(log),
            path,
            max_messages,
        })
    }

    async fn load(path: &Path) -> Vec<Message> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read message log, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "message log unparseable, starting empty");
                Vec::new()
            }
        }
    }

    /// Append a message to the tail of the log, evicting from the head while
    /// the cap is exceeded, then rewrite the mirror.
    ///
    /// The whole sequence runs inside one critical section, so snapshots are
    /// never torn and messages appear in lock-acquisition order.  A failed
    /// mirror write is logged and swallowed: the in-memory log keeps the
    /// message, trading durability for availability.
    pub async fn append(&self, message: Message) {
        let mut log = self.log.lock().await;
        log.push(message);

        // A single append can only overshoot by one, but the loop tolerates
        // future batch appends.
        while log.len() > self.max_messages {
            log.remove(0);
        }

        if let Err(e) = self.persist(&log).await {
            warn!(
                path = %self.path.display(),
                error = %e,
                "failed to persist message log, keeping in-memory state"
            );
        }
    }

    /// Return a consistent copy of the current log, oldest first.  Never
    /// touches disk.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.log.lock().await.clone()
    }

    /// Current number of retained messages.
    pub async fn len(&self) -> usize {
        self.log.lock().await.len()
    }

    async fn persist(&self, log: &[Message]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(log)?;
        fs::write(&self.path, bytes).await?;
        debug!(count = log.len(), "persisted message log");
        Ok(())
    }
}
