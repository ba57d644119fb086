//! # lanchat-store
//!
//! Bounded, persistent message log for the LAN chat server.
//!
//! The log lives in memory behind a single async mutex and mirrors itself to
//! one JSON file on every mutation.  Retention is FIFO: once the cap is
//! reached, each append evicts the oldest message.  Reads never touch disk.

pub mod models;
pub mod store;

mod error;

pub use error::StoreError;
pub use models::{Attachment, Message};
pub use store::MessageStore;
