//! Domain model structs for the chat log.
//!
//! Every struct derives `Serialize` and `Deserialize` with the exact wire
//! shape the browser client consumes, so the same types serve both the
//! `/messages` response and the persisted mirror.

use chrono::Local;
use serde::{Deserialize, Serialize};

/// A single chat message.  Immutable once appended; only the set of retained
/// messages ever changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Display name supplied by the client.  Not authenticated, not unique.
    pub username: String,
    /// Message text.  Serialized as `message`; may be empty when an
    /// attachment is present.
    #[serde(rename = "message")]
    pub body: String,
    /// Server-assigned wall-clock time, `HH:MM:SS` local time.  No date and
    /// no zone: the log never lives long enough for that to matter.
    pub timestamp: String,
    /// Optional attachment reference, flattened so the wire object stays
    /// `{username, message, timestamp, image? | file?/original_filename?/preview?}`.
    #[serde(flatten)]
    pub attachment: Option<Attachment>,
}

impl Message {
    /// Build a message stamped with the current wall-clock time.  The
    /// timestamp is always assigned here; client-supplied values are never
    /// trusted.
    pub fn new(
        username: impl Into<String>,
        body: impl Into<String>,
        attachment: Option<Attachment>,
    ) -> Self {
        Self {
            username: username.into(),
            body: body.into(),
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            attachment,
        }
    }
}

/// Reference to an uploaded blob stored outside the log.  The log only ever
/// holds the server-relative path, never the bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Attachment {
    /// Inline image, rendered directly by the client.
    Image {
        /// Server-relative path, e.g. `/images/<uuid>.png`.
        image: String,
    },
    /// Generic file offered as a download.
    File {
        /// Server-relative path, e.g. `/files/notes.txt`.
        file: String,
        /// The filename the client originally sent, before sanitization.
        original_filename: String,
        /// First few decoded lines, for plain-text uploads only.
        #[serde(skip_serializing_if = "Option::is_none")]
        preview: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_message_wire_shape() {
        let msg = Message::new("alice", "hi", None);
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["username"], "alice");
        assert_eq!(value["message"], "hi");
        assert!(value.get("image").is_none());
        assert!(value.get("file").is_none());

        // HH:MM:SS
        let ts = value["timestamp"].as_str().unwrap();
        assert_eq!(ts.len(), 8);
        assert_eq!(ts.as_bytes()[2], b':');
        assert_eq!(ts.as_bytes()[5], b':');
    }

    #[test]
    fn image_attachment_flattens() {
        let msg = Message::new(
            "bob",
            "",
            Some(Attachment::Image {
                image: "/images/abc.png".into(),
            }),
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["image"], "/images/abc.png");
        assert!(value.get("file").is_none());
    }

    #[test]
    fn file_attachment_flattens_and_skips_empty_preview() {
        let msg = Message::new(
            "bob",
            "see attached",
            Some(Attachment::File {
                file: "/files/notes.txt".into(),
                original_filename: "notes.txt".into(),
                preview: None,
            }),
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["file"], "/files/notes.txt");
        assert_eq!(value["original_filename"], "notes.txt");
        assert!(value.get("preview").is_none());
    }

    #[test]
    fn wire_round_trip() {
        let original = Message::new(
            "carol",
            "report",
            Some(Attachment::File {
                file: "/files/report.txt".into(),
                original_filename: "report.txt".into(),
                preview: Some("line one\nline two".into()),
            }),
        );
        let json = serde_json::to_string(&original).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn deserializes_client_poll_shape() {
        let json = r#"{
            "username": "alice",
            "message": "hi",
            "timestamp": "12:34:56",
            "image": "/images/550e8400-e29b-41d4-a716-446655440000.png"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.username, "alice");
        assert!(matches!(msg.attachment, Some(Attachment::Image { .. })));
    }
}
