//! Write-once attachment storage.
//!
//! Uploaded blobs live outside the message log in two dedicated directories:
//! images (named by fresh UUID) and generic files (named by a sanitized
//! version of the client's filename, disambiguated on collision).  Once
//! written, a file is immutable; the log only ever references it by path.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use lanchat_store::Attachment;

use crate::error::ServerError;

/// Maximum preview length, in lines and characters.
const PREVIEW_LINES: usize = 10;
const PREVIEW_CHARS: usize = 500;

/// Shown when a text upload cannot be decoded for previewing.
const PREVIEW_UNAVAILABLE: &str = "(preview unavailable)";

#[derive(Debug, Clone)]
pub struct AttachmentStore {
    images_dir: PathBuf,
    files_dir: PathBuf,
}

impl AttachmentStore {
    /// Create the store, creating both directories if missing.
    pub async fn new(images_dir: PathBuf, files_dir: PathBuf) -> Result<Self, ServerError> {
        for dir in [&images_dir, &files_dir] {
            fs::create_dir_all(dir).await.map_err(|e| {
                ServerError::Attachment(format!(
                    "Failed to create attachment directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        info!(
            images = %images_dir.display(),
            files = %files_dir.display(),
            "Attachment store initialized"
        );

        Ok(Self {
            images_dir,
            files_dir,
        })
    }

    /// Store an image payload, either raw bytes or a base64 data-URL, under
    /// a freshly generated name.  Returns the attachment reference to embed
    /// in the message.
    pub async fn store_image(&self, payload: &[u8]) -> Result<Attachment, ServerError> {
        let (bytes, mime) = decode_image_payload(payload)?;
        if bytes.is_empty() {
            return Err(ServerError::Attachment("Empty image payload".to_string()));
        }

        let name = format!("{}.{}", Uuid::new_v4(), extension_for_mime(&mime));
        let path = self.images_dir.join(&name);

        fs::write(&path, &bytes)
            .await
            .map_err(|e| ServerError::Attachment(format!("Failed to write image {}: {}", name, e)))?;

        debug!(name = %name, size = bytes.len(), "Stored image");
        Ok(Attachment::Image {
            image: format!("/images/{name}"),
        })
    }

    /// Store a generic file upload under a sanitized, collision-free name
    /// and build a preview for plain-text payloads.
    pub async fn store_file(
        &self,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<Attachment, ServerError> {
        if bytes.is_empty() {
            return Err(ServerError::Attachment("Empty file upload".to_string()));
        }

        let sanitized = sanitize_filename(original_name);
        let name = self.unique_file_name(&sanitized);
        let path = self.files_dir.join(&name);

        fs::write(&path, bytes)
            .await
            .map_err(|e| ServerError::Attachment(format!("Failed to write file {}: {}", name, e)))?;

        let preview = if is_text_upload(&name) {
            Some(text_preview(bytes))
        } else {
            None
        };

        debug!(name = %name, size = bytes.len(), "Stored file");
        Ok(Attachment::File {
            file: format!("/files/{name}"),
            original_filename: original_name.to_string(),
            preview,
        })
    }

    /// Resolve a stored image name to its on-disk path.
    pub fn image_path(&self, name: &str) -> Result<PathBuf, ServerError> {
        safe_join(&self.images_dir, name)
    }

    /// Resolve a stored file name to its on-disk path.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, ServerError> {
        safe_join(&self.files_dir, name)
    }

    /// Append `-1`, `-2`, ... before the extension until the name is free.
    /// The caller writes immediately afterwards, and names are only ever
    /// created here, so the window for a duplicate is the same request
    /// racing itself.
    fn unique_file_name(&self, wanted: &str) -> String {
        if !self.files_dir.join(wanted).exists() {
            return wanted.to_string();
        }

        let (stem, ext) = match wanted.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (wanted, None),
        };

        let mut n = 1;
        loop {
            let candidate = match ext {
                Some(ext) => format!("{stem}-{n}.{ext}"),
                None => format!("{stem}-{n}"),
            };
            if !self.files_dir.join(&candidate).exists() {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Reduce a client-supplied filename to a single safe path component.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    // No leading/trailing dots: rules out "..", hidden names and Windows
    // trailing-dot weirdness in one pass.
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Join a stored name onto its directory, rejecting anything that could
/// escape it.  Stored names never contain separators, so a request that
/// does is hostile.
fn safe_join(base: &Path, name: &str) -> Result<PathBuf, ServerError> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(ServerError::BadRequest(
            "Path traversal detected".to_string(),
        ));
    }
    Ok(base.join(name))
}

/// Split a data-URL (`data:<mime>;base64,<payload>`) or pass raw bytes
/// through, sniffing the MIME from magic bytes in the raw case.
fn decode_image_payload(payload: &[u8]) -> Result<(Vec<u8>, String), ServerError> {
    if let Some(rest) = payload.strip_prefix(b"data:") {
        let text = std::str::from_utf8(rest)
            .map_err(|_| ServerError::Attachment("Malformed data-URL".to_string()))?;
        let (header, data) = text
            .split_once(',')
            .ok_or_else(|| ServerError::Attachment("Malformed data-URL".to_string()))?;

        let mime = header
            .split(';')
            .next()
            .filter(|m| !m.is_empty())
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = BASE64
            .decode(data.trim())
            .map_err(|e| ServerError::Attachment(format!("Invalid base64 image payload: {e}")))?;

        Ok((bytes, mime))
    } else {
        let mime = sniff_image_mime(payload).to_string();
        Ok((payload.to_vec(), mime))
    }
}

fn sniff_image_mime(data: &[u8]) -> &'static str {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        _ => "bin",
    }
}

/// Preview eligibility is decided by the stored name's MIME type; binary
/// uploads get no preview at all.
fn is_text_upload(name: &str) -> bool {
    mime_guess::from_path(name)
        .first()
        .map(|mime| mime.type_() == mime_guess::mime::TEXT)
        .unwrap_or(false)
}

/// Decode the first few lines of a text upload.  UTF-8 is the fast path;
/// anything else goes through charset detection.  Every failure mode
/// degrades to a placeholder string instead of an error.
fn text_preview(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (charset, confidence, _) = chardet::detect(bytes);
            if confidence < 0.5 {
                return PREVIEW_UNAVAILABLE.to_string();
            }
            match encoding_rs::Encoding::for_label(chardet::charset2encoding(&charset).as_bytes())
            {
                Some(encoding) => {
                    let (decoded, _, had_errors) = encoding.decode(bytes);
                    if had_errors {
                        return PREVIEW_UNAVAILABLE.to_string();
                    }
                    decoded.into_owned()
                }
                None => return PREVIEW_UNAVAILABLE.to_string(),
            }
        }
    };

    let mut preview = text
        .lines()
        .take(PREVIEW_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    if preview.chars().count() > PREVIEW_CHARS {
        preview = preview.chars().take(PREVIEW_CHARS).collect();
    }
    preview
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn test_store() -> (AttachmentStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = AttachmentStore::new(dir.path().join("images"), dir.path().join("files"))
            .await
            .unwrap();
        (store, dir)
    }

    #[test]
    fn sanitize_strips_path_components() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..\\..\\boot.ini"), "boot.ini");
        assert_eq!(sanitize_filename("notes.txt"), "notes.txt");
        assert_eq!(sanitize_filename("my report (final).pdf"), "my_report__final_.pdf");
        assert_eq!(sanitize_filename(".."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[test]
    fn safe_join_rejects_traversal() {
        let base = Path::new("/tmp/files");
        assert!(safe_join(base, "ok.txt").is_ok());
        assert!(safe_join(base, "../escape").is_err());
        assert!(safe_join(base, "a/b").is_err());
        assert!(safe_join(base, "").is_err());
    }

    #[tokio::test]
    async fn stores_file_and_builds_preview() {
        let (store, dir) = test_store().await;

        let attachment = store
            .store_file("notes.txt", b"line one\nline two\nline three")
            .await
            .unwrap();

        match attachment {
            Attachment::File {
                file,
                original_filename,
                preview,
            } => {
                assert_eq!(file, "/files/notes.txt");
                assert_eq!(original_filename, "notes.txt");
                assert_eq!(preview.as_deref(), Some("line one\nline two\nline three"));
            }
            other => panic!("expected file attachment, got {other:?}"),
        }

        assert!(dir.path().join("files/notes.txt").exists());
    }

    #[tokio::test]
    async fn binary_upload_has_no_preview() {
        let (store, _dir) = test_store().await;

        let attachment = store
            .store_file("archive.zip", &[0x50, 0x4B, 0x03, 0x04, 0x00])
            .await
            .unwrap();

        match attachment {
            Attachment::File { preview, .. } => assert!(preview.is_none()),
            other => panic!("expected file attachment, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn colliding_names_get_suffixed() {
        let (store, _dir) = test_store().await;

        let first = store.store_file("notes.txt", b"first").await.unwrap();
        let second = store.store_file("notes.txt", b"second").await.unwrap();
        let third = store.store_file("notes.txt", b"third").await.unwrap();

        let path_of = |a: &Attachment| match a {
            Attachment::File { file, .. } => file.clone(),
            other => panic!("expected file attachment, got {other:?}"),
        };

        assert_eq!(path_of(&first), "/files/notes.txt");
        assert_eq!(path_of(&second), "/files/notes-1.txt");
        assert_eq!(path_of(&third), "/files/notes-2.txt");
    }

    #[tokio::test]
    async fn stores_raw_png_bytes() {
        let (store, dir) = test_store().await;
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

        let attachment = store.store_image(&png).await.unwrap();
        let Attachment::Image { image } = attachment else {
            panic!("expected image attachment");
        };

        assert!(image.starts_with("/images/"));
        assert!(image.ends_with(".png"));

        let name = image.strip_prefix("/images/").unwrap();
        assert!(dir.path().join("images").join(name).exists());
    }

    #[tokio::test]
    async fn stores_data_url_image() {
        use base64::Engine as _;

        let (store, _dir) = test_store().await;
        let payload = format!(
            "data:image/png;base64,{}",
            BASE64.encode([0x89, b'P', b'N', b'G'])
        );

        let attachment = store.store_image(payload.as_bytes()).await.unwrap();
        let Attachment::Image { image } = attachment else {
            panic!("expected image attachment");
        };
        assert!(image.ends_with(".png"));
    }

    #[tokio::test]
    async fn rejects_bad_base64_data_url() {
        let (store, _dir) = test_store().await;
        let result = store.store_image(b"data:image/png;base64,!!!not-base64").await;
        assert!(result.is_err());
    }

    #[test]
    fn non_utf8_text_still_yields_a_preview_string() {
        // Latin-1 "café" — not valid UTF-8, must not panic; either a decoded
        // string or the placeholder is acceptable.
        let bytes = b"caf\xe9 ole\ncaf\xe9 con leche\n";
        let preview = text_preview(bytes);
        assert!(!preview.is_empty());
    }

    #[test]
    fn preview_is_truncated() {
        let many_lines: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let preview = text_preview(many_lines.as_bytes());
        assert_eq!(preview.lines().count(), PREVIEW_LINES);
    }
}
