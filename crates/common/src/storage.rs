//! Media collaborator for chat attachments.
//!
//! Attachments are validated against an accepted MIME set and a size ceiling
//! before anything is written, then handed to a [`MediaStore`] which returns a
//! public URL and an opaque deletion handle.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::MediaConfig;
use crate::{AppError, AppResult};

/// MIME types a chat attachment may declare.
///
/// `audio/webm` is also accepted with codec parameters (`audio/webm;codecs=opus`).
pub const ACCEPTED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "application/pdf",
    "video/mp4",
    "video/webm",
    "audio/mp3",
    "audio/wav",
    "audio/ogg",
    "audio/webm",
];

/// Broad category of an attachment, derived from its MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    Document,
}

impl AttachmentKind {
    /// Classify a MIME type. Anything that isn't image, video or audio is a document.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime_essence(mime);
        if essence.starts_with("image/") {
            Self::Image
        } else if essence.starts_with("video/") {
            Self::Video
        } else if essence.starts_with("audio/") {
            Self::Audio
        } else {
            Self::Document
        }
    }

    /// Placeholder shown in a conversation summary when the message has no text.
    #[must_use]
    pub const fn placeholder(self) -> &'static str {
        match self {
            Self::Image => "[Image]",
            Self::Video => "[Video]",
            Self::Audio => "[Audio]",
            Self::Document => "[Document]",
        }
    }

    /// Word used in notification text ("New image from ...").
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }
}

fn mime_essence(mime: &str) -> String {
    mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

/// Check a declared MIME type and size before upload.
pub fn validate_attachment(mime: &str, size: u64, max_bytes: u64) -> AppResult<AttachmentKind> {
    let essence = mime_essence(mime);
    if !ACCEPTED_MIME_TYPES.contains(&essence.as_str()) {
        return Err(AppError::Validation(format!(
            "Unsupported attachment type: {mime}"
        )));
    }
    // Only audio/webm may carry codec parameters.
    if mime.contains(';') && essence != "audio/webm" {
        return Err(AppError::Validation(format!(
            "Unsupported attachment type: {mime}"
        )));
    }
    if size > max_bytes {
        return Err(AppError::Validation(format!(
            "Attachment exceeds the {max_bytes} byte limit"
        )));
    }
    Ok(AttachmentKind::from_mime(&essence))
}

/// Result of storing an attachment.
#[derive(Debug, Clone)]
pub struct StoredMedia {
    /// Public URL to access the file.
    pub url: String,
    /// Opaque handle used to release the object later.
    pub deletion_handle: String,
    /// Preview image URL, only set for video.
    pub thumbnail_url: Option<String>,
    /// File size in bytes.
    pub size: u64,
    /// MD5 hash of the file.
    pub md5: String,
}

/// Attachment storage backend.
#[async_trait::async_trait]
pub trait MediaStore: Send + Sync {
    /// Store the bytes under `key`.
    async fn upload(&self, key: &str, data: &[u8], mime: &str) -> AppResult<StoredMedia>;

    /// Release a previously stored object.
    async fn delete(&self, deletion_handle: &str) -> AppResult<()>;

    /// Read back the bytes of a stored object.
    async fn read(&self, deletion_handle: &str) -> AppResult<Vec<u8>>;

    /// Public URL for a key.
    fn public_url(&self, key: &str) -> String;
}

/// Local filesystem storage backend.
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new local storage backend.
    #[must_use]
    pub const fn new(base_path: PathBuf, base_url: String) -> Self {
        Self { base_path, base_url }
    }

    /// Build from the `media` config section.
    #[must_use]
    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(config.base_path.clone(), config.base_url.clone())
    }

    fn resolve(&self, key: &str) -> AppResult<PathBuf> {
        if key.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(AppError::Storage(format!("Invalid storage key: {key}")));
        }
        Ok(self.base_path.join(key))
    }
}

#[async_trait::async_trait]
impl MediaStore for LocalStorage {
    async fn upload(&self, key: &str, data: &[u8], mime: &str) -> AppResult<StoredMedia> {
        let path = self.resolve(key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create directory: {e}")))?;
        }

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write file: {e}")))?;

        let url = self.public_url(key);
        // Browsers render the first frame for a media fragment URL.
        let thumbnail_url = (AttachmentKind::from_mime(mime) == AttachmentKind::Video)
            .then(|| format!("{url}#t=0.1"));

        Ok(StoredMedia {
            url,
            deletion_handle: key.to_string(),
            thumbnail_url,
            size: data.len() as u64,
            md5: format!("{:x}", md5::compute(data)),
        })
    }

    async fn delete(&self, deletion_handle: &str) -> AppResult<()> {
        let path = self.resolve(deletion_handle)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!("Failed to delete file: {e}"))),
        }
    }

    async fn read(&self, deletion_handle: &str) -> AppResult<Vec<u8>> {
        let path = self.resolve(deletion_handle)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound(
                format!("Stored file not found: {deletion_handle}"),
            )),
            Err(e) => Err(AppError::Storage(format!("Failed to read file: {e}"))),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}

/// Generate a unique storage key for an attachment.
#[must_use]
pub fn generate_storage_key(user_id: &str, original_name: &str) -> String {
    use chrono::Utc;

    let now = Utc::now();
    let date_path = now.format("%Y/%m/%d").to_string();
    let timestamp = now.timestamp_millis();

    let extension = original_name
        .rfind('.')
        .filter(|&pos| pos > 0 && pos < original_name.len() - 1)
        .map(|pos| &original_name[pos + 1..])
        .filter(|ext| ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("bin");

    format!(
        "chat/{date_path}/{user_id}/{timestamp}_{}.{extension}",
        uuid::Uuid::new_v4().simple()
    )
}
