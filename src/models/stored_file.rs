//! Represents an uploaded learning material on local disk.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// A file resolved from the upload directory.
///
/// Files are immutable once written, so `size` is stable for the lifetime
/// of a request.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Opaque identifier, equal to the stored file name.
    pub id: String,

    /// Absolute or upload-dir-relative path to the payload.
    pub path: PathBuf,

    /// Size in bytes.
    pub size: u64,

    /// Media type guessed from the extension.
    pub content_type: String,
}

/// Descriptor returned to the client after an upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// Identifier used by `GET /api/upload/{id}/content`.
    pub id: String,

    /// Original filename as sent by the client.
    pub filename: String,

    /// Name of the payload inside the upload directory.
    pub stored_name: String,

    /// Size in bytes.
    pub size: u64,

    /// Content type declared by the client, if any.
    pub mimetype: Option<String>,

    /// Hex MD5 of the payload.
    pub etag: String,

    /// When the upload finished.
    pub upload_time: DateTime<Utc>,
}
