//! src/services/storage_service.rs
//!
//! StorageService — flat on-disk store for uploaded learning materials.
//! Every upload lands at `base_path/{uuid}{ext}`; the stored name doubles as
//! the public file identifier. Files are never rewritten after the rename
//! that publishes them.

use crate::models::{
    media::guess_content_type,
    stored_file::{StoredFile, UploadedFile},
};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file `{0}` not found")]
    NotFound(String),
    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

const MAX_FILE_ID_LEN: usize = 255;
const MAX_EXTENSION_LEN: usize = 16;

/// StorageService provides the two disk operations the service needs:
/// - Store an upload (streams bytes to a temp file, then renames it in place)
/// - Resolve an identifier to a readable file
#[derive(Clone, Debug)]
pub struct StorageService {
    /// Directory holding every uploaded payload.
    pub base_path: PathBuf,

    /// Largest accepted upload, in bytes.
    pub max_file_size: u64,
}

impl StorageService {
    pub fn new(base_path: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            base_path: base_path.into(),
            max_file_size,
        }
    }

    /// Reject identifiers that could escape `base_path`.
    ///
    /// Identifiers are plain file names: no separators, no `..`, no control
    /// characters, and no hidden (dot-prefixed) names such as temp files.
    fn ensure_id_safe(&self, id: &str) -> StorageResult<()> {
        let unsafe_id = id.is_empty()
            || id.len() > MAX_FILE_ID_LEN
            || id.starts_with('.')
            || id.contains("..")
            || id
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\');

        if unsafe_id {
            // Unsafe ids can never name a stored file.
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.base_path.join(id)
    }

    /// Resolve an identifier to an existing regular file.
    pub async fn resolve(&self, id: &str) -> StorageResult<StoredFile> {
        self.ensure_id_safe(id)?;
        let path = self.file_path(id);

        let meta = fs::metadata(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::NotFound(id.to_string())
            } else {
                StorageError::Io(err)
            }
        })?;
        if !meta.is_file() {
            return Err(StorageError::NotFound(id.to_string()));
        }

        Ok(StoredFile {
            id: id.to_string(),
            content_type: guess_content_type(&path),
            path,
            size: meta.len(),
        })
    }

    /// Stream-upload a file to disk.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Computes MD5 and size while streaming, aborting past `max_file_size`.
    /// - Renames into its final, uniquely named location.
    ///
    /// The temp file is removed on every error path.
    pub async fn store_stream<S>(
        &self,
        original_name: &str,
        mimetype: Option<String>,
        stream: S,
    ) -> StorageResult<UploadedFile>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        fs::create_dir_all(&self.base_path).await?;

        let stored_name = unique_file_name(original_name);
        let file_path = self.file_path(&stored_name);
        let tmp_path = self.base_path.join(format!(".tmp-{}", Uuid::new_v4()));

        match self.write_temp(&tmp_path, stream).await {
            Ok((size, etag)) => {
                if let Err(err) = fs::rename(&tmp_path, &file_path).await {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
                debug!("stored {} ({} bytes) as {}", original_name, size, stored_name);

                Ok(UploadedFile {
                    id: stored_name.clone(),
                    filename: original_name.to_string(),
                    stored_name,
                    size,
                    mimetype,
                    etag,
                    upload_time: Utc::now(),
                })
            }
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                Err(err)
            }
        }
    }

    async fn write_temp<S>(&self, tmp_path: &Path, stream: S) -> StorageResult<(u64, String)>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let mut file = File::create(tmp_path).await?;
        let mut size: u64 = 0;
        let mut digest = Context::new();

        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size += chunk.len() as u64;
            if size > self.max_file_size {
                return Err(StorageError::TooLarge {
                    limit: self.max_file_size,
                });
            }
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;

        Ok((size, format!("{:x}", digest.compute())))
    }
}

/// `{uuid}{.ext}` with the original extension lowercased.
///
/// Overlong or non-alphanumeric extensions are dropped so the stored name
/// always passes `ensure_id_safe`.
fn unique_file_name(original: &str) -> String {
    let ext = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() <= MAX_EXTENSION_LEN && e.bytes().all(|b| b.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();

    format!("{}{}", Uuid::new_v4().simple(), ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = io::Result<Bytes>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok::<_, io::Error>(Bytes::from_static(*p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn store_then_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageService::new(dir.path(), 1024);

        let uploaded = storage
            .store_stream("Lecture.MP4", Some("video/mp4".into()), chunks(&[b"abc", b"def"]))
            .await
            .unwrap();

        assert!(uploaded.id.ends_with(".mp4"));
        assert_eq!(uploaded.id, uploaded.stored_name);
        assert_eq!(uploaded.filename, "Lecture.MP4");
        assert_eq!(uploaded.size, 6);
        assert_eq!(uploaded.etag, format!("{:x}", md5::compute(b"abcdef")));

        let stored = storage.resolve(&uploaded.id).await.unwrap();
        assert_eq!(stored.size, 6);
        assert_eq!(stored.content_type, "video/mp4");
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn oversized_upload_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageService::new(dir.path(), 4);

        let err = storage
            .store_stream("big.txt", None, chunks(&[b"abc", b"def"]))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::TooLarge { limit: 4 }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn resolve_rejects_missing_and_unsafe_ids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let storage = StorageService::new(dir.path(), 1024);

        for id in ["missing.pdf", "../etc/passwd", "a/b.txt", ".tmp-x", "", "sub"] {
            assert!(
                matches!(storage.resolve(id).await, Err(StorageError::NotFound(_))),
                "expected `{}` to be not found",
                id
            );
        }
    }

    #[test]
    fn unique_names_keep_safe_extensions_only() {
        assert!(unique_file_name("notes.MD").ends_with(".md"));
        assert!(!unique_file_name("archive.tar;rm").contains(';'));
        assert_eq!(unique_file_name("README").len(), 32);
    }
}
