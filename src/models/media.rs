//! Media categories and the delivery mode each one maps to.

use std::{path::Path, str::FromStr};

/// Extensions rendered by the browser from a byte stream.
const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "webm", "ogg", "mov"];

/// Source, markup and plain-text extensions returned as decoded JSON.
const TEXT_EXTENSIONS: [&str; 11] = [
    "txt", "md", "js", "py", "java", "cpp", "c", "html", "css", "json", "xml",
];

/// What kind of learning material a stored file holds, judged by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCategory {
    Video,
    Pdf,
    Epub,
    Text,
    /// Extension missing or not in any known list.
    Unknown,
}

/// How a file's bytes reach the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Chunked binary body with `Range` support.
    Streaming,
    /// Whole file decoded as UTF-8 and wrapped in JSON.
    Text,
}

/// Delivery mode applied to [`MediaCategory::Unknown`] files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum UnknownExtensionPolicy {
    #[default]
    Text,
    Stream,
}

impl MediaCategory {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some(e) if VIDEO_EXTENSIONS.contains(&e) => Self::Video,
            Some("pdf") => Self::Pdf,
            Some("epub") => Self::Epub,
            Some(e) if TEXT_EXTENSIONS.contains(&e) => Self::Text,
            _ => Self::Unknown,
        }
    }

    pub fn delivery_mode(self, unknown: UnknownExtensionPolicy) -> DeliveryMode {
        match self {
            Self::Video | Self::Pdf | Self::Epub => DeliveryMode::Streaming,
            Self::Text => DeliveryMode::Text,
            Self::Unknown => match unknown {
                UnknownExtensionPolicy::Text => DeliveryMode::Text,
                UnknownExtensionPolicy::Stream => DeliveryMode::Streaming,
            },
        }
    }
}

impl FromStr for UnknownExtensionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "stream" => Ok(Self::Stream),
            other => Err(format!("unknown extension policy `{}` (expected text|stream)", other)),
        }
    }
}

/// Guess a `Content-Type` from the file extension.
pub fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}
