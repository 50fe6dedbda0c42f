//! Error taxonomy for catalog sync operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the registry client, enablement store, reconciler and downloader.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Transport-level failure reaching the registry or a download URL.
    #[error("Network error while requesting {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The registry answered with a non-success status.
    #[error("Registry returned {status} for {url}")]
    Http { url: String, status: u16 },

    /// Malformed JSON from the registry or a local file.
    #[error("Failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Mod '{0}' not found")]
    NotFound(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Per-item download failure, collected into a `DownloadReport`.
    #[error("Download of '{name}' failed: {reason}")]
    Download {
        name: String,
        reason: String,
        #[source]
        source: Option<Box<SyncError>>,
    },

    #[error("Invalid server credentials: {0}")]
    Credentials(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn decode(what: impl Into<String>, source: serde_json::Error) -> Self {
        SyncError::Decode {
            what: what.into(),
            source,
        }
    }

    /// The URL is dropped from the reqwest error since it may carry credentials.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        SyncError::Network {
            url: url.into(),
            source: source.without_url(),
        }
    }

    pub fn download(name: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::Download {
            name: name.into(),
            reason: reason.to_string(),
            source: None,
        }
    }

    /// Attribute a per-item failure to `name` as `Download`, keeping the cause.
    /// `Download` and `Cancelled` pass through unchanged.
    pub fn into_download(self, name: &str) -> Self {
        match self {
            SyncError::Download { .. } | SyncError::Cancelled => self,
            cause => SyncError::Download {
                name: name.to_string(),
                reason: cause.to_string(),
                source: Some(Box::new(cause)),
            },
        }
    }

    /// The underlying error of a wrapped `Download`, else `self`.
    pub fn cause(&self) -> &SyncError {
        match self {
            SyncError::Download {
                source: Some(cause),
                ..
            } => cause,
            other => other,
        }
    }

    /// Whether a caller may retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network { .. } => true,
            SyncError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// True for a missing file, which `LocalEnablementStore::load_or_default` treats as "no entries".
    pub fn is_missing_file(&self) -> bool {
        matches!(self, SyncError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
