//! Error types for the download module.
//!
//! Every way a single transfer can end badly is a [`DownloadError`]. The task
//! converts it into exactly one `on_download_failed` call; it never reaches the
//! coordinator or the observer as an `Err`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that end a single download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Server answered with a non-2xx status. No bytes were written.
    #[error("Server returned HTTP {status} {reason}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// Canonical reason phrase, empty when unknown.
        reason: String,
    },

    /// Connection could not be established (DNS, refused, TLS, connect timeout).
    #[error("Network error: {message}")]
    Connect {
        /// Description of the connect failure.
        message: String,
    },

    /// IO failure while streaming the body to disk.
    #[error("Network error: {message}")]
    Transfer {
        /// Description of the read or write failure.
        message: String,
    },

    /// Destination directory or file could not be created.
    #[error("Download error: cannot write {path}: {source}")]
    FileSystem {
        /// The path that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Host cancelled the download.
    #[error("Download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Creates an HTTP status error with the canonical reason phrase.
    pub fn http_status(status: reqwest::StatusCode) -> Self {
        Self::HttpStatus {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
        }
    }

    /// Creates a connect-phase error from a reqwest error.
    pub fn connect(source: &reqwest::Error) -> Self {
        let message = if source.is_timeout() {
            format!("connect timed out: {source}")
        } else {
            source.to_string()
        };
        Self::Connect { message }
    }

    /// Creates a transfer error from an IO error raised while streaming.
    pub fn transfer(source: &std::io::Error) -> Self {
        Self::Transfer {
            message: source.to_string(),
        }
    }

    /// Creates a filesystem error.
    pub fn file_system(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this error is a cancellation rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
