//! Download record and status types.

use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Lifecycle status of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Transfer is queued or in flight.
    Downloading,
    /// All bytes were written and the file was closed.
    Completed,
    /// Transfer stopped on a connection, transfer or filesystem error.
    Failed,
    /// Transfer was cancelled by the host.
    Cancelled,
}

impl DownloadStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns the label shown to users in download lists.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Downloading => "Downloading",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Returns true for `Completed`, `Failed` and `Cancelled`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Downloading)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "downloading" => Ok(Self::Downloading),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid download status: {s}")),
        }
    }
}

/// Persisted and observable state of one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Coordinator-assigned handle, unique within the store.
    pub id: i64,
    /// URL the bytes are fetched from.
    pub source_url: String,
    /// Title shown in download lists.
    pub display_title: String,
    /// Final file name inside the downloads directory.
    pub file_name: String,
    /// Absolute or downloads-dir-relative path of the file.
    pub destination_path: PathBuf,
    /// Declared size; zero or negative when the server did not report one.
    pub total_bytes: i64,
    /// Bytes received so far.
    pub transferred_bytes: i64,
    /// Current lifecycle status.
    pub status: DownloadStatus,
    /// MIME type reported by the page that triggered the download.
    pub mime_type: Option<String>,
    /// Failure message for `Failed` and `Cancelled` records.
    pub error_message: Option<String>,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl DownloadRecord {
    /// Creates a record in `Downloading` state with no bytes transferred.
    #[must_use]
    pub fn new(
        id: i64,
        source_url: impl Into<String>,
        file_name: impl Into<String>,
        destination_path: impl Into<PathBuf>,
        mime_type: Option<String>,
    ) -> Self {
        let file_name = file_name.into();
        Self {
            id,
            source_url: source_url.into(),
            display_title: file_name.clone(),
            file_name,
            destination_path: destination_path.into(),
            total_bytes: 0,
            transferred_bytes: 0,
            status: DownloadStatus::Downloading,
            mime_type,
            error_message: None,
            created_at: now_millis(),
        }
    }

    /// Returns true when the server declared a content length.
    #[must_use]
    pub fn has_known_size(&self) -> bool {
        self.total_bytes > 0
    }

    /// Percentage of the declared size received so far, or 0 when the size is unknown.
    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        if self.total_bytes <= 0 {
            return 0;
        }
        let percent = self.transferred_bytes.saturating_mul(100) / self.total_bytes;
        u8::try_from(percent.clamp(0, 100)).unwrap_or(100)
    }

    /// Adds `bytes` to the transferred count while the record is `Downloading`.
    ///
    /// Returns false (and leaves the record untouched) once the record is terminal.
    pub fn advance(&mut self, bytes: u64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        self.transferred_bytes = self.transferred_bytes.saturating_add(bytes);
        true
    }

    /// Moves the record to `next`.
    ///
    /// Only `Downloading → {Completed, Failed, Cancelled}` is accepted; every
    /// other transition is refused and returns false.
    pub fn transition(&mut self, next: DownloadStatus) -> bool {
        if self.status.is_terminal() || !next.is_terminal() {
            return false;
        }
        self.status = next;
        true
    }
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
