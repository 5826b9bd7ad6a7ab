//! Error types for the download store.

use thiserror::Error;

/// Errors raised by [`super::DownloadRepository`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No record exists with this id.
    #[error("download record not found: id {0}")]
    NotFound(i64),

    /// A stored row could not be turned back into a record.
    #[error("corrupt download record {id}: {reason}")]
    Corrupt {
        /// Id of the offending row.
        id: i64,
        /// What was wrong with it.
        reason: String,
    },
}

impl StoreError {
    /// Returns true for [`StoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
