//! SQLite-backed persistence for download records.
//!
//! - [`DownloadStore`] - the sqlx implementation
//! - [`DownloadRepository`] - the trait the coordinator depends on
//! - [`StoreError`] - operation error types

mod error;
mod repository;

pub use error::StoreError;
pub use repository::DownloadRepository;

use std::path::PathBuf;

use sqlx::FromRow;
use tracing::instrument;

use crate::db::Database;
use crate::download::{DownloadRecord, DownloadStatus};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Returns `Ok(())` if at least one row was affected; otherwise [`StoreError::NotFound`].
fn check_affected(id: i64, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(StoreError::NotFound(id))
    } else {
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct DownloadRow {
    id: i64,
    source_url: String,
    display_title: String,
    file_name: String,
    destination_path: String,
    total_bytes: i64,
    transferred_bytes: i64,
    status: String,
    mime_type: Option<String>,
    error_message: Option<String>,
    created_at: i64,
}

impl TryFrom<DownloadRow> for DownloadRecord {
    type Error = StoreError;

    fn try_from(row: DownloadRow) -> Result<Self> {
        let status = row
            .status
            .parse::<DownloadStatus>()
            .map_err(|reason| StoreError::Corrupt { id: row.id, reason })?;
        Ok(Self {
            id: row.id,
            source_url: row.source_url,
            display_title: row.display_title,
            file_name: row.file_name,
            destination_path: PathBuf::from(row.destination_path),
            total_bytes: row.total_bytes,
            transferred_bytes: row.transferred_bytes,
            status,
            mime_type: row.mime_type,
            error_message: row.error_message,
            created_at: row.created_at,
        })
    }
}

/// Download list stored in the `downloads` table.
#[derive(Debug, Clone)]
pub struct DownloadStore {
    db: Database,
}

impl DownloadStore {
    /// Wraps an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts `record` under its own id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails, including when
    /// the id is already taken.
    #[instrument(skip(self, record), fields(id = record.id))]
    pub async fn create(&self, record: &DownloadRecord) -> Result<i64> {
        sqlx::query(
            r"INSERT INTO downloads (
                id, source_url, display_title, file_name, destination_path,
                total_bytes, transferred_bytes, status, mime_type, error_message, created_at
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id)
        .bind(&record.source_url)
        .bind(&record.display_title)
        .bind(&record.file_name)
        .bind(record.destination_path.to_string_lossy().as_ref())
        .bind(record.total_bytes)
        .bind(record.transferred_bytes)
        .bind(record.status.as_str())
        .bind(record.mime_type.as_deref())
        .bind(record.error_message.as_deref())
        .bind(record.created_at)
        .execute(self.db.pool())
        .await?;
        Ok(record.id)
    }

    /// Overwrites sizes, status and error message of an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the id is absent.
    #[instrument(skip(self, record), fields(id = record.id, status = %record.status))]
    pub async fn update_full(&self, record: &DownloadRecord) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE downloads
              SET display_title = ?, file_name = ?, destination_path = ?,
                  total_bytes = ?, transferred_bytes = ?, status = ?,
                  mime_type = ?, error_message = ?
              WHERE id = ?",
        )
        .bind(&record.display_title)
        .bind(&record.file_name)
        .bind(record.destination_path.to_string_lossy().as_ref())
        .bind(record.total_bytes)
        .bind(record.transferred_bytes)
        .bind(record.status.as_str())
        .bind(record.mime_type.as_deref())
        .bind(record.error_message.as_deref())
        .bind(record.id)
        .execute(self.db.pool())
        .await?;
        check_affected(record.id, result.rows_affected())
    }

    /// Writes only the size fields of an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the id is absent.
    #[instrument(level = "trace", skip(self, record), fields(id = record.id))]
    pub async fn update_progress(&self, record: &DownloadRecord) -> Result<()> {
        let result = sqlx::query(
            "UPDATE downloads SET total_bytes = ?, transferred_bytes = ? WHERE id = ?",
        )
        .bind(record.total_bytes)
        .bind(record.transferred_bytes)
        .bind(record.id)
        .execute(self.db.pool())
        .await?;
        check_affected(record.id, result.rows_affected())
    }

    /// Deletes one record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the id is absent.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM downloads WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        check_affected(id, result.rows_affected())
    }

    /// Every record, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails, or
    /// [`StoreError::Corrupt`] for a row with an unknown status.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<DownloadRecord>> {
        let rows = sqlx::query_as::<_, DownloadRow>(
            "SELECT * FROM downloads ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(self.db.pool())
        .await?;
        rows.into_iter().map(DownloadRecord::try_from).collect()
    }

    /// Deletes every record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM downloads")
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Looks up one record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] or [`StoreError::Corrupt`].
    #[instrument(skip(self))]
    pub async fn get(&self, id: i64) -> Result<Option<DownloadRecord>> {
        let row = sqlx::query_as::<_, DownloadRow>("SELECT * FROM downloads WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(DownloadRecord::try_from).transpose()
    }
}
