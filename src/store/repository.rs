//! Persistence seam used by the coordinator and its dispatcher.
//!
//! The engine only ever talks to `dyn DownloadRepository`, so hosts can swap the
//! SQLite store for their own persistence layer.

use async_trait::async_trait;

use super::{DownloadStore, Result};
use crate::download::DownloadRecord;

/// Durable store for [`DownloadRecord`]s.
#[async_trait]
pub trait DownloadRepository: Send + Sync {
    /// Inserts a new record under its own id and returns that id.
    async fn create(&self, record: &DownloadRecord) -> Result<i64>;

    /// Overwrites every mutable field of an existing record.
    async fn update_full(&self, record: &DownloadRecord) -> Result<()>;

    /// Writes only `total_bytes` and `transferred_bytes`.
    async fn update_progress(&self, record: &DownloadRecord) -> Result<()>;

    /// Deletes one record.
    async fn delete(&self, id: i64) -> Result<()>;

    /// All records, newest first.
    async fn list(&self) -> Result<Vec<DownloadRecord>>;

    /// Deletes every record and returns how many were removed.
    async fn clear(&self) -> Result<u64>;

    /// Looks up one record.
    async fn get(&self, id: i64) -> Result<Option<DownloadRecord>>;
}

#[async_trait]
impl DownloadRepository for DownloadStore {
    async fn create(&self, record: &DownloadRecord) -> Result<i64> {
        DownloadStore::create(self, record).await
    }

    async fn update_full(&self, record: &DownloadRecord) -> Result<()> {
        DownloadStore::update_full(self, record).await
    }

    async fn update_progress(&self, record: &DownloadRecord) -> Result<()> {
        DownloadStore::update_progress(self, record).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        DownloadStore::delete(self, id).await
    }

    async fn list(&self) -> Result<Vec<DownloadRecord>> {
        DownloadStore::list(self).await
    }

    async fn clear(&self) -> Result<u64> {
        DownloadStore::clear(self).await
    }

    async fn get(&self, id: i64) -> Result<Option<DownloadRecord>> {
        DownloadStore::get(self, id).await
    }
}
