//! Lifecycle events and the dispatcher that delivers them.
//!
//! Tasks never call the observer or the store directly. They push
//! [`Envelope`]s into one bounded channel; a single dispatcher task drains it,
//! writes to the store and then notifies the observer. Observers therefore
//! see one serialized stream, ordered per id.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::record::DownloadRecord;
use crate::store::{DownloadRepository, StoreError};

/// Consumer of download lifecycle events (UI, notifications, logs).
///
/// Per id the calls arrive in order: one `started`, zero or more `progress`,
/// then exactly one of `completed` or `failed`. Callbacks run on the
/// dispatcher task and should return quickly.
pub trait DownloadObserver: Send + Sync {
    /// The download was accepted and persisted.
    fn on_download_started(&self, record: &DownloadRecord);

    /// Throttled progress; `record.transferred_bytes` never decreases.
    fn on_download_progress(&self, record: &DownloadRecord);

    /// All bytes were written.
    fn on_download_completed(&self, record: &DownloadRecord);

    /// The download failed or was cancelled; `error` is the display message.
    fn on_download_failed(&self, record: &DownloadRecord, error: &str);
}

/// Observer that writes every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl DownloadObserver for LoggingObserver {
    fn on_download_started(&self, record: &DownloadRecord) {
        info!(
            id = record.id,
            url = %record.source_url,
            path = %record.destination_path.display(),
            "download started"
        );
    }

    fn on_download_progress(&self, record: &DownloadRecord) {
        debug!(
            id = record.id,
            transferred = record.transferred_bytes,
            total = record.total_bytes,
            percent = record.progress_percent(),
            "download progress"
        );
    }

    fn on_download_completed(&self, record: &DownloadRecord) {
        info!(
            id = record.id,
            bytes = record.transferred_bytes,
            path = %record.destination_path.display(),
            "download completed"
        );
    }

    fn on_download_failed(&self, record: &DownloadRecord, error: &str) {
        warn!(id = record.id, status = %record.status, error, "download failed");
    }
}

/// One lifecycle step of a download, carrying a snapshot of its record.
#[derive(Debug, Clone)]
pub(crate) enum DownloadEvent {
    Started(DownloadRecord),
    /// The response arrived; persists the declared size without notifying.
    SizeKnown(DownloadRecord),
    Progress(DownloadRecord),
    Completed(DownloadRecord),
    Failed {
        record: DownloadRecord,
        error: String,
    },
}

/// An event plus the token of the download that produced it.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) event: DownloadEvent,
    pub(crate) token: CancellationToken,
}

impl Envelope {
    pub(crate) fn new(event: DownloadEvent, token: &CancellationToken) -> Self {
        Self {
            event,
            token: token.clone(),
        }
    }
}

/// Drains `events` until every sender is gone.
pub(crate) async fn run_dispatcher(
    mut events: mpsc::Receiver<Envelope>,
    store: Arc<dyn DownloadRepository>,
    observer: Arc<dyn DownloadObserver>,
) {
    while let Some(Envelope { event, token }) = events.recv().await {
        match event {
            DownloadEvent::Started(record) => observer.on_download_started(&record),
            DownloadEvent::SizeKnown(record) => {
                log_store_result(record.id, store.update_progress(&record).await);
            }
            DownloadEvent::Progress(record) => {
                if token.is_cancelled() {
                    trace!(id = record.id, "dropping progress of cancelled download");
                    continue;
                }
                log_store_result(record.id, store.update_progress(&record).await);
                // Cancel may land while the store write is pending.
                if token.is_cancelled() {
                    continue;
                }
                observer.on_download_progress(&record);
            }
            DownloadEvent::Completed(record) => {
                log_store_result(record.id, store.update_full(&record).await);
                observer.on_download_completed(&record);
            }
            DownloadEvent::Failed { record, error } => {
                log_store_result(record.id, store.update_full(&record).await);
                observer.on_download_failed(&record, &error);
            }
        }
    }
    debug!("event dispatcher drained");
}

fn log_store_result(id: i64, result: Result<(), StoreError>) {
    match result {
        Ok(()) => {}
        // Cancelled or removed downloads lose their row before the task ends.
        Err(e) if e.is_not_found() => debug!(id, "download record already gone"),
        Err(e) => warn!(id, error = %e, "failed to persist download record"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::db::Database;
    use crate::download::DownloadStatus;
    use crate::store::DownloadStore;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl DownloadObserver for Recorder {
        fn on_download_started(&self, record: &DownloadRecord) {
            self.seen.lock().unwrap().push(format!("started:{}", record.id));
        }
        fn on_download_progress(&self, record: &DownloadRecord) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("progress:{}", record.transferred_bytes));
        }
        fn on_download_completed(&self, record: &DownloadRecord) {
            self.seen.lock().unwrap().push(format!("completed:{}", record.id));
        }
        fn on_download_failed(&self, _record: &DownloadRecord, error: &str) {
            self.seen.lock().unwrap().push(format!("failed:{error}"));
        }
    }

    fn record() -> DownloadRecord {
        DownloadRecord::new(1, "https://example.com/a.bin", "a.bin", "/tmp/a.bin", None)
    }

    async fn store() -> Arc<DownloadStore> {
        Arc::new(DownloadStore::new(Database::new_in_memory().await.unwrap()))
    }

    #[tokio::test]
    async fn test_dispatcher_persists_then_notifies_in_order() {
        let store = store().await;
        let observer = Arc::new(Recorder::default());
        let token = CancellationToken::new();
        let mut rec = record();
        store.create(&rec).await.unwrap();

        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(run_dispatcher(rx, store.clone(), observer.clone()));

        tx.send(Envelope::new(DownloadEvent::Started(rec.clone()), &token))
            .await
            .unwrap();
        rec.total_bytes = 10;
        tx.send(Envelope::new(DownloadEvent::SizeKnown(rec.clone()), &token))
            .await
            .unwrap();
        rec.advance(10);
        tx.send(Envelope::new(DownloadEvent::Progress(rec.clone()), &token))
            .await
            .unwrap();
        rec.transition(DownloadStatus::Completed);
        tx.send(Envelope::new(DownloadEvent::Completed(rec.clone()), &token))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(
            *observer.seen.lock().unwrap(),
            vec!["started:1", "progress:10", "completed:1"]
        );
        let stored = store.get(1).await.unwrap().unwrap();
        assert_eq!(stored.status, DownloadStatus::Completed);
        assert_eq!(stored.transferred_bytes, 10);
        assert_eq!(stored.total_bytes, 10);
    }

    #[tokio::test]
    async fn test_dispatcher_drops_progress_of_cancelled_download() {
        let store = store().await;
        let observer = Arc::new(Recorder::default());
        let token = CancellationToken::new();
        let mut rec = record();

        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(run_dispatcher(rx, store.clone(), observer.clone()));

        rec.advance(5);
        token.cancel();
        tx.send(Envelope::new(DownloadEvent::Progress(rec.clone()), &token))
            .await
            .unwrap();
        rec.transition(DownloadStatus::Cancelled);
        tx.send(Envelope::new(
            DownloadEvent::Failed {
                record: rec.clone(),
                error: "Download cancelled".to_string(),
            },
            &token,
        ))
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        // The row never existed: the terminal write is NotFound and only logged.
        assert_eq!(
            *observer.seen.lock().unwrap(),
            vec!["failed:Download cancelled"]
        );
        assert!(store.get(1).await.unwrap().is_none());
    }

    /// Cancels `token` while a progress row is being written.
    struct CancelDuringWrite {
        inner: Arc<DownloadStore>,
        token: CancellationToken,
    }

    #[async_trait::async_trait]
    impl DownloadRepository for CancelDuringWrite {
        async fn create(&self, record: &DownloadRecord) -> crate::store::Result<i64> {
            self.inner.create(record).await
        }
        async fn update_full(&self, record: &DownloadRecord) -> crate::store::Result<()> {
            self.inner.update_full(record).await
        }
        async fn update_progress(&self, record: &DownloadRecord) -> crate::store::Result<()> {
            self.token.cancel();
            self.inner.update_progress(record).await
        }
        async fn delete(&self, id: i64) -> crate::store::Result<()> {
            self.inner.delete(id).await
        }
        async fn list(&self) -> crate::store::Result<Vec<DownloadRecord>> {
            self.inner.list().await
        }
        async fn clear(&self) -> crate::store::Result<u64> {
            self.inner.clear().await
        }
        async fn get(&self, id: i64) -> crate::store::Result<Option<DownloadRecord>> {
            self.inner.get(id).await
        }
    }

    #[tokio::test]
    async fn test_dispatcher_drops_progress_cancelled_during_store_write() {
        let token = CancellationToken::new();
        let repository = Arc::new(CancelDuringWrite {
            inner: store().await,
            token: token.clone(),
        });
        let observer = Arc::new(Recorder::default());
        let mut rec = record();

        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(run_dispatcher(rx, repository, observer.clone()));

        rec.advance(5);
        tx.send(Envelope::new(DownloadEvent::Progress(rec.clone()), &token))
            .await
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert!(token.is_cancelled());
        assert!(observer.seen.lock().unwrap().is_empty());
    }
}
