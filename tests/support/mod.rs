//! Shared helpers for integration tests: socket guard, a recording observer
//! and a coordinator wired to a temporary directory.

#![allow(dead_code)]

#[macro_use]
pub mod socket_guard;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::Notify;
use web_downloads::{
    Database, DownloadCoordinator, DownloadObserver, DownloadRecord, DownloadStore, EngineConfig,
};

/// Upper bound for any wait on observer events.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(30);

/// One observer callback as seen by the test.
#[derive(Debug, Clone)]
pub enum Seen {
    Started(DownloadRecord),
    Progress(DownloadRecord),
    Completed(DownloadRecord),
    Failed(DownloadRecord, String),
}

impl Seen {
    pub fn record(&self) -> &DownloadRecord {
        match self {
            Self::Started(record)
            | Self::Progress(record)
            | Self::Completed(record)
            | Self::Failed(record, _) => record,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(..))
    }
}

/// Observer that keeps every callback in arrival order.
#[derive(Default)]
pub struct RecordingObserver {
    seen: Mutex<Vec<Seen>>,
    changed: Notify,
}

impl RecordingObserver {
    fn push(&self, seen: Seen) {
        self.seen.lock().unwrap().push(seen);
        self.changed.notify_waiters();
    }

    pub fn events(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn events_for(&self, id: i64) -> Vec<Seen> {
        self.events()
            .into_iter()
            .filter(|seen| seen.record().id == id)
            .collect()
    }

    pub fn progress_for(&self, id: i64) -> Vec<i64> {
        self.events_for(id)
            .iter()
            .filter_map(|seen| match seen {
                Seen::Progress(record) => Some(record.transferred_bytes),
                _ => None,
            })
            .collect()
    }

    /// Waits until `done` holds for the recorded events; panics after [`EVENT_TIMEOUT`].
    pub async fn wait_until(&self, done: impl Fn(&[Seen]) -> bool) {
        let wait = async {
            loop {
                let notified = self.changed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if done(&self.events()) {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(EVENT_TIMEOUT, wait)
            .await
            .expect("timed out waiting for download events");
    }

    /// Waits for the terminal event of `id` and returns it.
    pub async fn wait_terminal(&self, id: i64) -> Seen {
        self.wait_until(|seen| {
            seen.iter()
                .any(|event| event.record().id == id && event.is_terminal())
        })
        .await;
        self.events_for(id)
            .into_iter()
            .find(Seen::is_terminal)
            .expect("terminal event present")
    }

    /// Waits until `count` downloads have reached a terminal event.
    pub async fn wait_terminal_count(&self, count: usize) {
        self.wait_until(|seen| seen.iter().filter(|event| event.is_terminal()).count() >= count)
            .await;
    }

    /// Waits for the first progress event of `id`.
    pub async fn wait_progress(&self, id: i64) {
        self.wait_until(|seen| {
            seen.iter()
                .any(|event| matches!(event, Seen::Progress(r) if r.id == id))
        })
        .await;
    }
}

impl DownloadObserver for RecordingObserver {
    fn on_download_started(&self, record: &DownloadRecord) {
        self.push(Seen::Started(record.clone()));
    }

    fn on_download_progress(&self, record: &DownloadRecord) {
        self.push(Seen::Progress(record.clone()));
    }

    fn on_download_completed(&self, record: &DownloadRecord) {
        self.push(Seen::Completed(record.clone()));
    }

    fn on_download_failed(&self, record: &DownloadRecord, error: &str) {
        self.push(Seen::Failed(record.clone(), error.to_string()));
    }
}

/// A coordinator over a file-backed store, both inside one temp dir.
pub struct Harness {
    pub temp_dir: TempDir,
    pub store: Arc<DownloadStore>,
    pub observer: Arc<RecordingObserver>,
    pub coordinator: DownloadCoordinator,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// `configure` runs on a default config whose downloads dir is `<tmp>/files`.
    pub async fn with_config(configure: impl FnOnce(&mut EngineConfig)) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let mut config = EngineConfig::with_downloads_dir(temp_dir.path().join("files"));
        configure(&mut config);

        let db = Database::new(&temp_dir.path().join("downloads.db"))
            .await
            .expect("failed to open database");
        let store = Arc::new(DownloadStore::new(db));
        let observer = Arc::new(RecordingObserver::default());
        let coordinator = DownloadCoordinator::new(config, store.clone(), observer.clone())
            .await
            .expect("failed to build coordinator");

        Self {
            temp_dir,
            store,
            observer,
            coordinator,
        }
    }

    pub fn downloads_dir(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("files")
    }
}
