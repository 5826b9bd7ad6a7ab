//! Download coordinator: the public face of the engine.
//!
//! The coordinator allocates ids, picks collision-free destinations, bounds
//! concurrency with a semaphore and owns the active-download registry. Each
//! accepted download runs as its own tokio task that must hold a pool permit
//! while it talks to the network.
//!
//! # Concurrency Model
//!
//! - One tokio task per download, tracked by a [`TaskTracker`]
//! - A semaphore permit is held for the whole connect/stream phase (RAII)
//! - One dispatcher task owns every observer callback and store write
//! - Cancellation is cooperative through a per-download [`CancellationToken`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use web_downloads::{
//!     Database, DownloadCoordinator, DownloadStore, EngineConfig, LoggingObserver,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(DownloadStore::new(Database::new_in_memory().await?));
//! let engine = DownloadCoordinator::new(
//!     EngineConfig::with_downloads_dir("./downloads"),
//!     store,
//!     Arc::new(LoggingObserver),
//! )
//! .await?;
//! let id = engine
//!     .start_download("https://example.com/report.pdf", None, None, Some("application/pdf"))
//!     .await?;
//! assert!(engine.is_downloading(id));
//! engine.cleanup().await;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::HttpClient;
use super::constants::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::events::{DownloadEvent, DownloadObserver, Envelope, run_dispatcher};
use super::filename::guess_file_name;
use super::record::{DownloadRecord, DownloadStatus};
use super::registry::Registry;
use super::task::{DownloadTask, TaskShared};
use crate::config::{ConfigError, EngineConfig};
use crate::store::{DownloadRepository, StoreError};

/// Error type for coordinator operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The URL cannot be downloaded.
    #[error("invalid download URL '{url}': {reason}")]
    InvalidUrl {
        /// The URL as given by the host.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// `cleanup` already ran.
    #[error("download engine is shut down")]
    ShutDown,

    /// Engine configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("cannot build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The download store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

/// Coordinates every download of one host.
pub struct DownloadCoordinator {
    shared: TaskShared,
    store: Arc<dyn DownloadRepository>,
    tracker: TaskTracker,
    next_id: AtomicI64,
    events: Mutex<Option<mpsc::Sender<Envelope>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("downloads_dir", &self.shared.config.downloads_dir)
            .field("concurrency", &self.shared.config.concurrency)
            .field("active", &self.shared.registry.active_count())
            .finish_non_exhaustive()
    }
}

impl DownloadCoordinator {
    /// Creates a coordinator and starts its event dispatcher.
    ///
    /// Ids continue after the largest id already in `store`, so persisted
    /// records are never overwritten. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] or [`EngineError::Config`]
    /// for a bad configuration, [`EngineError::HttpClient`] if the client
    /// cannot be built, and [`EngineError::Store`] if the store cannot be read.
    #[instrument(level = "debug", skip_all, fields(downloads_dir = %config.downloads_dir.display()))]
    pub async fn new(
        config: EngineConfig,
        store: Arc<dyn DownloadRepository>,
        observer: Arc<dyn DownloadObserver>,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&config.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: config.concurrency,
            });
        }
        config.validate()?;

        let client = HttpClient::new(&config)?;
        let last_id = store
            .list()
            .await?
            .iter()
            .map(|record| record.id)
            .max()
            .unwrap_or(0);

        let (tx, rx) = mpsc::channel(config.event_capacity);
        let dispatcher = tokio::spawn(run_dispatcher(rx, Arc::clone(&store), observer));

        debug!(
            concurrency = config.concurrency,
            next_id = last_id + 1,
            "creating download coordinator"
        );

        Ok(Self {
            shared: TaskShared {
                semaphore: Arc::new(Semaphore::new(config.concurrency)),
                config: Arc::new(config),
                client,
                registry: Arc::new(Registry::default()),
            },
            store,
            tracker: TaskTracker::new(),
            next_id: AtomicI64::new(last_id + 1),
            events: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Engine configuration in effect.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Starts downloading `url` and returns the new download's id.
    ///
    /// Returns as soon as the record is persisted and the task is spawned; no
    /// network I/O happens before that. `user_agent`, `content_disposition`
    /// and `mime_type` are what the page supplied, all optional.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidUrl`] for unparseable or non-HTTP(S)
    /// URLs, [`EngineError::ShutDown`] after [`cleanup`](Self::cleanup), and
    /// [`EngineError::Store`] if the record cannot be persisted.
    #[instrument(skip(self, user_agent, content_disposition), fields(url = %url))]
    pub async fn start_download(
        &self,
        url: &str,
        user_agent: Option<&str>,
        content_disposition: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<i64, EngineError> {
        let parsed = Url::parse(url).map_err(|e| EngineError::invalid_url(url, e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(EngineError::invalid_url(
                url,
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }
        let events = self.sender().ok_or(EngineError::ShutDown)?;

        let candidate = guess_file_name(&parsed, content_disposition, mime_type);
        let registry = &self.shared.registry;
        let destination = registry
            .reserve_destination(&self.shared.config.downloads_dir, &candidate)
            .ok_or(EngineError::ShutDown)?;
        let file_name = destination
            .file_name()
            .map_or_else(|| candidate.clone(), |n| n.to_string_lossy().into_owned());

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = DownloadRecord::new(
            id,
            parsed.as_str(),
            file_name,
            destination.clone(),
            mime_type.map(str::to_string),
        );

        if let Err(e) = self.store.create(&record).await {
            registry.release_destination(&destination);
            return Err(e.into());
        }

        let token = CancellationToken::new();
        if !registry.register(id, token.clone()) {
            registry.release_destination(&destination);
            if let Err(e) = self.store.delete(id).await {
                debug!(id, error = %e, "could not drop record of refused download");
            }
            return Err(EngineError::ShutDown);
        }

        if events
            .send(Envelope::new(DownloadEvent::Started(record.clone()), &token))
            .await
            .is_err()
        {
            debug!(id, "event dispatcher is gone; started event dropped");
        }

        let task = DownloadTask::new(
            record,
            parsed,
            user_agent.map(str::to_string),
            token,
            events,
            self.shared.clone(),
        );
        self.tracker.spawn(task.run());

        info!(id, path = %destination.display(), "download queued");
        Ok(id)
    }

    /// Cancels `id` if it is active and deletes its persisted record.
    ///
    /// The running task notices the cancellation at its next checkpoint,
    /// deletes the partial file and reports `Download cancelled`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the record cannot be deleted. An
    /// already absent record is not an error.
    #[instrument(skip(self))]
    pub async fn cancel_download(&self, id: i64) -> Result<(), EngineError> {
        if self.shared.registry.cancel(id) {
            info!(id, "download cancelled");
        } else {
            debug!(id, "cancel requested for inactive download");
        }
        match self.store.delete(id).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns true while `id` is queued or transferring.
    #[must_use]
    pub fn is_downloading(&self, id: i64) -> bool {
        self.shared.registry.is_active(id)
    }

    /// Cancels every active download; the engine keeps accepting new ones.
    ///
    /// Persisted records stay and end up `cancelled`. Returns how many
    /// downloads were cancelled.
    #[instrument(skip(self))]
    pub fn cancel_all(&self) -> usize {
        let count = self.shared.registry.cancel_all();
        info!(count, "cancelled all active downloads");
        count
    }

    /// Number of active downloads.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.shared.registry.active_count()
    }

    /// Ids of active downloads, ascending.
    #[must_use]
    pub fn active_ids(&self) -> Vec<i64> {
        self.shared.registry.active_ids()
    }

    /// Persisted downloads, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the store cannot be read.
    pub async fn list_downloads(&self) -> Result<Vec<DownloadRecord>, EngineError> {
        Ok(self.store.list().await?)
    }

    /// Removes a download from the list, optionally deleting its file too.
    ///
    /// An active download is cancelled first; its partial file is removed by
    /// the task regardless of `delete_file`. Returns false when no such
    /// download exists.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the store fails.
    #[instrument(skip(self))]
    pub async fn remove_download(&self, id: i64, delete_file: bool) -> Result<bool, EngineError> {
        if self.shared.registry.is_active(id) {
            self.cancel_download(id).await?;
            return Ok(true);
        }

        let Some(record) = self.store.get(id).await? else {
            return Ok(false);
        };
        match self.store.delete(id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        if delete_file && record.status == DownloadStatus::Completed {
            remove_downloaded_file(&record.destination_path).await;
        }
        Ok(true)
    }

    /// Deletes every persisted record. Files on disk are kept.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the store fails.
    #[instrument(skip(self))]
    pub async fn clear_downloads(&self) -> Result<u64, EngineError> {
        let removed = self.store.clear().await?;
        info!(removed, "cleared download list");
        Ok(removed)
    }

    /// Shuts the engine down.
    ///
    /// Cancels every active download, refuses new ones, then waits at most the
    /// configured grace period for tasks to finish and the dispatcher to drain.
    /// Calling it again is a no-op.
    #[instrument(skip(self))]
    pub async fn cleanup(&self) {
        let cancelled = self.shared.registry.shut_down();
        self.shared.semaphore.close();
        self.tracker.close();
        drop(
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let deadline = Instant::now() + self.shared.config.cleanup_grace();
        if timeout_at(deadline, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                "download tasks still running after grace period"
            );
        }
        if let Some(handle) = dispatcher {
            match timeout_at(deadline, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "event dispatcher panicked"),
                Err(_) => warn!("event dispatcher did not drain before the grace period ended"),
            }
        }
        info!(cancelled, "download engine shut down");
    }

    fn sender(&self) -> Option<mpsc::Sender<Envelope>> {
        if self.shared.registry.is_shut_down() {
            return None;
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn remove_downloaded_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!(path = %path.display(), "deleted downloaded file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "downloaded file already gone");
        }
        Err(e) => warn!(path = %path.display(), error = %e, "failed to delete downloaded file"),
    }
}
