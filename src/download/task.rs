//! One transfer, end to end.
//!
//! States: queued (waiting for a pool permit) → connecting → streaming →
//! completed | failed | cancelled. Every way out of `execute` funnels through
//! `finish`, which retires the id and emits exactly one terminal event.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures_util::TryStreamExt;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::{HttpClient, declared_length};
use super::error::DownloadError;
use super::events::{DownloadEvent, Envelope};
use super::record::{DownloadRecord, DownloadStatus};
use super::registry::Registry;
use super::throttle::{ProgressThrottler, SizeClass};
use crate::config::EngineConfig;

/// Used only if a configured buffer size does not fit in memory addressing.
const FALLBACK_BUFFER_LEN: usize = 8 * 1024;

/// Everything a task borrows from its coordinator.
#[derive(Debug, Clone)]
pub(crate) struct TaskShared {
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) client: HttpClient,
    pub(crate) semaphore: Arc<Semaphore>,
    pub(crate) registry: Arc<Registry>,
}

pub(crate) struct DownloadTask {
    record: DownloadRecord,
    url: Url,
    user_agent: Option<String>,
    token: CancellationToken,
    events: mpsc::Sender<Envelope>,
    shared: TaskShared,
    file_created: bool,
}

impl DownloadTask {
    pub(crate) fn new(
        record: DownloadRecord,
        url: Url,
        user_agent: Option<String>,
        token: CancellationToken,
        events: mpsc::Sender<Envelope>,
        shared: TaskShared,
    ) -> Self {
        Self {
            record,
            url,
            user_agent,
            token,
            events,
            shared,
            file_created: false,
        }
    }

    /// Runs the transfer to a terminal state.
    #[instrument(name = "download", skip_all, fields(id = self.record.id, url = %self.url))]
    pub(crate) async fn run(mut self) {
        let outcome = self.execute().await;
        self.finish(outcome).await;
    }

    async fn execute(&mut self) -> Result<(), DownloadError> {
        let semaphore = Arc::clone(&self.shared.semaphore);
        // Permit is dropped when this function returns (RAII).
        let _permit = tokio::select! {
            biased;
            () = self.token.cancelled() => return Err(DownloadError::Cancelled),
            permit = semaphore.acquire_owned() => {
                permit.map_err(|_| DownloadError::Cancelled)?
            }
        };
        debug!("acquired pool permit");

        let dir = self.shared.config.downloads_dir.clone();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DownloadError::file_system(&dir, e))?;

        let response = tokio::select! {
            biased;
            () = self.token.cancelled() => return Err(DownloadError::Cancelled),
            response = self.shared.client.send(&self.url, self.user_agent.as_deref()) => response?,
        };

        self.record.total_bytes = declared_length(&response);
        debug!(total = self.record.total_bytes, "connected");
        self.emit(DownloadEvent::SizeKnown(self.record.clone())).await;

        let path = self.record.destination_path.clone();
        let file = File::create(&path)
            .await
            .map_err(|e| DownloadError::file_system(&path, e))?;
        self.file_created = true;

        self.stream(response, file).await
    }

    async fn stream(
        &mut self,
        response: reqwest::Response,
        file: File,
    ) -> Result<(), DownloadError> {
        let config = Arc::clone(&self.shared.config);
        let total = self.record.total_bytes;
        let class = SizeClass::classify(total, &config);
        let buffer_len =
            usize::try_from(class.pick(&config.buffer_bytes)).unwrap_or(FALLBACK_BUFFER_LEN);
        let mut throttler = ProgressThrottler::for_transfer(&config, total, Instant::now());

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let mut reader = StreamReader::new(body);
        let mut writer = BufWriter::with_capacity(buffer_len, file);
        let mut buffer = vec![0u8; buffer_len];

        loop {
            if self.token.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            let read = tokio::select! {
                biased;
                () = self.token.cancelled() => return Err(DownloadError::Cancelled),
                read = reader.read(&mut buffer) => read.map_err(|e| DownloadError::transfer(&e))?,
            };
            if read == 0 {
                if total > 0 && self.record.transferred_bytes < total {
                    return Err(DownloadError::Transfer {
                        message: format!(
                            "connection closed after {} of {total} bytes",
                            self.record.transferred_bytes
                        ),
                    });
                }
                break;
            }

            let chunk = u64::try_from(read).unwrap_or(u64::MAX);
            let chunk_signed = i64::try_from(read).unwrap_or(i64::MAX);
            if total > 0 && self.record.transferred_bytes.saturating_add(chunk_signed) > total {
                return Err(DownloadError::Transfer {
                    message: format!("server sent more than the declared {total} bytes"),
                });
            }
            self.record.advance(chunk);
            let transferred = u64::try_from(self.record.transferred_bytes).unwrap_or_default();
            if throttler.should_report(Instant::now(), transferred, false) {
                self.emit(DownloadEvent::Progress(self.record.clone())).await;
            }

            writer
                .write_all(&buffer[..read])
                .await
                .map_err(|e| DownloadError::transfer(&e))?;
        }

        writer.flush().await.map_err(|e| DownloadError::transfer(&e))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| DownloadError::transfer(&e))?;

        let transferred = u64::try_from(self.record.transferred_bytes).unwrap_or_default();
        if throttler.should_report(Instant::now(), transferred, true) {
            self.emit(DownloadEvent::Progress(self.record.clone())).await;
        }
        Ok(())
    }

    async fn finish(mut self, outcome: Result<(), DownloadError>) {
        let path = self.record.destination_path.clone();
        let cancelled = self
            .shared
            .registry
            .retire(self.record.id, &self.token, &path);
        let outcome = if cancelled {
            Err(DownloadError::Cancelled)
        } else {
            outcome
        };

        match outcome {
            Ok(()) => {
                self.record.transition(DownloadStatus::Completed);
                info!(bytes = self.record.transferred_bytes, "download finished");
                self.emit(DownloadEvent::Completed(self.record.clone())).await;
            }
            Err(error) => {
                if self.file_created {
                    remove_partial_file(&path).await;
                }
                let status = if error.is_cancelled() {
                    DownloadStatus::Cancelled
                } else {
                    DownloadStatus::Failed
                };
                let message = error.to_string();
                debug!(error = %message, status = %status, "download ended without completing");
                self.record.transition(status);
                self.record.error_message = Some(message.clone());
                self.emit(DownloadEvent::Failed {
                    record: self.record.clone(),
                    error: message,
                })
                .await;
            }
        }
    }

    async fn emit(&self, event: DownloadEvent) {
        if self
            .events
            .send(Envelope::new(event, &self.token))
            .await
            .is_err()
        {
            debug!("event dispatcher is gone; dropping event");
        }
    }
}

/// Best-effort removal of a partial file; failures are logged, never raised.
async fn remove_partial_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial file"),
    }
}
