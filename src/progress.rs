//! Progress bars for `get` runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::Notify;
use tracing::debug;
use web_downloads::{DownloadObserver, DownloadRecord};

const BAR_TEMPLATE: &str =
    "{spinner} {prefix:.bold} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}";
const SPINNER_TEMPLATE: &str = "{spinner} {prefix:.bold} {bytes} ({bytes_per_sec}) {msg}";

/// One bar per download id, plus a count of finished downloads the CLI can
/// wait on.
pub(crate) struct ProgressObserver {
    multi: MultiProgress,
    bars: Mutex<HashMap<i64, ProgressBar>>,
    finished: AtomicUsize,
    failed: AtomicUsize,
    changed: Notify,
}

impl ProgressObserver {
    /// Draws to stderr, or nowhere when `hidden` (quiet mode, tests).
    pub(crate) fn new(hidden: bool) -> Self {
        let target = if hidden {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        };
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: Mutex::new(HashMap::new()),
            finished: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            changed: Notify::new(),
        }
    }

    /// Downloads that reached a terminal state.
    pub(crate) fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Downloads that ended failed or cancelled.
    pub(crate) fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Resolves once `expected` downloads have finished.
    pub(crate) async fn wait_for(&self, expected: usize) {
        while self.finished() < expected {
            self.changed.notified().await;
        }
    }

    fn bars(&self) -> MutexGuard<'_, HashMap<i64, ProgressBar>> {
        self.bars.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bar_for(&self, record: &DownloadRecord) -> ProgressBar {
        self.bars()
            .entry(record.id)
            .or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::no_length());
                bar.set_style(spinner_style());
                bar.set_prefix(record.file_name.clone());
                bar.enable_steady_tick(Duration::from_millis(120));
                bar
            })
            .clone()
    }

    fn take_bar(&self, record: &DownloadRecord) -> ProgressBar {
        let bar = self.bar_for(record);
        self.bars().remove(&record.id);
        bar
    }

    fn mark_finished(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
        // notify_one keeps a permit, so a wakeup between check and await is not lost.
        self.changed.notify_one();
    }
}

impl DownloadObserver for ProgressObserver {
    fn on_download_started(&self, record: &DownloadRecord) {
        let bar = self.bar_for(record);
        bar.set_message("waiting");
        debug!(id = record.id, file = %record.file_name, "bar created");
    }

    fn on_download_progress(&self, record: &DownloadRecord) {
        let bar = self.bar_for(record);
        let total = u64::try_from(record.total_bytes).unwrap_or(0);
        if total > 0 && bar.length() != Some(total) {
            bar.set_length(total);
            bar.set_style(bar_style());
        }
        bar.set_message("");
        bar.set_position(u64::try_from(record.transferred_bytes).unwrap_or(0));
    }

    fn on_download_completed(&self, record: &DownloadRecord) {
        let bar = self.take_bar(record);
        bar.set_position(u64::try_from(record.transferred_bytes).unwrap_or(0));
        bar.finish_with_message(format!("saved to {}", record.destination_path.display()));
        self.mark_finished();
    }

    fn on_download_failed(&self, record: &DownloadRecord, error: &str) {
        let bar = self.take_bar(record);
        bar.abandon_with_message(error.to_string());
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.mark_finished();
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
