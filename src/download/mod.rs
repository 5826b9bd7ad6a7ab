//! Download engine: streams browser-initiated downloads to disk.
//!
//! # Features
//!
//! - Bounded worker pool (3 concurrent transfers by default)
//! - Cooperative cancellation checked once per buffer-sized read
//! - Throttled progress events with size-tiered byte thresholds
//! - Content-Disposition / URL / MIME based file naming with `" (n)"` dedup
//! - Partial files removed on every non-success path
//!
//! The entry point is [`DownloadCoordinator`]; hosts receive lifecycle events
//! through a [`DownloadObserver`].

mod client;
pub mod constants;
mod coordinator;
mod error;
mod events;
mod filename;
mod record;
mod registry;
mod task;
mod throttle;

pub use client::HttpClient;
pub use coordinator::{DownloadCoordinator, EngineError};
pub use error::DownloadError;
pub use events::{DownloadObserver, LoggingObserver};
pub use filename::{extension_from_mime, guess_file_name, mime_from_extension, unique_file_name};
pub use record::{DownloadRecord, DownloadStatus};
pub use throttle::{ProgressThrottler, SizeClass, is_reporting_point};
