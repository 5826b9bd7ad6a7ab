//! Web Downloads Library
//!
//! Download engine for files discovered by a browser-like host: a page asks for
//! a URL, the engine transfers it into a downloads directory while reporting
//! progress, honoring cancellation and cleaning up after failure.
//!
//! # Architecture
//!
//! - [`download`] - coordinator, per-download tasks, throttling, file naming
//! - [`store`] - persistence seam ([`DownloadRepository`]) and its SQLite store
//! - [`db`] - SQLite connection pool and migrations
//! - [`config`] - engine tuning loaded from JSON

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod download;
pub mod store;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::{ByteTiers, ConfigError, EngineConfig};
pub use db::{Database, DbError};
pub use download::{
    DownloadCoordinator, DownloadError, DownloadObserver, DownloadRecord, DownloadStatus,
    EngineError, LoggingObserver, guess_file_name, mime_from_extension,
};
pub use store::{DownloadRepository, DownloadStore, StoreError};
