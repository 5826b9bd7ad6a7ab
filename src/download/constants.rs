//! Default tuning for the download engine (timeouts, pool size, throttling tiers).

/// Default HTTP connect timeout (15 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 15;

/// Default HTTP read timeout between body chunks (30 seconds).
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Default number of downloads allowed to transfer at once.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 16;

/// Minimum time between two progress events of one download.
pub const PROGRESS_INTERVAL_MS: u64 = 200;

/// Progress byte thresholds per size class.
pub const PROGRESS_BYTES_SMALL: u64 = 64 * 1024;
pub const PROGRESS_BYTES_MEDIUM: u64 = 256 * 1024;
pub const PROGRESS_BYTES_LARGE: u64 = 1024 * 1024;

/// Read buffer sizes per size class.
pub const BUFFER_BYTES_SMALL: u64 = 8 * 1024;
pub const BUFFER_BYTES_MEDIUM: u64 = 16 * 1024;
pub const BUFFER_BYTES_LARGE: u64 = 32 * 1024;

/// Declared sizes above this are at least `Medium`.
pub const MEDIUM_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

/// Declared sizes above this are `Large`.
pub const LARGE_THRESHOLD_BYTES: u64 = 100 * 1024 * 1024;

/// How long `cleanup` waits for in-flight tasks to observe cancellation.
pub const CLEANUP_GRACE_MS: u64 = 2000;

/// Capacity of the lifecycle event queue between tasks and the dispatcher.
pub const EVENT_CAPACITY: usize = 256;

/// Fixed failure message for cancelled downloads.
pub const CANCELLED_MESSAGE: &str = "Download cancelled";

/// File name used when neither the headers nor the URL yield one.
pub const FALLBACK_FILE_NAME: &str = "downloadfile";
