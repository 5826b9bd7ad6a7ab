//! Progress throttling.
//!
//! A download reports progress when enough time has passed, when enough bytes
//! arrived, or when the stream ended. The time threshold dominates for slow or
//! unknown-size transfers; the byte threshold bounds event volume for large
//! fast ones.

use std::time::{Duration, Instant};

use crate::config::{ByteTiers, EngineConfig};

/// Size class of a transfer, derived from its declared length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    /// Unknown size or up to the medium threshold.
    Small,
    /// Up to the large threshold.
    Medium,
    /// Above the large threshold.
    Large,
}

impl SizeClass {
    /// Classifies a declared total; zero or negative means unknown and is `Small`.
    #[must_use]
    pub fn classify(total_bytes: i64, config: &EngineConfig) -> Self {
        let Ok(total) = u64::try_from(total_bytes) else {
            return Self::Small;
        };
        if total > config.large_threshold_bytes {
            Self::Large
        } else if total > config.medium_threshold_bytes {
            Self::Medium
        } else {
            Self::Small
        }
    }

    /// Picks this class's value out of a tier table.
    #[must_use]
    pub fn pick(self, tiers: &ByteTiers) -> u64 {
        match self {
            Self::Small => tiers.small,
            Self::Medium => tiers.medium,
            Self::Large => tiers.large,
        }
    }
}

/// Decides whether a chunk boundary is a reporting point.
///
/// True when any of: `elapsed >= interval`, `bytes_since >= byte_threshold`,
/// or `stream_ended`.
#[must_use]
pub fn is_reporting_point(
    elapsed: Duration,
    bytes_since: u64,
    stream_ended: bool,
    interval: Duration,
    byte_threshold: u64,
) -> bool {
    stream_ended || elapsed >= interval || bytes_since >= byte_threshold
}

/// Tracks the last reported point of one download.
#[derive(Debug, Clone)]
pub struct ProgressThrottler {
    interval: Duration,
    byte_threshold: u64,
    last_report_at: Instant,
    last_report_bytes: u64,
}

impl ProgressThrottler {
    /// Creates a throttler whose reference point is `started_at` with zero bytes.
    #[must_use]
    pub fn new(interval: Duration, byte_threshold: u64, started_at: Instant) -> Self {
        Self {
            interval,
            byte_threshold,
            last_report_at: started_at,
            last_report_bytes: 0,
        }
    }

    /// Builds a throttler for a transfer of `total_bytes` from engine config.
    #[must_use]
    pub fn for_transfer(config: &EngineConfig, total_bytes: i64, started_at: Instant) -> Self {
        let class = SizeClass::classify(total_bytes, config);
        Self::new(
            config.progress_interval(),
            class.pick(&config.progress_bytes),
            started_at,
        )
    }

    /// Returns true if a progress event should be emitted for `transferred`
    /// bytes at `now`; a true result moves the reference point.
    pub fn should_report(&mut self, now: Instant, transferred: u64, stream_ended: bool) -> bool {
        let elapsed = now.saturating_duration_since(self.last_report_at);
        let bytes_since = transferred.saturating_sub(self.last_report_bytes);
        let report = is_reporting_point(
            elapsed,
            bytes_since,
            stream_ended,
            self.interval,
            self.byte_threshold,
        );
        if report {
            self.last_report_at = now;
            self.last_report_bytes = transferred;
        }
        report
    }

    /// Byte threshold in effect.
    #[must_use]
    pub fn byte_threshold(&self) -> u64 {
        self.byte_threshold
    }
}
