//! Engine configuration.
//!
//! Every tuning constant of the engine (pool size, timeouts, throttling and
//! buffer tiers) lives in [`EngineConfig`]. Values can be loaded from a JSON
//! file; missing keys fall back to the defaults in
//! [`crate::download::constants`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::download::constants::{
    BUFFER_BYTES_LARGE, BUFFER_BYTES_MEDIUM, BUFFER_BYTES_SMALL, CLEANUP_GRACE_MS,
    CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY, EVENT_CAPACITY, LARGE_THRESHOLD_BYTES,
    MAX_CONCURRENCY, MEDIUM_THRESHOLD_BYTES, MIN_CONCURRENCY, PROGRESS_BYTES_LARGE,
    PROGRESS_BYTES_MEDIUM, PROGRESS_BYTES_SMALL, PROGRESS_INTERVAL_MS, READ_TIMEOUT_SECS,
};
use crate::user_agent::default_download_user_agent;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`EngineConfig`].
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A value is outside its allowed range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// One value per size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteTiers {
    /// Unknown size or up to the medium threshold.
    pub small: u64,
    /// Up to the large threshold.
    pub medium: u64,
    /// Above the large threshold.
    pub large: u64,
}

/// Tuning and wiring for a [`crate::DownloadCoordinator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory every download is written into.
    pub downloads_dir: PathBuf,
    /// Worker pool size.
    pub concurrency: usize,
    /// TCP/TLS connect timeout.
    pub connect_timeout_secs: u64,
    /// Timeout for each body read.
    pub read_timeout_secs: u64,
    /// Minimum time between progress events; zero reports every chunk.
    pub progress_interval_ms: u64,
    /// Bytes between progress events, per size class.
    pub progress_bytes: ByteTiers,
    /// Read buffer size, per size class.
    pub buffer_bytes: ByteTiers,
    /// Declared sizes above this use the medium tier.
    pub medium_threshold_bytes: u64,
    /// Declared sizes above this use the large tier.
    pub large_threshold_bytes: u64,
    /// Upper bound on how long `cleanup` waits for tasks.
    pub cleanup_grace_ms: u64,
    /// Capacity of the event queue.
    pub event_capacity: usize,
    /// User-Agent sent when the host does not supply one.
    pub default_user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from("downloads"),
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            progress_interval_ms: PROGRESS_INTERVAL_MS,
            progress_bytes: ByteTiers {
                small: PROGRESS_BYTES_SMALL,
                medium: PROGRESS_BYTES_MEDIUM,
                large: PROGRESS_BYTES_LARGE,
            },
            buffer_bytes: ByteTiers {
                small: BUFFER_BYTES_SMALL,
                medium: BUFFER_BYTES_MEDIUM,
                large: BUFFER_BYTES_LARGE,
            },
            medium_threshold_bytes: MEDIUM_THRESHOLD_BYTES,
            large_threshold_bytes: LARGE_THRESHOLD_BYTES,
            cleanup_grace_ms: CLEANUP_GRACE_MS,
            event_capacity: EVENT_CAPACITY,
            default_user_agent: default_download_user_agent(),
        }
    }
}

impl EngineConfig {
    /// Default configuration writing into `downloads_dir`.
    #[must_use]
    pub fn with_downloads_dir(downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloads_dir: downloads_dir.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from a JSON file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not valid JSON, or
    /// [`ConfigError::Invalid`] if a value fails validation.
    #[instrument(fields(path = %path.display()))]
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!(concurrency = config.concurrency, "loaded engine config");
        Ok(config)
    }

    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::invalid(
                "concurrency",
                format!(
                    "{} is outside {MIN_CONCURRENCY}..={MAX_CONCURRENCY}",
                    self.concurrency
                ),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::invalid("connect_timeout_secs", "must be > 0"));
        }
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::invalid("read_timeout_secs", "must be > 0"));
        }
        for (field, tiers) in [
            ("progress_bytes", self.progress_bytes),
            ("buffer_bytes", self.buffer_bytes),
        ] {
            if tiers.small == 0 || tiers.medium == 0 || tiers.large == 0 {
                return Err(ConfigError::invalid(field, "every tier must be > 0"));
            }
        }
        if self.medium_threshold_bytes > self.large_threshold_bytes {
            return Err(ConfigError::invalid(
                "medium_threshold_bytes",
                "must not exceed large_threshold_bytes",
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::invalid("event_capacity", "must be > 0"));
        }
        Ok(())
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Read timeout as a [`Duration`].
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Progress interval as a [`Duration`].
    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Cleanup grace period as a [`Duration`].
    #[must_use]
    pub fn cleanup_grace(&self) -> Duration {
        Duration::from_millis(self.cleanup_grace_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.progress_interval(), Duration::from_millis(200));
        assert_eq!(config.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.read_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = EngineConfig {
            concurrency: 0,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_validate_rejects_zero_buffer_tier() {
        let mut config = EngineConfig::default();
        config.buffer_bytes.medium = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("buffer_bytes"));
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let config = EngineConfig {
            medium_threshold_bytes: 10,
            large_threshold_bytes: 5,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_progress_interval_is_allowed() {
        let config = EngineConfig {
            progress_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_file_partial_keys_use_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("engine.json");
        std::fs::write(&path, r#"{"concurrency": 2, "downloads_dir": "/tmp/dl"}"#).unwrap();

        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.downloads_dir, PathBuf::from("/tmp/dl"));
        assert_eq!(config.progress_interval_ms, PROGRESS_INTERVAL_MS);
    }

    #[test]
    fn test_from_json_file_rejects_out_of_range_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("engine.json");
        std::fs::write(&path, r#"{"concurrency": 99}"#).unwrap();

        let err = EngineConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "concurrency",
                ..
            }
        ));
    }

    #[test]
    fn test_from_json_file_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = EngineConfig::from_json_file(&temp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_from_json_file_malformed_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("engine.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = EngineConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
