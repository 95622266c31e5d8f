//! SchedulerConfig - スケジューラの設定
//!
//! TOML のキーはすべて省略可能で、省略時は下のデフォルト値になる。
//!
//! ```toml
//! max_concurrent = 5
//! max_queue_size = 1000
//! default_timeout_ms = 30000
//! default_retries = 3
//! default_retry_delay_ms = 1000
//! cleanup_age_ms = 86400000
//! cleanup_interval_ms = 3600000
//! event_buffer = 256
//! persistence = false
//! ```
//!
//! # 検証
//! - `max_concurrent` / `max_queue_size` / `event_buffer` は 1 以上
//! - `cleanup_interval_ms` を指定するなら 0 より大きい値

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on queued instances running at once.
    pub max_concurrent: usize,
    pub max_queue_size: usize,
    pub default_timeout_ms: u64,
    pub default_retries: u32,
    pub default_retry_delay_ms: u64,
    /// Age after which terminal instances are removed by `cleanup(None)`.
    pub cleanup_age_ms: u64,
    /// When set, `start()` runs `cleanup(None)` on this period.
    pub cleanup_interval_ms: Option<u64>,
    /// Capacity of the broadcast channel behind `subscribe()`.
    pub event_buffer: usize,
    /// Accepted for compatibility; the scheduler keeps no persistent state.
    pub persistence: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            max_queue_size: 1000,
            default_timeout_ms: 30_000,
            default_retries: 3,
            default_retry_delay_ms: 1_000,
            cleanup_age_ms: 24 * 60 * 60 * 1000,
            cleanup_interval_ms: None,
            event_buffer: 256,
            persistence: false,
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: SchedulerConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid("max_concurrent must be at least 1".into()));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid("max_queue_size must be at least 1".into()));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid("event_buffer must be at least 1".into()));
        }
        if self.cleanup_interval_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "cleanup_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn default_retry_delay(&self) -> Duration {
        Duration::from_millis(self.default_retry_delay_ms)
    }

    pub fn cleanup_age(&self) -> Duration {
        Duration::from_millis(self.cleanup_age_ms)
    }

    pub fn cleanup_interval(&self) -> Option<Duration> {
        self.cleanup_interval_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = SchedulerConfig::from_toml_str("").unwrap();
        assert_eq!(config, SchedulerConfig::default());
        assert_eq!(config.cleanup_age(), Duration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn partial_toml_overrides_only_given_keys() {
        let config = SchedulerConfig::from_toml_str(
            r#"
            max_concurrent = 2
            cleanup_interval_ms = 60000
            "#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.cleanup_interval(), Some(Duration::from_secs(60)));
        assert_eq!(config.max_queue_size, 1000);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = SchedulerConfig::from_toml_str("max_concurrent = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = SchedulerConfig::from_toml_str("max_concurrent = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = SchedulerConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
