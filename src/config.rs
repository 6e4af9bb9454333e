//! Runtime configuration, loaded from YAML

use crate::model::Limits;
use crate::storage::{QuotaThresholds, DEFAULT_CAPACITY_BYTES};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Top-level configuration. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub anchor: AnchorConfig,
    pub sync: SyncConfig,
    pub limits: Limits,
    /// Default tracing filter; `RUST_LOG` takes precedence
    pub log_filter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file; the platform data directory when unset
    pub db_path: Option<PathBuf>,
    pub capacity_bytes: u64,
    pub warn_percent: f64,
    pub critical_percent: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let thresholds = QuotaThresholds::default();
        Self {
            db_path: None,
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            warn_percent: thresholds.warn_percent,
            critical_percent: thresholds.critical_percent,
        }
    }
}

impl StorageConfig {
    pub fn thresholds(&self) -> QuotaThresholds {
        QuotaThresholds {
            warn_percent: self.warn_percent,
            critical_percent: self.critical_percent,
        }
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(default_db_path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    pub context_len: usize,
    pub max_exact_len: usize,
    pub debounce_ms: u64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            context_len: crate::anchor::DEFAULT_CONTEXT_LEN,
            max_exact_len: crate::anchor::DEFAULT_MAX_EXACT_LEN,
            debounce_ms: 500,
        }
    }
}

impl AnchorConfig {
    pub fn quote_options(&self) -> crate::anchor::QuoteOptions {
        crate::anchor::QuoteOptions {
            context_len: self.context_len,
            max_exact_len: self.max_exact_len,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub reconcile_interval_secs: u64,
    pub idle_timeout_secs: u64,
    /// `None` waits for the worker indefinitely
    pub request_timeout_secs: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 300,
            idle_timeout_secs: 30,
            request_timeout_secs: Some(30),
        }
    }
}

impl SyncConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(1))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(text) => Self::from_yaml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Filter used when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &str {
        if self.log_filter.trim().is_empty() {
            crate::logging::DEFAULT_FILTER
        } else {
            &self.log_filter
        }
    }
}

/// `<data dir>/pagenote/pagenote.db`, or the working directory if the
/// platform has no data directory
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pagenote")
        .join("pagenote.db")
}

/// `<config dir>/pagenote/config.yaml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pagenote")
        .join("config.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_missing_files_give_defaults() {
        assert_eq!(Config::from_yaml_str("").unwrap(), Config::default());
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load(dir.path().join("nope.yaml")).unwrap(), Config::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_yaml_str(
            r#"
storage:
  capacity_bytes: 2048
sync:
  request_timeout_secs: null
limits:
  max_comment_len: 20
log_filter: "pagenote=trace"
"#,
        )
        .unwrap();
        assert_eq!(config.storage.capacity_bytes, 2048);
        assert_eq!(config.storage.warn_percent, 75.0);
        assert_eq!(config.sync.request_timeout(), None);
        assert_eq!(config.sync.idle_timeout(), Duration::from_secs(30));
        assert_eq!(config.limits.max_comment_len, 20);
        assert_eq!(config.limits.max_url_len, 2048);
        assert_eq!(config.anchor.debounce(), Duration::from_millis(500));
        assert_eq!(config.log_filter(), "pagenote=trace");
    }

    #[test]
    fn bad_yaml_is_a_parse_error() {
        assert!(matches!(Config::from_yaml_str("storage: [1, 2"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sync:\n  reconcile_interval_secs: 60\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.sync.reconcile_interval(), Duration::from_secs(60));
        assert_eq!(config.log_filter(), crate::logging::DEFAULT_FILTER);
    }
}
