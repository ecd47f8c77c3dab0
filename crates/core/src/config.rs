use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpecWriterError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WriterConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_next_scan_timeout_secs")]
    pub next_scan_timeout_secs: u64,
    #[serde(default = "default_max_write_interval_ms")]
    pub max_write_interval_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_refresh_timeout_ms")]
    pub refresh_timeout_ms: u64,
    #[serde(default = "default_max_pending_points")]
    pub max_pending_points: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_next_scan_timeout_secs() -> u64 {
    2
}

fn default_max_write_interval_ms() -> u64 {
    1_000
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_refresh_timeout_ms() -> u64 {
    1_000
}

fn default_max_pending_points() -> usize {
    100_000
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            next_scan_timeout_secs: default_next_scan_timeout_secs(),
            max_write_interval_ms: default_max_write_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            refresh_timeout_ms: default_refresh_timeout_ms(),
            max_pending_points: default_max_pending_points(),
        }
    }
}

impl WriterConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            SpecWriterError::config(format!("failed to read config {}: {err}", path.display()))
        })?;
        let config: WriterConfig = serde_json::from_str(&text).map_err(|err| {
            SpecWriterError::config(format!("failed to parse config {}: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_pending_points == 0 {
            return Err(SpecWriterError::config("max_pending_points must be > 0"));
        }
        Ok(())
    }

    pub fn next_scan_timeout(&self) -> Duration {
        Duration::from_secs(self.next_scan_timeout_secs)
    }

    pub fn max_write_interval(&self) -> Duration {
        Duration::from_millis(self.max_write_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use super::WriterConfig;
    use crate::error::SpecWriterError;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("writer.json");
        fs::write(&path, r#"{"max_write_interval_ms": 250}"#).expect("write config");

        let config = WriterConfig::load(&path).expect("config loads");
        assert_eq!(config.max_write_interval(), Duration::from_millis(250));
        assert_eq!(config.next_scan_timeout(), Duration::from_secs(2));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn zero_pending_bound_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("writer.json");
        fs::write(&path, r#"{"max_pending_points": 0}"#).expect("write config");

        assert!(matches!(
            WriterConfig::load(&path),
            Err(SpecWriterError::Configuration(_))
        ));
    }
}
