//! Dashboard configuration
//!
//! Settings are read from a JSON file with camelCase keys. Every field has a
//! default, so an empty object (or no file at all) yields a usable config:
//!
//! ```json
//! {
//!   "port": 3001,
//!   "watch": { "configFile": "./settings.json", "logDirs": ["./logs"] },
//!   "rateLimit": { "maxMessagesPerSecond": 20, "burstLimit": 100 }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DashboardError, Result};

/// Top-level configuration for the dashboard server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardConfig {
    /// Host to bind the socket server to
    pub host: String,
    /// Port to listen on (0 picks a free port)
    pub port: u16,
    /// Filesystem locations to watch
    pub watch: WatchConfig,
    /// Broadcast admission control
    pub rate_limit: RateLimitConfig,
    /// Outbound frames buffered per client before messages are dropped for it
    pub client_buffer_size: usize,
    /// Per-frame socket write timeout in milliseconds
    pub write_timeout_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            watch: WatchConfig::default(),
            rate_limit: RateLimitConfig::default(),
            client_buffer_size: 256,
            write_timeout_ms: 5000,
        }
    }
}

/// What to watch and how to settle writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchConfig {
    /// JSON config file whose changes are broadcast on the `config` channel
    pub config_file: Option<PathBuf>,
    /// Directories whose `.log` files are tracked
    pub log_dirs: Vec<PathBuf>,
    /// Project manifest (JSON) whose changes are broadcast on the `config` channel
    pub project_config: Option<PathBuf>,
    /// Quiet period before a write is considered finished, in milliseconds
    pub settle_ms: u64,
    /// Suppress events for files that already exist when watching begins
    pub ignore_initial: bool,
    /// Lines read from the end of a log file for `log-change` payloads
    pub tail_lines: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            log_dirs: Vec::new(),
            project_config: None,
            settle_ms: 100,
            ignore_initial: true,
            tail_lines: 20,
        }
    }
}

impl WatchConfig {
    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Fixed-window rate limiting parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitConfig {
    /// Messages admitted per window
    pub max_messages_per_second: u32,
    /// Queued messages allowed to wait for capacity; older ones are dropped beyond this
    pub burst_limit: usize,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_messages_per_second: 20,
            burst_limit: 100,
            window_ms: 1000,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl DashboardConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DashboardError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            DashboardError::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.max_messages_per_second == 0 {
            return Err(DashboardError::Config(
                "rateLimit.maxMessagesPerSecond must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.burst_limit == 0 {
            return Err(DashboardError::Config(
                "rateLimit.burstLimit must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.window_ms == 0 {
            return Err(DashboardError::Config(
                "rateLimit.windowMs must be greater than zero".to_string(),
            ));
        }
        if self.watch.tail_lines == 0 {
            return Err(DashboardError::Config(
                "watch.tailLines must be greater than zero".to_string(),
            ));
        }
        if self.client_buffer_size == 0 {
            return Err(DashboardError::Config(
                "clientBufferSize must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DashboardConfig::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.rate_limit.max_messages_per_second, 20);
        assert_eq!(config.rate_limit.window(), Duration::from_secs(1));
        assert!(config.watch.ignore_initial);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{"port": 4000, "watch": {"logDirs": ["/var/log/app"]}, "rateLimit": {"burstLimit": 5}}"#;
        let config: DashboardConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.watch.log_dirs, vec![PathBuf::from("/var/log/app")]);
        assert_eq!(config.watch.tail_lines, 20);
        assert_eq!(config.rate_limit.burst_limit, 5);
        assert_eq!(config.rate_limit.max_messages_per_second, 20);
    }

    #[test]
    fn test_validate_rejects_zero_rate() {
        let mut config = DashboardConfig::default();
        config.rate_limit.max_messages_per_second = 0;
        assert!(matches!(config.validate(), Err(DashboardError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_burst_limit() {
        let mut config = DashboardConfig::default();
        config.rate_limit.burst_limit = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("burstLimit"));

        let json = r#"{"rateLimit": {"burstLimit": 0}}"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opswatch.json");
        std::fs::write(&path, json).unwrap();
        assert!(matches!(DashboardConfig::load(&path), Err(DashboardError::Config(_))));
    }

    #[test]
    fn test_load_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opswatch.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = DashboardConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("cannot parse"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opswatch.json");
        std::fs::write(&path, r#"{"host": "0.0.0.0", "writeTimeoutMs": 250}"#).unwrap();
        let config = DashboardConfig::load(&path).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.write_timeout(), Duration::from_millis(250));
    }
}
