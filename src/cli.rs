//! CLI argument definitions using clap
//!
//! Flags override values from the optional `--config` file, which in turn
//! override built-in defaults.

use std::path::PathBuf;

use clap::Parser;

use crate::config::DashboardConfig;
use crate::error::Result;

/// Real-time operations dashboard backend
#[derive(Parser, Debug, Default)]
#[command(name = "opswatch")]
#[command(about = "Watches config and log files and streams changes to dashboard clients over WebSocket")]
#[command(version)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, value_name = "PATH", env = "OPSWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "OPSWATCH_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "OPSWATCH_PORT")]
    pub port: Option<u16>,

    // ============================================
    // Watch targets
    // ============================================
    /// Config file whose changes are broadcast on the `config` channel
    #[arg(long, value_name = "PATH")]
    pub watch_config: Option<PathBuf>,

    /// Directory of `.log` files to track (repeatable)
    #[arg(long = "log-dir", value_name = "DIR")]
    pub log_dirs: Vec<PathBuf>,

    /// Project manifest to watch
    #[arg(long, value_name = "PATH")]
    pub project_config: Option<PathBuf>,

    /// Quiet period before a write counts as finished, in milliseconds
    #[arg(long, value_name = "MS")]
    pub settle_ms: Option<u64>,

    /// Lines of log tail included in log-change messages
    #[arg(long, value_name = "N")]
    pub tail_lines: Option<usize>,

    /// Emit events for files that already exist at startup
    #[arg(long)]
    pub no_ignore_initial: bool,

    // ============================================
    // Rate limiting
    // ============================================
    /// Normal-priority broadcasts admitted per second
    #[arg(long, value_name = "N")]
    pub max_messages_per_second: Option<u32>,

    /// Broadcasts allowed to wait for capacity before the oldest is dropped
    #[arg(long, value_name = "N")]
    pub burst_limit: Option<usize>,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Build the effective configuration
    pub fn into_config(self) -> Result<DashboardConfig> {
        let mut config = match &self.config {
            Some(path) => DashboardConfig::load(path)?,
            None => DashboardConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(path) = self.watch_config {
            config.watch.config_file = Some(path);
        }
        if !self.log_dirs.is_empty() {
            config.watch.log_dirs = self.log_dirs;
        }
        if let Some(path) = self.project_config {
            config.watch.project_config = Some(path);
        }
        if let Some(ms) = self.settle_ms {
            config.watch.settle_ms = ms;
        }
        if let Some(lines) = self.tail_lines {
            config.watch.tail_lines = lines;
        }
        if self.no_ignore_initial {
            config.watch.ignore_initial = false;
        }
        if let Some(max) = self.max_messages_per_second {
            config.rate_limit.max_messages_per_second = max;
        }
        if let Some(bound) = self.burst_limit {
            config.rate_limit.burst_limit = bound;
        }

        config.validate()?;
        Ok(config)
    }
}
