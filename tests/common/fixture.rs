//! Temp-dir fixture for watched files

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use opswatch::{DashboardConfig, WatchConfig};

/// A temp directory laid out like a small deployment:
///
/// ```text
/// <tmp>/settings.json
/// <tmp>/package.json
/// <tmp>/logs/
/// ```
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let fixture = Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        };
        fs::create_dir_all(fixture.logs_dir()).expect("Failed to create logs dir");
        fixture
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_file(&self) -> PathBuf {
        self.path().join("settings.json")
    }

    pub fn project_file(&self) -> PathBuf {
        self.path().join("package.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.path().join("logs")
    }

    /// Write a file relative to the fixture root, creating parents
    pub fn write(&self, relative_path: &str, content: &str) -> PathBuf {
        let full_path = self.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("Failed to write file");
        full_path
    }

    pub fn remove(&self, relative_path: &str) {
        fs::remove_file(self.path().join(relative_path)).expect("Failed to remove file");
    }

    /// Watch settings covering the config file, project file, and logs dir
    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            config_file: Some(self.config_file()),
            log_dirs: vec![self.logs_dir()],
            project_config: Some(self.project_file()),
            settle_ms: 50,
            ignore_initial: true,
            tail_lines: 5,
        }
    }

    /// Dashboard settings on an ephemeral port
    pub fn dashboard_config(&self) -> DashboardConfig {
        DashboardConfig {
            port: 0,
            watch: self.watch_config(),
            ..DashboardConfig::default()
        }
    }
}
