//! Watch target registry
//!
//! Named descriptors of the filesystem locations the dashboard follows. The
//! built-in targets use fixed names (`config`, `logs`, `projectConfig`);
//! custom targets are added and removed by name at runtime.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::WatchConfig;
use crate::error::{DashboardError, Result};

pub const CONFIG_TARGET: &str = "config";
pub const LOGS_TARGET: &str = "logs";
pub const PROJECT_CONFIG_TARGET: &str = "projectConfig";

/// What kind of location a target describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetKind {
    /// A single JSON config file
    Config,
    /// One or more directories of `.log` files
    Logs,
    /// The project manifest (JSON)
    ProjectConfig,
    /// A file or directory registered at runtime
    Custom,
}

/// A registered watch target. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchTarget {
    pub name: String,
    pub kind: TargetKind,
    pub paths: Vec<PathBuf>,
}

impl WatchTarget {
    pub fn config(path: PathBuf) -> Self {
        Self {
            name: CONFIG_TARGET.to_string(),
            kind: TargetKind::Config,
            paths: vec![path],
        }
    }

    pub fn logs(dirs: Vec<PathBuf>) -> Self {
        Self {
            name: LOGS_TARGET.to_string(),
            kind: TargetKind::Logs,
            paths: dirs,
        }
    }

    pub fn project_config(path: PathBuf) -> Self {
        Self {
            name: PROJECT_CONFIG_TARGET.to_string(),
            kind: TargetKind::ProjectConfig,
            paths: vec![path],
        }
    }

    pub fn custom(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            kind: TargetKind::Custom,
            paths: vec![path],
        }
    }
}

/// Ordered set of targets keyed by name
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<String, WatchTarget>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the built-in targets from a watch configuration
    pub fn from_config(config: &WatchConfig) -> Self {
        let mut registry = Self::new();
        if let Some(path) = &config.config_file {
            registry.insert(WatchTarget::config(path.clone()));
        }
        if !config.log_dirs.is_empty() {
            registry.insert(WatchTarget::logs(config.log_dirs.clone()));
        }
        if let Some(path) = &config.project_config {
            registry.insert(WatchTarget::project_config(path.clone()));
        }
        registry
    }

    fn insert(&mut self, target: WatchTarget) {
        self.targets.insert(target.name.clone(), target);
    }

    /// Register a target; names are unique
    pub fn register(&mut self, target: WatchTarget) -> Result<()> {
        if target.name.is_empty() {
            return Err(DashboardError::InvalidParams(
                "watch target name must not be empty".to_string(),
            ));
        }
        if self.targets.contains_key(&target.name) {
            return Err(DashboardError::TargetExists(target.name));
        }
        self.insert(target);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<WatchTarget> {
        self.targets.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&WatchTarget> {
        self.targets.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    /// Log directories from the `logs` target, if any
    pub fn log_dirs(&self) -> &[PathBuf] {
        self.targets
            .get(LOGS_TARGET)
            .map(|t| t.paths.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchTarget> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
