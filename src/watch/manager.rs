//! File watcher manager
//!
//! Owns one debounced `notify` watcher per registered target and turns the
//! settled notifications into [`DomainEvent`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐
//! │   notify    │────>│  debouncer  │────>│  processor  │────>│ EventDispatcher │
//! │   watcher   │     │  (settle)   │     │ (per target)│     │  typed + '*'    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────────┘
//! ```
//!
//! The debouncer only reports that a path settled, so each processor keeps
//! the set of files it has seen and classifies a settled path as added,
//! changed, or removed by comparing against that set and the disk.

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, Debouncer};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::WatchConfig;
use crate::error::{DashboardError, Result};

use super::events::{
    DomainEvent, EventDispatcher, EventFilter, EventPayload, EventType, FsEvent, HandlerId,
};
use super::tail::read_tail;
use super::targets::{TargetKind, TargetRegistry, WatchTarget};

/// Watcher behaviour shared by every target
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Quiet period before a write counts as finished
    pub settle_window: Duration,
    /// Do not report files that already exist when a target is attached
    pub ignore_initial: bool,
    /// Lines included in `log-change` payloads
    pub tail_lines: usize,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from(&WatchConfig::default())
    }
}

impl From<&WatchConfig> for WatchOptions {
    fn from(config: &WatchConfig) -> Self {
        Self {
            settle_window: config.settle_window(),
            ignore_initial: config.ignore_initial,
            tail_lines: config.tail_lines,
        }
    }
}

/// Event counters. Only [`WatchManager::reset_stats`] lowers them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchStats {
    pub total_events: u64,
    pub config_changes: u64,
    pub log_added: u64,
    pub log_changes: u64,
    pub log_removed: u64,
    pub project_config_changes: u64,
    pub custom_events: u64,
    pub last_event: Option<i64>,
}

impl WatchStats {
    fn record(&mut self, event: &DomainEvent) {
        self.total_events += 1;
        match event.event_type() {
            EventType::ConfigChange => self.config_changes += 1,
            EventType::LogAdded => self.log_added += 1,
            EventType::LogChange => self.log_changes += 1,
            EventType::LogRemoved => self.log_removed += 1,
            EventType::ProjectConfigChange => self.project_config_changes += 1,
            EventType::Custom => self.custom_events += 1,
        }
        self.last_event = Some(event.timestamp);
    }
}

/// State reachable from the processing threads
#[derive(Default)]
struct Shared {
    dispatcher: EventDispatcher,
    stats: Mutex<WatchStats>,
}

impl Shared {
    fn emit(&self, event: &DomainEvent) {
        self.stats.lock().record(event);
        tracing::debug!("[WATCH] Emitting {}", event.type_name());
        self.dispatcher.emit(event);
    }
}

/// Watches the registered targets and dispatches domain events
pub struct WatchManager {
    options: WatchOptions,
    targets: RwLock<TargetRegistry>,
    watchers: Mutex<HashMap<String, TargetWatcher>>,
    active: AtomicBool,
    shared: Arc<Shared>,
}

impl WatchManager {
    /// Create a manager for the built-in targets described by `config`
    pub fn new(config: &WatchConfig) -> Self {
        Self::with_targets(TargetRegistry::from_config(config), WatchOptions::from(config))
    }

    pub fn with_targets(targets: TargetRegistry, options: WatchOptions) -> Self {
        Self {
            options,
            targets: RwLock::new(targets),
            watchers: Mutex::new(HashMap::new()),
            active: AtomicBool::new(false),
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Attach watchers for every registered target. No-op when already active.
    ///
    /// Targets that cannot be watched (for example a missing directory) are
    /// logged and skipped.
    pub fn start(&self) {
        if self.active.swap(true, Ordering::SeqCst) {
            tracing::debug!("Watch manager already active");
            return;
        }

        let targets: Vec<WatchTarget> = self.targets.read().iter().cloned().collect();
        let mut initial = Vec::new();
        {
            let mut watchers = self.watchers.lock();
            for target in targets {
                match TargetWatcher::attach(&target, &self.options, Arc::clone(&self.shared)) {
                    Ok((watcher, events)) => {
                        watchers.insert(target.name.clone(), watcher);
                        initial.extend(events);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to watch target '{}': {}", target.name, e);
                    }
                }
            }
            tracing::info!("Watch manager started with {} watcher(s)", watchers.len());
        }

        for event in &initial {
            self.shared.emit(event);
        }
    }

    /// Detach every watcher. No-op when already inactive.
    ///
    /// Returns after all processing threads have exited, so no event is
    /// dispatched once this returns.
    pub fn stop(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let watchers: Vec<TargetWatcher> = self.watchers.lock().drain().map(|(_, w)| w).collect();
        let count = watchers.len();
        drop(watchers);
        tracing::info!("Watch manager stopped ({} watcher(s) detached)", count);
    }

    /// Register a custom target and, when active, start watching it
    pub fn add_custom_watch(&self, name: &str, path: impl Into<PathBuf>) -> Result<()> {
        let target = WatchTarget::custom(name, path.into());
        self.targets.write().register(target.clone())?;

        if !self.is_active() {
            return Ok(());
        }

        match TargetWatcher::attach(&target, &self.options, Arc::clone(&self.shared)) {
            Ok((watcher, initial)) => {
                self.watchers.lock().insert(target.name.clone(), watcher);
                tracing::info!("Watching custom target '{}'", name);
                for event in &initial {
                    self.shared.emit(event);
                }
                Ok(())
            }
            Err(e) => {
                self.targets.write().remove(name);
                Err(e)
            }
        }
    }

    /// Unregister a custom target and detach its watcher
    pub fn remove_custom_watch(&self, name: &str) -> Result<()> {
        {
            let mut targets = self.targets.write();
            match targets.get(name) {
                Some(t) if t.kind == TargetKind::Custom => {
                    targets.remove(name);
                }
                _ => return Err(DashboardError::UnknownTarget(name.to_string())),
            }
        }
        let removed = self.watchers.lock().remove(name);
        drop(removed);
        tracing::info!("Stopped watching custom target '{}'", name);
        Ok(())
    }

    /// Register a listener; see [`EventDispatcher::on`]
    pub fn on<F>(&self, filter: EventFilter, handler: F) -> HandlerId
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        self.shared.dispatcher.on(filter, handler)
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.shared.dispatcher.off(id)
    }

    /// Record and dispatch an event
    pub fn emit_event(&self, event: &DomainEvent) {
        self.shared.emit(event);
    }

    pub fn stats(&self) -> WatchStats {
        self.shared.stats.lock().clone()
    }

    pub fn reset_stats(&self) {
        *self.shared.stats.lock() = WatchStats::default();
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    /// Number of attached watchers (always zero while inactive)
    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }

    /// Registered targets, cloned
    pub fn targets(&self) -> TargetRegistry {
        self.targets.read().clone()
    }

    /// Status report served to dashboard clients
    pub fn status(&self) -> Value {
        let watching: HashSet<String> = self.watchers.lock().keys().cloned().collect();
        let targets: Vec<Value> = self
            .targets
            .read()
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "kind": t.kind,
                    "paths": t.paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
                    "watching": watching.contains(&t.name),
                })
            })
            .collect();

        json!({
            "isActive": self.is_active(),
            "watcherCount": watching.len(),
            "targets": targets,
            "settleMs": self.options.settle_window.as_millis() as u64,
            "ignoreInitial": self.options.ignore_initial,
            "stats": self.stats(),
        })
    }
}

impl Drop for WatchManager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read and parse a JSON file, `None` on any failure
pub fn read_json_file(path: &Path) -> Option<Value> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!("Cannot read {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!("Ignoring unparseable JSON in {}: {}", path.display(), e);
            None
        }
    }
}

// ============================================================================
// Per-target watcher
// ============================================================================

/// A running debouncer plus the thread that processes its output
struct TargetWatcher {
    running: Arc<AtomicBool>,
    debouncer: Option<Debouncer<RecommendedWatcher>>,
    thread: Option<JoinHandle<()>>,
}

impl TargetWatcher {
    fn attach(
        target: &WatchTarget,
        options: &WatchOptions,
        shared: Arc<Shared>,
    ) -> Result<(Self, Vec<DomainEvent>)> {
        let (mut processor, specs) = Processor::for_target(target, options)?;
        let initial = if options.ignore_initial {
            Vec::new()
        } else {
            processor.initial_events()
        };

        let (tx, rx) = std::sync::mpsc::channel();
        let first_path = specs
            .first()
            .map(|(p, _)| p.clone())
            .unwrap_or_default();
        let mut debouncer =
            new_debouncer(options.settle_window, tx).map_err(|e| DashboardError::watch(&first_path, e))?;
        for (path, mode) in &specs {
            debouncer
                .watcher()
                .watch(path, *mode)
                .map_err(|e| DashboardError::watch(path, e))?;
        }

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let name = target.name.clone();
        let thread = std::thread::Builder::new()
            .name(format!("opswatch-{}", name))
            .spawn(move || {
                while thread_running.load(Ordering::SeqCst) {
                    match rx.recv_timeout(Duration::from_millis(100)) {
                        Ok(Ok(events)) => {
                            for event in events {
                                if !thread_running.load(Ordering::SeqCst) {
                                    break;
                                }
                                if let Some(domain_event) = processor.handle(&event.path) {
                                    shared.emit(&domain_event);
                                }
                            }
                        }
                        Ok(Err(e)) => {
                            tracing::error!("[WATCH] Watcher error on '{}': {:?}", name, e);
                        }
                        Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                        Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!("[WATCH] Processing thread for '{}' exited", name);
            })?;

        tracing::debug!("[WATCH] Attached '{}' ({} path(s))", target.name, specs.len());
        Ok((
            Self {
                running,
                debouncer: Some(debouncer),
                thread: Some(thread),
            },
            initial,
        ))
    }
}

impl Drop for TargetWatcher {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        drop(self.debouncer.take());
        if let Some(thread) = self.thread.take() {
            // A listener stopping the manager from inside its own dispatch
            // cannot wait for itself
            if thread.thread().id() != std::thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

// ============================================================================
// Event classification
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonKind {
    Config,
    ProjectConfig,
}

/// Turns settled paths into domain events for one target
#[derive(Debug)]
enum Processor {
    JsonFile {
        kind: JsonKind,
        path: PathBuf,
        file_name: OsString,
    },
    LogDirs {
        dirs: Vec<PathBuf>,
        known: HashSet<PathBuf>,
        tail_lines: usize,
    },
    Custom {
        name: String,
        root: PathBuf,
        file_name: Option<OsString>,
        known: HashSet<PathBuf>,
    },
}

impl Processor {
    /// Build the processor and the list of paths to hand to notify
    fn for_target(
        target: &WatchTarget,
        options: &WatchOptions,
    ) -> Result<(Self, Vec<(PathBuf, RecursiveMode)>)> {
        match target.kind {
            TargetKind::Config | TargetKind::ProjectConfig => {
                let configured = target.paths.first().ok_or_else(|| {
                    DashboardError::InvalidParams(format!("target '{}' has no path", target.name))
                })?;
                let (parent, file_name) = split_file_path(configured)?;
                let kind = if target.kind == TargetKind::Config {
                    JsonKind::Config
                } else {
                    JsonKind::ProjectConfig
                };
                let processor = Processor::JsonFile {
                    kind,
                    path: parent.join(&file_name),
                    file_name,
                };
                Ok((processor, vec![(parent, RecursiveMode::NonRecursive)]))
            }
            TargetKind::Logs => {
                let mut dirs = Vec::new();
                for dir in &target.paths {
                    match dir.canonicalize() {
                        Ok(canonical) if canonical.is_dir() => dirs.push(canonical),
                        Ok(_) => tracing::warn!("Log path {} is not a directory", dir.display()),
                        Err(e) => tracing::warn!("Skipping log directory {}: {}", dir.display(), e),
                    }
                }
                if dirs.is_empty() {
                    return Err(DashboardError::Watch {
                        path: target
                            .paths
                            .iter()
                            .map(|p| p.display().to_string())
                            .collect::<Vec<_>>()
                            .join(", "),
                        message: "no watchable log directory".to_string(),
                    });
                }
                let known = dirs
                    .iter()
                    .flat_map(|dir| list_files(dir, false))
                    .filter(|p| is_log_file(p))
                    .collect();
                let specs = dirs
                    .iter()
                    .map(|d| (d.clone(), RecursiveMode::NonRecursive))
                    .collect();
                Ok((
                    Processor::LogDirs {
                        dirs,
                        known,
                        tail_lines: options.tail_lines,
                    },
                    specs,
                ))
            }
            TargetKind::Custom => {
                let configured = target.paths.first().ok_or_else(|| {
                    DashboardError::InvalidParams(format!("target '{}' has no path", target.name))
                })?;
                let root = configured
                    .canonicalize()
                    .map_err(|e| DashboardError::watch(configured, e))?;
                if root.is_dir() {
                    let known = list_files(&root, true).into_iter().collect();
                    let processor = Processor::Custom {
                        name: target.name.clone(),
                        root: root.clone(),
                        file_name: None,
                        known,
                    };
                    Ok((processor, vec![(root, RecursiveMode::Recursive)]))
                } else {
                    let (parent, file_name) = split_file_path(&root)?;
                    let known = std::iter::once(root.clone()).collect();
                    let processor = Processor::Custom {
                        name: target.name.clone(),
                        root,
                        file_name: Some(file_name),
                        known,
                    };
                    Ok((processor, vec![(parent, RecursiveMode::NonRecursive)]))
                }
            }
        }
    }

    /// Events for files already present when the target is attached
    fn initial_events(&self) -> Vec<DomainEvent> {
        match self {
            Processor::JsonFile { .. } => self.json_event().into_iter().collect(),
            Processor::LogDirs { known, .. } => {
                let mut paths: Vec<&PathBuf> = known.iter().collect();
                paths.sort();
                paths
                    .into_iter()
                    .map(|p| {
                        DomainEvent::new(EventPayload::LogAdded {
                            filename: file_name_of(p),
                            path: p.clone(),
                        })
                    })
                    .collect()
            }
            Processor::Custom { name, known, .. } => {
                let mut paths: Vec<&PathBuf> = known.iter().collect();
                paths.sort();
                paths
                    .into_iter()
                    .map(|p| {
                        DomainEvent::new(EventPayload::Custom {
                            name: name.clone(),
                            fs_event: FsEvent::Add,
                            path: p.clone(),
                        })
                    })
                    .collect()
            }
        }
    }

    /// Classify one settled path
    fn handle(&mut self, path: &Path) -> Option<DomainEvent> {
        match self {
            Processor::JsonFile { file_name, .. } => {
                if path.file_name() != Some(file_name.as_os_str()) {
                    return None;
                }
                self.json_event()
            }
            Processor::LogDirs {
                dirs,
                known,
                tail_lines,
            } => {
                if !is_log_file(path) {
                    return None;
                }
                let parent = path.parent()?;
                if !dirs.iter().any(|d| d == parent) {
                    return None;
                }
                let filename = file_name_of(path);
                if path.is_file() {
                    if known.insert(path.to_path_buf()) {
                        Some(DomainEvent::new(EventPayload::LogAdded {
                            filename,
                            path: path.to_path_buf(),
                        }))
                    } else {
                        Some(DomainEvent::new(EventPayload::LogChange {
                            filename,
                            path: path.to_path_buf(),
                            recent_content: read_tail(path, *tail_lines),
                        }))
                    }
                } else if !path.exists() && known.remove(path) {
                    Some(DomainEvent::new(EventPayload::LogRemoved { filename }))
                } else {
                    None
                }
            }
            Processor::Custom {
                name,
                root,
                file_name,
                known,
            } => {
                match file_name {
                    Some(file_name) => {
                        if path.file_name() != Some(file_name.as_os_str()) {
                            return None;
                        }
                    }
                    None => {
                        if !path.starts_with(root.as_path()) || path == root.as_path() {
                            return None;
                        }
                    }
                }
                let fs_event = if path.is_file() {
                    if known.insert(path.to_path_buf()) {
                        FsEvent::Add
                    } else {
                        FsEvent::Change
                    }
                } else if !path.exists() && known.remove(path) {
                    FsEvent::Unlink
                } else {
                    return None;
                };
                Some(DomainEvent::new(EventPayload::Custom {
                    name: name.clone(),
                    fs_event,
                    path: path.to_path_buf(),
                }))
            }
        }
    }

    /// Parse the watched JSON file; malformed or missing content yields nothing
    fn json_event(&self) -> Option<DomainEvent> {
        let Processor::JsonFile {
            kind,
            path,
            file_name,
        } = self
        else {
            return None;
        };
        let content = read_json_file(path)?;
        let filename = file_name.to_string_lossy().to_string();
        let payload = match kind {
            JsonKind::Config => EventPayload::ConfigChange {
                path: path.clone(),
                filename,
                content,
            },
            JsonKind::ProjectConfig => EventPayload::ProjectConfigChange {
                path: path.clone(),
                filename,
                content,
            },
        };
        Some(DomainEvent::new(payload))
    }
}

/// Canonical parent directory and file name of a file path
fn split_file_path(path: &Path) -> Result<(PathBuf, OsString)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| DashboardError::watch(path, "path has no file name"))?
        .to_os_string();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let parent = parent
        .canonicalize()
        .map_err(|e| DashboardError::watch(&parent, e))?;
    Ok((parent, file_name))
}

fn is_log_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("log")
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Regular files under `dir`, optionally descending into subdirectories
fn list_files(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Cannot list {}: {}", current.display(), e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else if path.is_file() {
                files.push(path);
            }
        }
    }
    files
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn log_processor(dir: &Path) -> Processor {
        let target = WatchTarget::logs(vec![dir.to_path_buf()]);
        Processor::for_target(&target, &WatchOptions::default()).unwrap().0
    }

    #[test]
    fn test_start_stop_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = WatchConfig {
            log_dirs: vec![dir.path().to_path_buf()],
            ..Default::default()
        };
        let manager = WatchManager::new(&config);

        manager.start();
        manager.start();
        assert!(manager.is_active());
        assert_eq!(manager.watcher_count(), 1);

        manager.stop();
        manager.stop();
        assert!(!manager.is_active());
        assert_eq!(manager.watcher_count(), 0);

        manager.start();
        assert!(manager.is_active());
        assert_eq!(manager.watcher_count(), 1);
    }

    #[test]
    fn test_missing_directory_is_skipped() {
        let config = WatchConfig {
            log_dirs: vec![PathBuf::from("/nonexistent/opswatch/logs")],
            ..Default::default()
        };
        let manager = WatchManager::new(&config);
        manager.start();
        assert!(manager.is_active());
        assert_eq!(manager.watcher_count(), 0);
        assert_eq!(manager.status()["targets"][0]["watching"], false);
    }

    #[test]
    fn test_log_processor_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut processor = log_processor(&root);
        let path = root.join("app.log");

        std::fs::write(&path, "booted\n").unwrap();
        let added = processor.handle(&path).unwrap();
        assert_eq!(added.type_name(), "log-added");

        std::fs::write(&path, "booted\nrequest served\n").unwrap();
        let changed = processor.handle(&path).unwrap();
        match changed.payload {
            EventPayload::LogChange { recent_content, .. } => {
                assert!(recent_content.contains("request served"));
            }
            other => panic!("Expected LogChange, got {:?}", other),
        }

        std::fs::remove_file(&path).unwrap();
        let removed = processor.handle(&path).unwrap();
        assert_eq!(removed.type_name(), "log-removed");
        assert!(processor.handle(&path).is_none());
    }

    #[test]
    fn test_log_processor_ignores_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut processor = log_processor(&root);
        let path = root.join("notes.txt");
        std::fs::write(&path, "hello").unwrap();
        assert!(processor.handle(&path).is_none());
    }

    #[test]
    fn test_existing_logs_are_known() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("old.log"), "x\n").unwrap();

        let mut processor = log_processor(&root);
        assert_eq!(processor.initial_events().len(), 1);

        std::fs::write(root.join("old.log"), "x\ny\n").unwrap();
        let event = processor.handle(&root.join("old.log")).unwrap();
        assert_eq!(event.type_name(), "log-change");
    }

    #[test]
    fn test_config_processor_skips_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"theme": "dark"}"#).unwrap();

        let target = WatchTarget::config(path.clone());
        let (mut processor, specs) =
            Processor::for_target(&target, &WatchOptions::default()).unwrap();
        assert_eq!(specs.len(), 1);

        let canonical = dir.path().canonicalize().unwrap().join("settings.json");
        let event = processor.handle(&canonical).unwrap();
        match &event.payload {
            EventPayload::ConfigChange {
                content, filename, ..
            } => {
                assert_eq!(content["theme"], "dark");
                assert_eq!(filename, "settings.json");
            }
            other => panic!("Expected ConfigChange, got {:?}", other),
        }

        std::fs::write(&path, r#"{"theme": "#).unwrap();
        assert!(processor.handle(&canonical).is_none());

        let sibling = dir.path().canonicalize().unwrap().join("other.json");
        std::fs::write(&sibling, "{}").unwrap();
        assert!(processor.handle(&sibling).is_none());
    }

    #[test]
    fn test_custom_processor_names_fs_events() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let target = WatchTarget::custom("builds", root.clone());
        let (mut processor, _) = Processor::for_target(&target, &WatchOptions::default()).unwrap();

        let artifact = root.join("out.bin");
        std::fs::write(&artifact, [1u8, 2, 3]).unwrap();
        assert_eq!(
            processor.handle(&artifact).unwrap().type_name(),
            "custom-builds-add"
        );
        std::fs::write(&artifact, [4u8]).unwrap();
        assert_eq!(
            processor.handle(&artifact).unwrap().type_name(),
            "custom-builds-change"
        );
        std::fs::remove_file(&artifact).unwrap();
        assert_eq!(
            processor.handle(&artifact).unwrap().type_name(),
            "custom-builds-unlink"
        );
    }

    #[test]
    fn test_custom_watch_registration() {
        let dir = tempfile::tempdir().unwrap();
        let manager = WatchManager::with_targets(TargetRegistry::new(), WatchOptions::default());
        manager.start();

        manager.add_custom_watch("scratch", dir.path()).unwrap();
        assert_eq!(manager.watcher_count(), 1);
        assert!(matches!(
            manager.add_custom_watch("scratch", dir.path()),
            Err(DashboardError::TargetExists(_))
        ));

        manager.remove_custom_watch("scratch").unwrap();
        assert_eq!(manager.watcher_count(), 0);
        assert!(matches!(
            manager.remove_custom_watch("scratch"),
            Err(DashboardError::UnknownTarget(_))
        ));
    }

    #[test]
    fn test_add_custom_watch_missing_path_is_rolled_back() {
        let manager = WatchManager::with_targets(TargetRegistry::new(), WatchOptions::default());
        manager.start();
        assert!(manager
            .add_custom_watch("ghost", "/nonexistent/opswatch/ghost")
            .is_err());
        assert!(!manager.targets().contains("ghost"));
    }

    #[test]
    fn test_emit_event_updates_stats_and_listeners() {
        let manager = WatchManager::with_targets(TargetRegistry::new(), WatchOptions::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        manager.on(EventFilter::All, move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        manager.emit_event(&DomainEvent::new(EventPayload::LogRemoved {
            filename: "a.log".to_string(),
        }));

        let stats = manager.stats();
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.log_removed, 1);
        assert!(stats.last_event.is_some());
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        manager.reset_stats();
        assert_eq!(manager.stats(), WatchStats::default());
    }
}
