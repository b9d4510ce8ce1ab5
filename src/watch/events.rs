//! Domain events and their dispatcher
//!
//! The watch manager turns raw filesystem notifications into [`DomainEvent`]s
//! and hands them to an [`EventDispatcher`]. Listeners register either for a
//! single [`EventType`] or for every event (the `*` listener list).
//!
//! # Event Types
//!
//! - `config-change` - the watched config file was rewritten with valid JSON
//! - `log-added` / `log-change` / `log-removed` - `.log` files in a watched directory
//! - `project-config-change` - the project manifest was rewritten with valid JSON
//! - `custom-<name>-<fsEvent>` - activity on a runtime-registered target

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};

/// Filesystem activity reported for custom targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FsEvent {
    Add,
    Change,
    Unlink,
}

impl FsEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            FsEvent::Add => "add",
            FsEvent::Change => "change",
            FsEvent::Unlink => "unlink",
        }
    }
}

/// Closed set of event categories listeners can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    ConfigChange,
    LogAdded,
    LogChange,
    LogRemoved,
    ProjectConfigChange,
    /// Any event from a custom target
    Custom,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ConfigChange => "config-change",
            EventType::LogAdded => "log-added",
            EventType::LogChange => "log-change",
            EventType::LogRemoved => "log-removed",
            EventType::ProjectConfigChange => "project-config-change",
            EventType::Custom => "custom",
        }
    }
}

/// Typed event payloads
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    ConfigChange {
        path: PathBuf,
        filename: String,
        content: Value,
    },
    LogAdded {
        filename: String,
        path: PathBuf,
    },
    LogChange {
        filename: String,
        path: PathBuf,
        recent_content: String,
    },
    LogRemoved {
        filename: String,
    },
    ProjectConfigChange {
        path: PathBuf,
        filename: String,
        content: Value,
    },
    Custom {
        name: String,
        fs_event: FsEvent,
        path: PathBuf,
    },
}

/// An event emitted by the watch manager
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    pub payload: EventPayload,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl DomainEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn event_type(&self) -> EventType {
        match &self.payload {
            EventPayload::ConfigChange { .. } => EventType::ConfigChange,
            EventPayload::LogAdded { .. } => EventType::LogAdded,
            EventPayload::LogChange { .. } => EventType::LogChange,
            EventPayload::LogRemoved { .. } => EventType::LogRemoved,
            EventPayload::ProjectConfigChange { .. } => EventType::ProjectConfigChange,
            EventPayload::Custom { .. } => EventType::Custom,
        }
    }

    /// Wire name of the event, e.g. `log-added` or `custom-builds-change`
    pub fn type_name(&self) -> String {
        match &self.payload {
            EventPayload::Custom { name, fs_event, .. } => {
                format!("custom-{}-{}", name, fs_event.as_str())
            }
            _ => self.event_type().as_str().to_string(),
        }
    }

    /// JSON body carried in the `data` field of the outgoing envelope
    pub fn data(&self) -> Value {
        match &self.payload {
            EventPayload::ConfigChange {
                path,
                filename,
                content,
            }
            | EventPayload::ProjectConfigChange {
                path,
                filename,
                content,
            } => json!({
                "path": path.display().to_string(),
                "filename": filename,
                "content": content,
                "timestamp": self.timestamp,
            }),
            EventPayload::LogAdded { filename, path } => json!({
                "filename": filename,
                "path": path.display().to_string(),
                "timestamp": self.timestamp,
            }),
            EventPayload::LogChange {
                filename,
                path,
                recent_content,
            } => json!({
                "filename": filename,
                "path": path.display().to_string(),
                "recentContent": recent_content,
                "timestamp": self.timestamp,
            }),
            EventPayload::LogRemoved { filename } => json!({
                "filename": filename,
                "timestamp": self.timestamp,
            }),
            EventPayload::Custom {
                name,
                fs_event,
                path,
            } => json!({
                "name": name,
                "event": fs_event,
                "path": path.display().to_string(),
                "timestamp": self.timestamp,
            }),
        }
    }
}

/// Which events a listener receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFilter {
    Only(EventType),
    /// The `*` listener
    All,
}

/// Listener callback
pub type EventHandler = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

/// Token returned by [`EventDispatcher::on`], used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Per-type listener lists plus one catch-all list
#[derive(Default)]
pub struct EventDispatcher {
    typed: RwLock<HashMap<EventType, Vec<(HandlerId, EventHandler)>>>,
    wildcard: RwLock<Vec<(HandlerId, EventHandler)>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn on<F>(&self, filter: EventFilter, handler: F) -> HandlerId
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let handler: EventHandler = Arc::new(handler);
        match filter {
            EventFilter::Only(event_type) => {
                self.typed
                    .write()
                    .entry(event_type)
                    .or_default()
                    .push((id, handler));
            }
            EventFilter::All => self.wildcard.write().push((id, handler)),
        }
        id
    }

    /// Unregister a listener. Returns false if it was not registered.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut typed = self.typed.write();
        for handlers in typed.values_mut() {
            if let Some(pos) = handlers.iter().position(|(h, _)| *h == id) {
                handlers.remove(pos);
                return true;
            }
        }
        drop(typed);

        let mut wildcard = self.wildcard.write();
        if let Some(pos) = wildcard.iter().position(|(h, _)| *h == id) {
            wildcard.remove(pos);
            return true;
        }
        false
    }

    /// Dispatch to type-specific listeners, then `*` listeners.
    ///
    /// A panicking listener is logged and skipped; the remaining listeners
    /// still run. Returns the number of listeners that completed.
    pub fn emit(&self, event: &DomainEvent) -> usize {
        // Snapshot so listeners may call on/off without deadlocking
        let mut handlers: Vec<EventHandler> = self
            .typed
            .read()
            .get(&event.event_type())
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        handlers.extend(self.wildcard.read().iter().map(|(_, h)| Arc::clone(h)));

        let mut completed = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => completed += 1,
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(
                        "Event handler for {} panicked: {}",
                        event.type_name(),
                        reason
                    );
                }
            }
        }
        completed
    }

    pub fn listener_count(&self) -> usize {
        self.typed.read().values().map(Vec::len).sum::<usize>() + self.wildcard.read().len()
    }
}
