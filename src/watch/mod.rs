//! Filesystem side of the dashboard
//!
//! - `targets` - named watch targets (config file, log directories, project manifest, custom)
//! - `events` - typed domain events and the listener dispatcher
//! - `manager` - debounced watchers that emit domain events
//! - `tail` - last-N-lines reads for log payloads

pub mod events;
pub mod manager;
pub mod tail;
pub mod targets;

pub use events::{
    DomainEvent, EventDispatcher, EventFilter, EventHandler, EventPayload, EventType, FsEvent,
    HandlerId,
};
pub use manager::{read_json_file, WatchManager, WatchOptions, WatchStats};
pub use tail::read_tail;
pub use targets::{TargetKind, TargetRegistry, WatchTarget};
