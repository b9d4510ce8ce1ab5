//! opswatch: real-time operations dashboard backend
//!
//! Watches configuration files and log directories, turns filesystem changes
//! into typed domain events, and streams them to WebSocket clients that
//! subscribe to named channels. Clients can also issue requests (stats,
//! config, recent logs) over the same socket.
//!
//! # Example
//!
//! ```ignore
//! use opswatch::{DashboardConfig, DashboardServer};
//!
//! let mut config = DashboardConfig::default();
//! config.watch.log_dirs.push("./logs".into());
//!
//! let server = DashboardServer::new(config)?;
//! let addr = server.start().await?;
//! println!("listening on ws://{}", addr);
//! ```

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod socket_server;
pub mod watch;

pub use cli::Cli;
pub use config::{DashboardConfig, RateLimitConfig, WatchConfig};
pub use dashboard::{BroadcastResult, DashboardServer, DashboardStats};
pub use error::{DashboardError, Result};
pub use socket_server::{ErrorCode, Message, MessageType, Priority, SocketServer};
pub use watch::{DomainEvent, EventFilter, EventPayload, EventType, WatchManager};
