//! Dashboard orchestration
//!
//! [`DashboardServer`] ties the [`WatchManager`](crate::watch::WatchManager)
//! to the [`SocketServer`](crate::socket_server::SocketServer):
//!
//! ```text
//! filesystem ──► WatchManager ──► DomainEvent ──► RateLimiter ──► channel fan-out
//!                                                     │
//!                                           queue (drained per window)
//! ```
//!
//! | Event                     | Channel  |
//! |---------------------------|----------|
//! | `config-change`           | `config` |
//! | `project-config-change`   | `config` |
//! | `log-added/change/removed`| `logs`   |
//! | `custom-<name>-<event>`   | `custom` |
//! | `status-update`           | `status` |

pub mod rate_limiter;
pub mod requests;
pub mod server;
pub mod stats;

pub use rate_limiter::{RateLimiter, RateLimiterSnapshot};
pub use requests::{collect_logs, LogSummary, LogsQuery, RequestKind};
pub use server::{
    message_for_event, BroadcastResult, DashboardServer, DashboardStats, TargetedResult,
    CHANNELS, CONFIG_CHANNEL, CUSTOM_CHANNEL, LOGS_CHANNEL, STATUS_CHANNEL,
};
pub use stats::BroadcastStats;
