//! Request/response surface served over the socket
//!
//! Clients send `{"type": "request", "data": {"requestType": ..., "params": ...}}`
//! and receive a `response` (or a `REQUEST_FAILED` error) carrying the request
//! id as `correlationId`.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{DashboardError, Result};
use crate::socket_server::protocol::now_millis;
use crate::socket_server::{ErrorCode, Message, RequestFrame, RequestHandler};
use crate::watch::{read_json_file, read_tail};

use super::server::{stats_value, Core};

/// Default number of log files returned by `getLogs`
pub const DEFAULT_LOG_LIMIT: usize = 10;
/// Largest `limit` a `getLogs` request may ask for
pub const MAX_LOG_LIMIT: usize = 100;
/// Largest `lines` a `getLogs` request may ask for
pub const MAX_TAIL_LINES: usize = 1000;

/// Request types understood by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    GetStats,
    GetConfig,
    GetFileWatcherStatus,
    GetConnectedClients,
    GetLogs,
    RefreshState,
    ResetStats,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::GetStats => "getStats",
            RequestKind::GetConfig => "getConfig",
            RequestKind::GetFileWatcherStatus => "getFileWatcherStatus",
            RequestKind::GetConnectedClients => "getConnectedClients",
            RequestKind::GetLogs => "getLogs",
            RequestKind::RefreshState => "refreshState",
            RequestKind::ResetStats => "resetStats",
        }
    }
}

impl FromStr for RequestKind {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "getStats" => Ok(RequestKind::GetStats),
            "getConfig" => Ok(RequestKind::GetConfig),
            "getFileWatcherStatus" => Ok(RequestKind::GetFileWatcherStatus),
            "getConnectedClients" => Ok(RequestKind::GetConnectedClients),
            "getLogs" => Ok(RequestKind::GetLogs),
            "refreshState" => Ok(RequestKind::RefreshState),
            "resetStats" => Ok(RequestKind::ResetStats),
            other => Err(DashboardError::UnknownRequest(other.to_string())),
        }
    }
}

/// Parameters accepted by `getLogs`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogsQuery {
    /// Most recently modified files to return
    pub limit: usize,
    /// Trailing lines of each file
    pub lines: usize,
}

impl LogsQuery {
    pub fn from_params(params: &Value, default_lines: usize) -> Result<Self> {
        Ok(Self {
            limit: bounded_param(params, "limit", MAX_LOG_LIMIT)?.unwrap_or(DEFAULT_LOG_LIMIT),
            lines: bounded_param(params, "lines", MAX_TAIL_LINES)?.unwrap_or(default_lines),
        })
    }
}

fn bounded_param(params: &Value, key: &str, max: usize) -> Result<Option<usize>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_u64() {
            Some(n) if n > 0 && n <= max as u64 => Ok(Some(n as usize)),
            Some(n) if n > 0 => Err(DashboardError::InvalidParams(format!(
                "{} must be at most {}",
                key, max
            ))),
            _ => Err(DashboardError::InvalidParams(format!(
                "{} must be a positive integer",
                key
            ))),
        },
    }
}

/// One entry of a `getLogs` answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSummary {
    pub filename: String,
    pub path: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch
    pub modified: i64,
    pub recent_content: String,
}

/// Collect `.log` files across `dirs`, newest first
pub fn collect_logs(dirs: &[PathBuf], query: LogsQuery) -> Vec<LogSummary> {
    let mut found: Vec<(PathBuf, u64, SystemTime)> = Vec::new();
    for dir in dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!("Skipping log directory {}: {}", dir.display(), e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((path, meta.len(), modified));
        }
    }

    found.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
    found
        .into_iter()
        .take(query.limit)
        .map(|(path, size, modified)| LogSummary {
            filename: file_name(&path),
            path: path.display().to_string(),
            size,
            modified: chrono::DateTime::<chrono::Utc>::from(modified).timestamp_millis(),
            recent_content: read_tail(&path, query.lines),
        })
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn json_file_state(path: Option<&Path>) -> Value {
    match path {
        Some(path) => json!({
            "path": path.display().to_string(),
            "content": read_json_file(path),
        }),
        None => Value::Null,
    }
}

impl Core {
    fn answer(&self, client_id: &str, request: &RequestFrame) -> Result<Value> {
        let kind: RequestKind = request.request_type.parse()?;
        tracing::debug!("{} requested {}", client_id, kind.as_str());

        match kind {
            RequestKind::GetStats => Ok(stats_value(&self.stats())),
            RequestKind::GetConfig => Ok(json!({
                "settings": self.config,
                "configFile": json_file_state(self.config.watch.config_file.as_deref()),
            })),
            RequestKind::GetFileWatcherStatus => Ok(self.watcher.status()),
            RequestKind::GetConnectedClients => {
                let clients = self.socket.clients();
                Ok(json!({
                    "count": clients.len(),
                    "clients": clients,
                }))
            }
            RequestKind::GetLogs => {
                let query = LogsQuery::from_params(&request.params, self.config.watch.tail_lines)?;
                let targets = self.watcher.targets();
                let logs = collect_logs(targets.log_dirs(), query);
                Ok(json!({
                    "count": logs.len(),
                    "logs": logs,
                }))
            }
            RequestKind::RefreshState => Ok(json!({
                "config": json_file_state(self.config.watch.config_file.as_deref()),
                "projectConfig": json_file_state(self.config.watch.project_config.as_deref()),
                "watcher": self.watcher.status(),
                "connectedClients": self.socket.client_count(),
                "refreshedAt": now_millis(),
            })),
            RequestKind::ResetStats => {
                self.reset_stats();
                Ok(json!({ "reset": true }))
            }
        }
    }
}

impl RequestHandler for Core {
    fn handle_request(&self, client_id: &str, request: &RequestFrame) -> Message {
        match self.answer(client_id, request) {
            Ok(data) => Message::response(request.id.clone(), &request.request_type, data),
            Err(e) => {
                tracing::warn!(
                    "Request {} from {} failed: {}",
                    request.request_type,
                    client_id,
                    e
                );
                Message::error(ErrorCode::RequestFailed, &e.to_string(), request.id.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_request_kind_round_trip_names() {
        for kind in [
            RequestKind::GetStats,
            RequestKind::GetConfig,
            RequestKind::GetFileWatcherStatus,
            RequestKind::GetConnectedClients,
            RequestKind::GetLogs,
            RequestKind::RefreshState,
            RequestKind::ResetStats,
        ] {
            assert_eq!(kind.as_str().parse::<RequestKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_request_kind() {
        let err = "getWeather".parse::<RequestKind>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown request type: getWeather");
    }

    #[test]
    fn test_logs_query_defaults_and_validation() {
        let query = LogsQuery::from_params(&Value::Null, 20).unwrap();
        assert_eq!(query, LogsQuery { limit: 10, lines: 20 });

        let query = LogsQuery::from_params(&json!({"limit": 2, "lines": 5}), 20).unwrap();
        assert_eq!(query, LogsQuery { limit: 2, lines: 5 });

        assert!(LogsQuery::from_params(&json!({"limit": 0}), 20).is_err());
        assert!(LogsQuery::from_params(&json!({"lines": "many"}), 20).is_err());
    }

    #[test]
    fn test_logs_query_caps() {
        let params = json!({ "limit": MAX_LOG_LIMIT, "lines": MAX_TAIL_LINES });
        let query = LogsQuery::from_params(&params, 20).unwrap();
        assert_eq!(query, LogsQuery { limit: MAX_LOG_LIMIT, lines: MAX_TAIL_LINES });

        let err = LogsQuery::from_params(&json!({ "limit": 100_000 }), 20).unwrap_err();
        assert!(matches!(err, DashboardError::InvalidParams(_)));
        assert!(err.to_string().contains("limit must be at most 100"));

        let err = LogsQuery::from_params(&json!({ "lines": 1_000_000_000u64 }), 20).unwrap_err();
        assert!(err.to_string().contains("lines must be at most 1000"));
    }

    #[test]
    fn test_collect_logs_filters_and_limits() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.log"), "one\ntwo\nthree\n").unwrap();
        fs::write(dir.path().join("b.log"), "only\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();
        fs::create_dir(dir.path().join("nested.log")).unwrap();

        let logs = collect_logs(
            &[dir.path().to_path_buf()],
            LogsQuery { limit: 10, lines: 2 },
        );
        let mut names: Vec<_> = logs.iter().map(|l| l.filename.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a.log", "b.log"]);

        let a = logs.iter().find(|l| l.filename == "a.log").unwrap();
        assert_eq!(a.recent_content, "two\nthree");
        assert_eq!(a.size, 14);

        let limited = collect_logs(&[dir.path().to_path_buf()], LogsQuery { limit: 1, lines: 2 });
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_collect_logs_missing_dir() {
        let logs = collect_logs(
            &[PathBuf::from("/nonexistent/opswatch/logs")],
            LogsQuery { limit: 10, lines: 2 },
        );
        assert!(logs.is_empty());
    }
}
