//! Error types for opswatch

use std::process::ExitCode;
use thiserror::Error;

/// Main error type for opswatch operations
#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Failed to bind socket server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot watch {path}: {message}")]
    Watch { path: String, message: String },

    #[error("Watch target already registered: {0}")]
    TargetExists(String),

    #[error("Unknown watch target: {0}")]
    UnknownTarget(String),

    #[error("Unknown request type: {0}")]
    UnknownRequest(String),

    #[error("Invalid request parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DashboardError {
    /// Build a bind error for the given address
    pub fn bind(addr: impl std::fmt::Display, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.to_string(),
            source,
        }
    }

    /// Build a watch error from any displayable notify failure
    pub fn watch(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::Watch {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Convert error to a process exit code:
    /// - 1: IO / watch failure
    /// - 2: Configuration error
    /// - 3: Socket bind failure
    /// - 4: Anything else
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) | Self::Watch { .. } => ExitCode::from(1),
            Self::Config(_) | Self::Json(_) => ExitCode::from(2),
            Self::Bind { .. } => ExitCode::from(3),
            _ => ExitCode::from(4),
        }
    }
}

/// Result type alias for opswatch operations
pub type Result<T> = std::result::Result<T, DashboardError>;
