//! Domain-tier tool failures.

use std::time::Duration;

use kubegate::BackendError;

use crate::guard::GuardError;

/// Why a tool call failed. Always rendered as an `isError` result, never as
/// a JSON-RPC error.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Kubernetes backend not initialized yet")]
    NotReady,

    #[error("tool call cancelled")]
    Cancelled,

    #[error("tool call timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    #[error("{0}")]
    Failed(String),
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        ToolError::InvalidArguments(e.to_string())
    }
}
