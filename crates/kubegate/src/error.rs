//! Error type shared by every resource backend.

/// Errors returned by resource backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{kind} \"{name}\" not found{}", namespace_suffix(.namespace))]
    NotFound {
        kind: String,
        namespace: Option<String>,
        name: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid selector \"{selector}\": {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Context \"{0}\" does not exist")]
    UnknownContext(String),

    #[error("Context switching not available: {0}")]
    ContextsUnavailable(String),

    #[error("Pod {namespace}/{pod} is not running (phase {phase})")]
    PodNotRunning {
        namespace: String,
        pod: String,
        phase: String,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn namespace_suffix(namespace: &Option<String>) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!(" in namespace \"{ns}\""),
        _ => String::new(),
    }
}

impl BackendError {
    pub fn not_found(kind: &str, namespace: Option<&str>, name: &str) -> Self {
        BackendError::NotFound {
            kind: kind.to_string(),
            namespace: namespace.map(|s| s.to_string()),
            name: name.to_string(),
        }
    }

    /// Whether this error means the addressed object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }
}

/// Convenience result type.
pub type BackendResult<T> = Result<T, BackendError>;
