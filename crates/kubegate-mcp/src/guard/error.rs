//! Guard rejections.

/// A request refused by policy or rate limiting. The display string always
/// starts with the bracketed machine-readable code.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("[READ_ONLY_BLOCKED] {tool} is blocked in read-only mode")]
    ReadOnly { tool: String },

    #[error("[NS_NOT_ALLOWED] Namespace {0} is not in allowlist")]
    NamespaceNotAllowed(String),

    #[error("[KIND_NOT_ALLOWED] Kind {0} is not in allowlist")]
    KindNotAllowed(String),

    #[error("[RATE_LIMITED] Rate limit exceeded for {0}")]
    RateLimited(String),
}

impl GuardError {
    pub fn code(&self) -> &'static str {
        match self {
            GuardError::ReadOnly { .. } => "READ_ONLY_BLOCKED",
            GuardError::NamespaceNotAllowed(_) => "NS_NOT_ALLOWED",
            GuardError::KindNotAllowed(_) => "KIND_NOT_ALLOWED",
            GuardError::RateLimited(_) => "RATE_LIMITED",
        }
    }
}
