//! Safety guards applied to tool calls: policy gates for mutating
//! operations and per-tool rate limits.

pub mod error;
pub mod policy;
pub mod rate_limit;

pub use error::GuardError;
pub use rate_limit::{RateLimit, RateLimiter};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{Settings, SettingsSource};
use crate::tools::{CallContext, ToolError, ToolHandler};

/// Shared guard state: where settings come from, plus the rate limiter.
#[derive(Debug)]
pub struct Guard {
    settings: Arc<SettingsSource>,
    limiter: RateLimiter,
}

impl Guard {
    pub fn new(settings: Arc<SettingsSource>) -> Self {
        Self {
            settings,
            limiter: RateLimiter::new(),
        }
    }

    /// Settings as of now. Re-read on every call.
    pub fn settings(&self) -> Settings {
        self.settings.current()
    }

    pub fn is_read_only(&self) -> bool {
        self.settings().read_only
    }

    pub fn enforce_mutating(
        &self,
        tool: &str,
        namespace: Option<&str>,
        kind: Option<&str>,
    ) -> Result<(), GuardError> {
        let result = policy::check_mutating(&self.settings(), tool, namespace, kind);
        if let Err(e) = &result {
            tracing::warn!("Blocked {tool}: {e}");
        }
        result
    }

    pub fn acquire(&self, tool: &str, limit: RateLimit) -> Result<(), GuardError> {
        self.limiter.acquire(tool, limit)
    }
}

/// Wraps a handler so that every call first takes a rate-limit token.
pub struct GuardedHandler {
    tool: String,
    limit: RateLimit,
    guard: Arc<Guard>,
    inner: Arc<dyn ToolHandler>,
}

impl GuardedHandler {
    pub fn new(
        tool: impl Into<String>,
        limit: RateLimit,
        guard: Arc<Guard>,
        inner: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            tool: tool.into(),
            limit,
            guard,
            inner,
        }
    }
}

#[async_trait]
impl ToolHandler for GuardedHandler {
    async fn call(&self, ctx: &CallContext, args: Value) -> Result<Value, ToolError> {
        self.guard.acquire(&self.tool, self.limit)?;
        self.inner.call(ctx, args).await
    }
}
