//! Per-call context: cancellation plus an optional deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::ToolError;

/// Passed to every tool handler. Cancelled when the server shuts down or
/// when the call's deadline passes, whichever comes first.
///
/// The deadline cancels [`CallContext::token`] itself, so handlers that only
/// wait on the token still observe the timeout.
#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<(Instant, Duration)>,
    _timer: Option<Arc<DropGuard>>,
}

impl CallContext {
    pub fn new(parent: CancellationToken, timeout: Option<Duration>) -> Self {
        let token = parent.child_token();
        let deadline = timeout.map(|t| (Instant::now() + t, t));
        let timer = deadline.and_then(|(at, _)| spawn_timer(&token, at));
        Self {
            token,
            deadline,
            _timer: timer,
        }
    }

    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::new(CancellationToken::new(), None)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline_passed()
    }

    fn deadline_passed(&self) -> bool {
        self.deadline
            .is_some_and(|(deadline, _)| Instant::now() >= deadline)
    }

    fn reason(&self) -> ToolError {
        match self.deadline {
            Some((_, timeout)) if self.deadline_passed() => ToolError::TimedOut(timeout),
            _ => ToolError::Cancelled,
        }
    }

    /// Resolves once the call should stop, with the reason.
    pub async fn done(&self) -> ToolError {
        match self.deadline {
            Some((deadline, _)) => tokio::select! {
                _ = self.token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {}
            },
            None => self.token.cancelled().await,
        }
        self.reason()
    }

    /// Race `fut` against cancellation and the deadline.
    pub async fn run<F, T, E>(&self, fut: F) -> Result<T, ToolError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ToolError>,
    {
        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            result = fut => result.map_err(Into::into),
        }
    }
}

/// Cancel `token` at `deadline`. Dropping the returned guard (with the last
/// clone of the context) cancels the token and ends the timer task.
fn spawn_timer(token: &CancellationToken, deadline: Instant) -> Option<Arc<DropGuard>> {
    let handle = tokio::runtime::Handle::try_current().ok()?;
    let timer = token.clone();
    handle.spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep_until(deadline) => timer.cancel(),
        }
    });
    Some(Arc::new(token.clone().drop_guard()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_when_not_cancelled() {
        let ctx = CallContext::background();
        let out = ctx.run(async { Ok::<_, ToolError>(5) }).await.unwrap();
        assert_eq!(out, 5);
    }

    #[tokio::test]
    async fn deadline_interrupts_slow_work() {
        let ctx = CallContext::new(CancellationToken::new(), Some(Duration::from_millis(20)));
        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ToolError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::TimedOut(_)));
        assert!(ctx.is_cancelled());
        assert_eq!(err.to_string(), "tool call timed out after 20ms");
    }

    #[tokio::test]
    async fn parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let ctx = CallContext::new(parent.child_token(), None);
        parent.cancel();
        let err = ctx
            .run(std::future::pending::<Result<(), ToolError>>())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Cancelled));
    }

    #[tokio::test]
    async fn deadline_cancels_the_exposed_token() {
        let ctx = CallContext::new(CancellationToken::new(), Some(Duration::from_millis(20)));
        assert!(!ctx.token().is_cancelled());

        tokio::time::timeout(Duration::from_secs(5), ctx.token().cancelled())
            .await
            .unwrap();
        assert!(ctx.token().is_cancelled());
        assert!(matches!(ctx.done().await, ToolError::TimedOut(_)));
    }

    #[tokio::test]
    async fn dropping_the_context_does_not_cancel_the_parent() {
        let parent = CancellationToken::new();
        let token = {
            let ctx = CallContext::new(parent.clone(), Some(Duration::from_secs(60)));
            ctx.token().clone()
        };
        assert!(token.is_cancelled());
        assert!(!parent.is_cancelled());
    }
}
