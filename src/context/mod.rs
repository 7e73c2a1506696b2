//! Execution context: request-scoped environment plus cancellation.
//!
//! Every provider call and tool dispatch takes an [`ExecutionContext`]. The
//! environment ([`RequestEnv`]) carries the attached tool collaborators and the
//! optional observer; the cancellation token and deadline decide when work
//! should stop. [`ExecutionContext::detached`] produces a context that keeps the
//! environment but gets a fresh token, so background work outlives the request
//! that started it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{BridgeError, Result};
use crate::tools::{ToolObserver, ToolSet};

/// Request-scoped values readable by everything running under a context.
#[derive(Clone, Default)]
pub struct RequestEnv {
    tools: ToolSet,
    observer: Option<Arc<dyn ToolObserver>>,
    metadata: HashMap<String, String>,
}

impl RequestEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ToolObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn observer(&self) -> Option<&Arc<dyn ToolObserver>> {
        self.observer.as_ref()
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

impl std::fmt::Debug for RequestEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestEnv")
            .field("tools", &self.tools)
            .field("observer", &self.observer.as_ref().map(|_| ".."))
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Environment plus cancellation signal for one unit of work.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    env: Arc<RequestEnv>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    expired: Arc<OnceLock<()>>,
}

impl ExecutionContext {
    /// Root context with its own token and no deadline.
    pub fn new(env: RequestEnv) -> Self {
        Self::with_token(env, CancellationToken::new())
    }

    /// Root context driven by a caller-owned token.
    pub fn with_token(env: RequestEnv, cancel: CancellationToken) -> Self {
        Self {
            env: Arc::new(env),
            cancel,
            deadline: None,
            expired: Arc::new(OnceLock::new()),
        }
    }

    /// Empty environment, fresh token.
    pub fn background() -> Self {
        Self::new(RequestEnv::default())
    }

    pub fn env(&self) -> &RequestEnv {
        &self.env
    }

    pub fn tools(&self) -> &ToolSet {
        self.env.tools()
    }

    pub fn observer(&self) -> Option<&Arc<dyn ToolObserver>> {
        self.env.observer()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why this context stopped, if it has.
    pub fn error(&self) -> Option<BridgeError> {
        self.is_cancelled().then(|| self.stop_reason())
    }

    fn stop_reason(&self) -> BridgeError {
        if self.expired.get().is_some() {
            BridgeError::DeadlineExceeded
        } else {
            BridgeError::Canceled
        }
    }

    /// Context cancelled together with this one, but cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            env: Arc::clone(&self.env),
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
            expired: Arc::clone(&self.expired),
        }
    }

    /// Context sharing this environment but rooted on a fresh token that
    /// expires after `timeout`. Cancelling `self` has no effect on it.
    ///
    /// Must be called inside a tokio runtime. Keep the returned guard alive
    /// for as long as the work runs; dropping it cancels the detached token
    /// and stops the timer.
    pub fn detached(&self, timeout: Duration) -> (Self, DetachGuard) {
        let token = CancellationToken::new();
        let expired = Arc::new(OnceLock::new());
        let timer = {
            let token = token.clone();
            let expired = Arc::clone(&expired);
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        let _ = expired.set(());
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        };
        let ctx = Self {
            env: Arc::clone(&self.env),
            cancel: token.clone(),
            deadline: Some(Instant::now() + timeout),
            expired,
        };
        let guard = DetachGuard {
            timer,
            _cancel_on_drop: token.drop_guard(),
        };
        (ctx, guard)
    }

    /// Run `future` unless this context stops first.
    pub async fn race<T, F>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.stop_reason()),
            out = future => out,
        }
    }
}

/// Releases a detached context's timer and token.
#[must_use = "dropping the guard cancels the detached context"]
pub struct DetachGuard {
    timer: JoinHandle<()>,
    _cancel_on_drop: DropGuard,
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detached_context_survives_parent_cancellation() {
        let parent =
            ExecutionContext::new(RequestEnv::new().with_metadata("tenant", "acme"));
        let (detached, _guard) = parent.detached(Duration::from_secs(60));

        parent.cancel();

        assert!(parent.is_cancelled());
        assert!(!detached.is_cancelled());
        assert_eq!(detached.env().metadata("tenant"), Some("acme"));
        assert!(detached.deadline().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn detached_context_expires_with_deadline_error() {
        let parent = ExecutionContext::background();
        let (detached, _guard) = parent.detached(Duration::from_millis(500));

        detached.cancelled().await;

        assert!(matches!(detached.error(), Some(BridgeError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn dropping_guard_cancels_detached_context() {
        let parent = ExecutionContext::background();
        let (detached, guard) = parent.detached(Duration::from_secs(60));
        drop(guard);
        assert!(detached.is_cancelled());
        assert!(matches!(detached.error(), Some(BridgeError::Canceled)));
    }

    #[tokio::test]
    async fn race_returns_cancellation_when_context_stops() {
        let ctx = ExecutionContext::background();
        ctx.cancel();
        let out: Result<()> = ctx.race(std::future::pending()).await;
        assert!(matches!(out, Err(BridgeError::Canceled)));
    }

    #[tokio::test]
    async fn child_follows_parent_but_not_the_reverse() {
        let parent = ExecutionContext::background();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
    }
}
