//! Lifecycle state of one asynchronous response.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;

/// Status of a response. `InProgress` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResponseStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ResponseStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

#[derive(Debug)]
struct Inner<T> {
    status: ResponseStatus,
    result: Option<T>,
    error: Option<Arc<BridgeError>>,
}

/// One registered unit of background work.
///
/// All reads and writes go through the accessor methods, which take the entry's
/// lock. The first terminal transition wins; every later transition is a no-op
/// and reports `false`.
#[derive(Debug)]
pub struct ResponseState<T> {
    id: String,
    created_at: DateTime<Utc>,
    started: Instant,
    cancel: CancellationToken,
    inner: Mutex<Inner<T>>,
    changed: watch::Sender<ResponseStatus>,
}

impl<T: Clone> ResponseState<T> {
    pub fn new(id: impl Into<String>, cancel: CancellationToken) -> Self {
        let (changed, _) = watch::channel(ResponseStatus::InProgress);
        Self {
            id: id.into(),
            created_at: Utc::now(),
            started: Instant::now(),
            cancel,
            inner: Mutex::new(Inner {
                status: ResponseStatus::InProgress,
                result: None,
                error: None,
            }),
            changed,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Monotonic creation instant, used for retention.
    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn status(&self) -> ResponseStatus {
        self.lock().status
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// The result, present only when completed.
    pub fn result(&self) -> Option<T> {
        self.lock().result.clone()
    }

    /// The failure, present only when failed.
    pub fn error(&self) -> Option<Arc<BridgeError>> {
        self.lock().error.clone()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Receiver notified on every terminal transition.
    pub fn subscribe(&self) -> watch::Receiver<ResponseStatus> {
        self.changed.subscribe()
    }

    fn transition(&self, apply: impl FnOnce(&mut Inner<T>)) -> bool {
        let status = {
            let mut inner = self.lock();
            if inner.status.is_terminal() {
                return false;
            }
            apply(&mut inner);
            inner.status
        };
        self.changed.send_replace(status);
        true
    }

    pub fn set_result(&self, result: T) -> bool {
        self.transition(|inner| {
            inner.status = ResponseStatus::Completed;
            inner.result = Some(result);
        })
    }

    pub fn set_error(&self, error: BridgeError) -> bool {
        self.transition(|inner| {
            inner.status = ResponseStatus::Failed;
            inner.error = Some(Arc::new(error));
        })
    }

    pub fn mark_cancelled(&self) -> bool {
        self.transition(|inner| inner.status = ResponseStatus::Cancelled)
    }

    /// Signal the work to stop and mark the entry cancelled.
    ///
    /// The token always fires; the status changes only if nothing terminal
    /// happened first.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel();
        self.mark_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn state() -> ResponseState<String> {
        ResponseState::new("resp_test", CancellationToken::new())
    }

    #[test]
    fn created_in_progress() {
        let state = state();
        assert_eq!(state.status(), ResponseStatus::InProgress);
        assert!(state.result().is_none());
        assert!(state.error().is_none());
    }

    #[test]
    fn completed_carries_only_result() {
        let state = state();
        assert!(state.set_result("done".into()));
        assert_eq!(state.status(), ResponseStatus::Completed);
        assert_eq!(state.result().as_deref(), Some("done"));
        assert!(state.error().is_none());
    }

    #[test]
    fn failed_carries_only_error() {
        let state = state();
        assert!(state.set_error(BridgeError::Stream("reset".into())));
        assert_eq!(state.status(), ResponseStatus::Failed);
        assert!(state.error().is_some());
        assert!(state.result().is_none());
    }

    #[test]
    fn terminal_states_are_sticky() {
        let state = state();
        assert!(state.set_result("first".into()));
        assert!(!state.set_error(BridgeError::Canceled));
        assert!(!state.cancel());
        assert_eq!(state.status(), ResponseStatus::Completed);
        assert!(state.cancellation_token().is_cancelled());
    }

    #[test]
    fn cancel_before_result_wins() {
        let state = state();
        assert!(state.cancel());
        assert!(!state.set_result("late".into()));
        assert_eq!(state.status(), ResponseStatus::Cancelled);
        assert!(state.result().is_none());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(ResponseStatus::InProgress.to_string(), "in_progress");
        assert_eq!(ResponseStatus::from_str("cancelled").unwrap(), ResponseStatus::Cancelled);
        assert_eq!(
            serde_json::to_string(&ResponseStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[tokio::test]
    async fn subscribers_see_terminal_transition() {
        let state = state();
        let mut rx = state.subscribe();
        state.set_error(BridgeError::Stream("x".into()));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ResponseStatus::Failed);
    }
}
