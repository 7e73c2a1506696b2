//! Registry of background responses with blocking retrieval and periodic sweep.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use tokio::task::JoinError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::state::ResponseState;
use crate::config::BridgeConfig;
use crate::context::ExecutionContext;
use crate::error::{BridgeError, Result};
use crate::util::ids;
use crate::util::timeout::with_timeout;

/// Owns every in-flight and recently finished response.
///
/// Construct once with [`ResponseManager::start`] and share the `Arc`. Work
/// registered through [`create`](Self::create) runs on its own detached
/// context, so it keeps going after the creating request is cancelled.
pub struct ResponseManager<T> {
    entries: RwLock<HashMap<String, Arc<ResponseState<T>>>>,
    poll_interval: Duration,
    get_timeout: Duration,
    retention: Duration,
    background_timeout: Duration,
    shutdown: CancellationToken,
}

impl<T> ResponseManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Manager without a sweeper; call [`sweep_at`](Self::sweep_at) manually.
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            poll_interval: config.poll_interval(),
            get_timeout: config.get_timeout(),
            retention: config.retention(),
            background_timeout: config.background_timeout(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Manager with its periodic sweep running. Must be called inside a tokio runtime.
    pub fn start(config: &BridgeConfig) -> Arc<Self> {
        let manager = Arc::new(Self::new(config));
        spawn_sweeper(
            Arc::downgrade(&manager),
            config.sweep_interval(),
            manager.shutdown.clone(),
        );
        manager
    }

    /// Register a response and run `work` in the background.
    ///
    /// Returns immediately with the in-progress entry. `work` receives the new
    /// response id and a context detached from `ctx`: same tools and observer,
    /// independent cancellation, bounded by the background timeout. A panic
    /// inside `work` fails the entry.
    pub fn create<F, Fut>(&self, ctx: &ExecutionContext, work: F) -> Arc<ResponseState<T>>
    where
        F: FnOnce(String, ExecutionContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (detached, guard) = ctx.detached(self.background_timeout);
        let state = Arc::new(ResponseState::new(
            ids::response_id(),
            detached.cancellation_token().clone(),
        ));
        self.write_entries()
            .insert(state.id().to_string(), Arc::clone(&state));
        debug!(response_id = state.id(), "response created");

        let task = tokio::spawn(work(state.id().to_string(), detached));
        let supervised = Arc::clone(&state);
        tokio::spawn(async move {
            let outcome = task.await;
            drop(guard);
            settle(&supervised, outcome);
        });

        state
    }

    /// Look up an entry without waiting.
    pub fn lookup(&self, id: &str) -> Result<Arc<ResponseState<T>>> {
        self.read_entries()
            .get(id)
            .cloned()
            .ok_or_else(|| BridgeError::ResponseNotFound(id.to_string()))
    }

    /// Wait until the entry is terminal.
    ///
    /// Fails with `Timeout` after the configured ceiling and with `Canceled`
    /// as soon as `cancel` fires.
    pub async fn get(&self, id: &str, cancel: &CancellationToken) -> Result<Arc<ResponseState<T>>> {
        let state = self.lookup(id)?;
        if state.is_terminal() {
            return Ok(state);
        }

        let mut changes = state.subscribe();
        let poll_interval = self.poll_interval;
        let wait = async {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                if state.is_terminal() {
                    return Ok(());
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(BridgeError::Canceled),
                    _ = changes.changed() => {}
                    _ = ticker.tick() => {}
                }
            }
        };
        with_timeout(self.get_timeout, wait).await?;
        Ok(state)
    }

    /// Cancel an entry. Returns whether it transitioned to cancelled.
    pub fn cancel(&self, id: &str) -> Result<bool> {
        let state = self.lookup(id)?;
        let transitioned = state.cancel();
        debug!(response_id = id, transitioned, "response cancel requested");
        Ok(transitioned)
    }

    /// Remove an entry, cancelling it first if still running.
    pub fn delete(&self, id: &str) -> Result<()> {
        let state = self
            .write_entries()
            .remove(id)
            .ok_or_else(|| BridgeError::ResponseNotFound(id.to_string()))?;
        if !state.is_terminal() {
            state.cancel();
        }
        debug!(response_id = id, "response deleted");
        Ok(())
    }

    /// One sweep pass: remove terminal entries created more than the retention
    /// window before `now`. Returns the number removed.
    ///
    /// Candidates are collected under the read lock; the write lock is taken
    /// and released once per removal.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let candidates: Vec<Arc<ResponseState<T>>> =
            self.read_entries().values().cloned().collect();

        let expired: Vec<Arc<ResponseState<T>>> = candidates
            .into_iter()
            .filter(|state| {
                state.is_terminal() && now.saturating_duration_since(state.started()) >= self.retention
            })
            .collect();
        if expired.is_empty() {
            return 0;
        }

        let mut removed = 0;
        for state in expired {
            let mut entries = self.write_entries();
            if entries
                .get(state.id())
                .is_some_and(|current| Arc::ptr_eq(current, &state))
            {
                entries.remove(state.id());
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the periodic sweep. Entries stay registered.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn read_entries(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ResponseState<T>>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<ResponseState<T>>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Drop for ResponseManager<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<T> std::fmt::Debug for ResponseManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseManager")
            .field("poll_interval", &self.poll_interval)
            .field("get_timeout", &self.get_timeout)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

fn settle<T: Clone>(state: &ResponseState<T>, outcome: std::result::Result<Result<T>, JoinError>) {
    match outcome {
        Ok(Ok(value)) => {
            state.set_result(value);
        }
        Ok(Err(err)) => {
            debug!(response_id = state.id(), error = %err, "response failed");
            state.set_error(err);
        }
        Err(join_err) if join_err.is_panic() => {
            let message = panic_message(join_err);
            error!(response_id = state.id(), panic = %message, "background response task panicked");
            state.set_error(BridgeError::TaskPanicked(message));
        }
        Err(_) => {
            state.mark_cancelled();
        }
    }
}

fn panic_message(err: JoinError) -> String {
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn spawn_sweeper<T>(manager: Weak<ResponseManager<T>>, every: Duration, shutdown: CancellationToken)
where
    T: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(manager) = manager.upgrade() else {
                break;
            };
            let removed = manager.sweep_at(Instant::now());
            if removed > 0 {
                debug!(removed, remaining = manager.len(), "response sweep");
            }
        }
    });
}
