//! Bounded single-producer pump between a backend stream and its consumer.
//!
//! The producer task forwards items over a bounded channel and reports a
//! failure on a separate one-shot channel. The consumer keeps draining items
//! that were buffered before the failure, then reports it.

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::context::ExecutionContext;
use crate::error::{BridgeError, Result};

pub const DEFAULT_STREAM_BUFFER: usize = 50;

pub struct StreamPump;

impl StreamPump {
    /// Spawn the producer for `stream` and return the consumer side.
    ///
    /// The producer stops when the stream ends, fails, the consumer goes away,
    /// or `ctx` is cancelled.
    pub fn spawn<T>(
        ctx: &ExecutionContext,
        stream: BoxStream<'static, Result<T>>,
        capacity: usize,
    ) -> StreamHandle<T>
    where
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (err_tx, err_rx) = oneshot::channel();
        let stop = ctx.cancellation_token().child_token();

        tokio::spawn(produce(stream, tx, err_tx, stop.clone()));

        StreamHandle {
            ctx: ctx.clone(),
            items: rx,
            error: Some(err_rx),
            pending_error: None,
            _stop_producer: stop.drop_guard(),
        }
    }
}

async fn produce<T>(
    mut stream: BoxStream<'static, Result<T>>,
    tx: mpsc::Sender<T>,
    err_tx: oneshot::Sender<BridgeError>,
    stop: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(item)) => {
                let sent = tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    sent = tx.send(item) => sent,
                };
                if sent.is_err() {
                    debug!("stream consumer dropped");
                    break;
                }
            }
            Some(Err(e)) => {
                let _ = err_tx.send(e);
                return;
            }
            None => break,
        }
    }
}

/// Consumer side of a [`StreamPump`]. Dropping it stops the producer.
pub struct StreamHandle<T> {
    ctx: ExecutionContext,
    items: mpsc::Receiver<T>,
    error: Option<oneshot::Receiver<BridgeError>>,
    pending_error: Option<BridgeError>,
    _stop_producer: DropGuard,
}

enum Step<T> {
    Stopped,
    Item(Option<T>),
    Failed(Option<BridgeError>),
}

impl<T> StreamHandle<T> {
    /// Next item, `Some(Err)` for a producer failure or cancellation,
    /// `None` once the stream ended cleanly.
    pub async fn next(&mut self) -> Option<Result<T>> {
        loop {
            let step = tokio::select! {
                biased;
                _ = self.ctx.cancelled() => Step::Stopped,
                item = self.items.recv() => Step::Item(item),
                err = recv_error(&mut self.error) => Step::Failed(err),
            };
            match step {
                Step::Stopped => {
                    self.error = None;
                    return self.ctx.error().map(Err);
                }
                Step::Item(Some(item)) => return Some(Ok(item)),
                Step::Item(None) => return self.take_error().await.map(Err),
                Step::Failed(err) => {
                    // keep draining what the producer buffered before failing
                    self.error = None;
                    self.pending_error = err;
                }
            }
        }
    }

    async fn take_error(&mut self) -> Option<BridgeError> {
        if let Some(err) = self.pending_error.take() {
            return Some(err);
        }
        match self.error.take() {
            Some(rx) => rx.await.ok(),
            None => None,
        }
    }
}

async fn recv_error(rx: &mut Option<oneshot::Receiver<BridgeError>>) -> Option<BridgeError> {
    match rx {
        Some(rx) => rx.await.ok(),
        None => std::future::pending().await,
    }
}
