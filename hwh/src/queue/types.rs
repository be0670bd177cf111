//! Queue types for the request queue

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

/// Classifies a failure as upstream throttling
///
/// The queue retries failures that report `true` here and hands every
/// other failure straight back to the caller.
pub trait RateLimitSignal {
    /// True for HTTP 429 or a quota-exceeded classification
    fn is_rate_limited(&self) -> bool;
}

impl RateLimitSignal for reqwest::Error {
    fn is_rate_limited(&self) -> bool {
        self.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS)
    }
}

/// Failure delivered to a caller of the queue
#[derive(Debug, Error)]
pub enum QueueError<E> {
    /// The operation's own failure, forwarded unchanged
    #[error(transparent)]
    Operation(E),

    #[error("Queued operation panicked")]
    Panicked,

    /// The queue's driver went away before the request settled
    #[error("Request queue closed before the request settled")]
    Closed,

    /// Only produced by `submit_with_timeout`
    #[error("Timed out after {0:?} waiting for the request queue")]
    TimedOut(Duration),
}

impl<E> QueueError<E> {
    /// Borrow the operation's failure, if that is what this is
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            QueueError::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Take the operation's failure, if that is what this is
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            QueueError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: RateLimitSignal> RateLimitSignal for QueueError<E> {
    fn is_rate_limited(&self) -> bool {
        self.operation_error().is_some_and(RateLimitSignal::is_rate_limited)
    }
}

/// Sending half of a caller's completion handle
pub(crate) type Reply<T, E> = oneshot::Sender<Result<T, QueueError<E>>>;

/// A type-erased unit of queued work
///
/// Erasing the result type lets one queue carry requests that return
/// different values while sharing a single error type.
#[async_trait]
pub(crate) trait Job<E>: Send {
    /// Run the operation once; a success is delivered to the caller here
    async fn attempt(&mut self) -> Result<(), E>;

    /// Deliver a terminal failure to the caller
    fn reject(&mut self, error: QueueError<E>);
}

/// Operation plus the handle its caller is waiting on
pub(crate) struct Request<T, E, F> {
    operation: F,
    reply: Option<Reply<T, E>>,
}

impl<T, E, F> Request<T, E, F> {
    pub(crate) fn new(operation: F, reply: Reply<T, E>) -> Self {
        Self {
            operation,
            reply: Some(reply),
        }
    }
}

#[async_trait]
impl<T, E, F, Fut> Job<E> for Request<T, E, F>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    async fn attempt(&mut self) -> Result<(), E> {
        let value = (self.operation)().await?;
        if let Some(reply) = self.reply.take() {
            // Caller may have stopped waiting; the result is discarded then
            let _ = reply.send(Ok(value));
        }
        Ok(())
    }

    fn reject(&mut self, error: QueueError<E>) {
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(Err(error));
        }
    }
}

/// A pending entry in the queue
pub(crate) struct QueueItem<E> {
    /// Submission sequence number, for log correlation
    pub id: u64,

    /// Rate-limit retries scheduled so far
    pub attempts: u32,

    pub job: Box<dyn Job<E>>,
}

impl<E> QueueItem<E> {
    pub(crate) fn new(id: u64, job: Box<dyn Job<E>>) -> Self {
        Self { id, attempts: 0, job }
    }
}

/// Counters for the queue
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
    pub rate_limited: u64,
    pub panicked: u64,
    pub peak_pending: usize,
}

/// Snapshot of the queue
#[derive(Debug, Clone, Serialize)]
pub struct QueueState {
    /// Items waiting, not counting the one in flight
    pub pending: usize,

    /// True while an item is between dequeue and settle
    pub executing: bool,

    pub stats: QueueStats,
}
