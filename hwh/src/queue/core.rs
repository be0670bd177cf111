//! Serial request queue implementation

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::QueueConfig;
use super::types::{QueueError, QueueItem, QueueState, QueueStats, RateLimitSignal, Request};

/// Internal state protected by mutex
struct QueueInner<E> {
    /// Waiting items; retried items go back on the front
    pending: VecDeque<QueueItem<E>>,

    /// True from the moment a driver is started until it finds the queue empty
    executing: bool,

    /// When the most recent attempt settled
    last_completion: Option<Instant>,

    next_id: u64,

    stats: QueueStats,
}

struct Shared<E> {
    config: QueueConfig,
    inner: Mutex<QueueInner<E>>,
}

/// What the driver does with an item after an attempt
enum Settle<E> {
    Done,
    Retry,
    Reject(QueueError<E>),
}

/// Runs calls to a rate-limited service one at a time
///
/// Attempts are spaced at least `min_interval` apart, measured from the end
/// of the previous attempt. Rate-limited failures are retried ahead of
/// everything else after `retry_delay`, at most `max_retries` times per
/// request. Cloning gives another handle to the same queue.
pub struct SerialRequestQueue<E> {
    shared: Arc<Shared<E>>,
}

impl<E> Clone for SerialRequestQueue<E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<E> fmt::Debug for SerialRequestQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialRequestQueue")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl<E> Shared<E> {
    fn lock(&self) -> MutexGuard<'_, QueueInner<E>> {
        // Every critical section leaves the state consistent before it can panic
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E> SerialRequestQueue<E>
where
    E: RateLimitSignal + Send + 'static,
{
    /// Create a new queue with the given configuration
    pub fn new(config: QueueConfig) -> Self {
        debug!(?config, "SerialRequestQueue::new: called");
        Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(QueueInner {
                    pending: VecDeque::new(),
                    executing: false,
                    last_completion: None,
                    next_id: 0,
                    stats: QueueStats::default(),
                }),
            }),
        }
    }

    /// The configuration this queue was built with
    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }

    /// Queue an operation and wait for it to settle
    ///
    /// The request takes its place at the tail as soon as this is called,
    /// before the returned future is first polled. The operation may run
    /// more than once if the service rate-limits it. Dropping the returned
    /// future does not withdraw the request; it still runs and its result
    /// is discarded.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit<T, F, Fut>(&self, operation: F) -> impl Future<Output = Result<T, QueueError<E>>> + Send + 'static
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job = Box::new(Request::new(operation, tx));

        let start_driver = {
            let mut inner = self.shared.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.pending.push_back(QueueItem::new(id, job));
            inner.stats.submitted += 1;
            inner.stats.peak_pending = inner.stats.peak_pending.max(inner.pending.len());
            debug!(id, pending = inner.pending.len(), executing = inner.executing, "SerialRequestQueue::submit: enqueued");

            if inner.executing {
                false
            } else {
                inner.executing = true;
                true
            }
        };

        if start_driver {
            debug!("SerialRequestQueue::submit: queue was idle, starting driver");
            tokio::spawn(self.shared.clone().drive());
        }

        async move { rx.await.unwrap_or_else(|_| Err(QueueError::Closed)) }
    }

    /// Like `submit`, but stop waiting after `timeout`
    ///
    /// Only the caller gives up: the request keeps its place and still runs.
    pub fn submit_with_timeout<T, F, Fut>(
        &self,
        timeout: Duration,
        operation: F,
    ) -> impl Future<Output = Result<T, QueueError<E>>> + Send + 'static
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let settled = self.submit(operation);
        async move {
            match tokio::time::timeout(timeout, settled).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(?timeout, "SerialRequestQueue::submit_with_timeout: caller gave up");
                    Err(QueueError::TimedOut(timeout))
                }
            }
        }
    }

    /// Get current queue state
    pub fn queue_state(&self) -> QueueState {
        let inner = self.shared.lock();
        QueueState {
            pending: inner.pending.len(),
            executing: inner.executing,
            stats: inner.stats.clone(),
        }
    }
}

impl<E> Shared<E>
where
    E: RateLimitSignal + Send + 'static,
{
    /// Process items until the queue is empty
    ///
    /// The returned future owns a guard from the start, so dropping it, even
    /// unpolled, still settles every waiting caller.
    fn drive(self: Arc<Self>) -> impl Future<Output = ()> + Send + 'static {
        let guard = DriverGuard {
            shared: self.clone(),
            armed: true,
        };
        async move {
            let mut guard = guard;
            self.run(&mut guard).await;
        }
    }

    async fn run(&self, guard: &mut DriverGuard<E>) {
        debug!("SerialRequestQueue::drive: started");
        loop {
            let wait = self.pacing_delay();
            if !wait.is_zero() {
                debug!(?wait, "SerialRequestQueue::drive: pacing");
                tokio::time::sleep(wait).await;
            }

            let Some(mut item) = self.next_item() else {
                debug!("SerialRequestQueue::drive: queue empty, stopping");
                guard.armed = false;
                return;
            };

            debug!(id = item.id, attempts = item.attempts, "SerialRequestQueue::drive: attempting");
            let outcome = AssertUnwindSafe(item.job.attempt()).catch_unwind().await;

            let settle = {
                let mut inner = self.lock();
                inner.last_completion = Some(Instant::now());
                match outcome {
                    Ok(Ok(())) => {
                        inner.stats.succeeded += 1;
                        Settle::Done
                    }
                    Ok(Err(err)) if err.is_rate_limited() && item.attempts < self.config.max_retries => {
                        item.attempts += 1;
                        inner.stats.rate_limited += 1;
                        inner.stats.retried += 1;
                        Settle::Retry
                    }
                    Ok(Err(err)) => {
                        if err.is_rate_limited() {
                            inner.stats.rate_limited += 1;
                        }
                        inner.stats.failed += 1;
                        Settle::Reject(QueueError::Operation(err))
                    }
                    Err(_) => {
                        inner.stats.panicked += 1;
                        Settle::Reject(QueueError::Panicked)
                    }
                }
            };

            match settle {
                Settle::Done => {
                    debug!(id = item.id, "SerialRequestQueue::drive: succeeded");
                }
                Settle::Retry => {
                    warn!(
                        id = item.id,
                        attempt = item.attempts,
                        max_retries = self.config.max_retries,
                        retry_delay = ?self.config.retry_delay(),
                        "Rate limit hit, retrying"
                    );
                    // Still executing: nothing else may start during the delay
                    tokio::time::sleep(self.config.retry_delay()).await;
                    self.lock().pending.push_front(item);
                }
                Settle::Reject(err) => {
                    if matches!(err, QueueError::Panicked) {
                        warn!(id = item.id, "Queued operation panicked");
                    } else {
                        debug!(id = item.id, attempts = item.attempts, "SerialRequestQueue::drive: failed");
                    }
                    item.job.reject(err);
                }
            }
        }
    }

    /// Time left before the next attempt may start
    fn pacing_delay(&self) -> Duration {
        let inner = self.lock();
        match inner.last_completion {
            Some(last) => match last.checked_add(self.config.min_interval()) {
                Some(ready) => ready.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            },
            None => Duration::ZERO,
        }
    }

    /// Pop the head item, or go idle if there is none
    fn next_item(&self) -> Option<QueueItem<E>> {
        let mut inner = self.lock();
        let item = inner.pending.pop_front();
        if item.is_none() {
            inner.executing = false;
        }
        item
    }
}

/// Settles the queue if its driver goes away without draining it
///
/// Runtime shutdown or an aborted task drops the driver mid-loop. Waiting
/// callers then get `QueueError::Closed` and the queue returns to idle, so a
/// later `submit` starts a fresh driver.
struct DriverGuard<E> {
    shared: Arc<Shared<E>>,
    armed: bool,
}

impl<E> Drop for DriverGuard<E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let orphaned: Vec<QueueItem<E>> = {
            let mut inner = self.shared.lock();
            inner.executing = false;
            inner.pending.drain(..).collect()
        };

        warn!(orphaned = orphaned.len(), "Request queue driver dropped, closing pending requests");
        for mut item in orphaned {
            item.job.reject(QueueError::Closed);
        }
    }
}
