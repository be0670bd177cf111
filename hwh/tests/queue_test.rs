//! Integration tests for the serial request queue
//!
//! Most tests pause time, so pacing and retry delays are measured on Tokio's
//! virtual clock and the tests run instantly.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use homework_helper::queue::{QueueConfig, QueueError, RateLimitSignal, SerialRequestQueue};
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error, PartialEq)]
enum ApiError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("quota exceeded")]
    QuotaExceeded,
}

impl RateLimitSignal for ApiError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::Status(429) | ApiError::QuotaExceeded)
    }
}

fn queue(min_interval_ms: u64, max_retries: u32, retry_delay_ms: u64) -> SerialRequestQueue<ApiError> {
    SerialRequestQueue::new(QueueConfig::new(
        Duration::from_millis(min_interval_ms),
        max_retries,
        Duration::from_millis(retry_delay_ms),
    ))
}

/// Shared, ordered record of what the operations did
#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {event} not recorded"))
    }
}

// =============================================================================
// Ordering and concurrency
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_at_most_one_operation_in_flight() {
    let queue = queue(10, 1, 10);
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            queue.submit(move || {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(25)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, ApiError>(i)
                }
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_items_start_in_submission_order() {
    let queue = queue(5, 0, 0);
    let log = EventLog::default();

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let log = log.clone();
            queue.submit(move || {
                let log = log.clone();
                async move {
                    log.push(format!("start {i}"));
                    Ok::<_, ApiError>(i)
                }
            })
        })
        .collect();

    let values: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(values, vec![0, 1, 2, 3, 4]);
    assert_eq!(log.events(), vec!["start 0", "start 1", "start 2", "start 3", "start 4"]);
}

#[tokio::test(start_paused = true)]
async fn test_requests_are_enqueued_when_submitted() {
    let queue = queue(50, 0, 0);
    let log = EventLog::default();

    let make = |name: &'static str| {
        let log = log.clone();
        move || {
            let log = log.clone();
            async move {
                log.push(name);
                Ok::<_, ApiError>(())
            }
        }
    };

    let first = queue.submit(make("first"));
    let second = queue.submit(make("second"));

    // Awaiting out of order does not change execution order
    second.await.unwrap();
    first.await.unwrap();
    assert_eq!(log.events(), vec!["first", "second"]);
}

// =============================================================================
// Pacing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_consecutive_starts_respect_min_interval() {
    let queue = queue(100, 0, 0);
    let starts = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let starts = starts.clone();
            queue.submit(move || {
                let starts = starts.clone();
                async move {
                    starts.lock().unwrap().push(Instant::now());
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok::<_, ApiError>(())
                }
            })
        })
        .collect();
    futures::future::join_all(handles).await;

    let starts = starts.lock().unwrap();
    assert_eq!(starts.len(), 4);
    for pair in starts.windows(2) {
        // Interval is measured from the previous completion, so gaps include the 30ms run time
        assert!(pair[1] - pair[0] >= Duration::from_millis(130), "gap was {:?}", pair[1] - pair[0]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_idle_queue_starts_without_waiting() {
    let queue = queue(100, 0, 0);

    let begin = Instant::now();
    queue.submit(|| async { Ok::<_, ApiError>(()) }).await.unwrap();
    assert!(begin.elapsed() < Duration::from_millis(100));

    // Long after the last completion the interval has already passed
    tokio::time::sleep(Duration::from_millis(500)).await;
    let begin = Instant::now();
    queue.submit(|| async { Ok::<_, ApiError>(()) }).await.unwrap();
    assert!(begin.elapsed() < Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_pacing_applies_across_idle_periods() {
    let queue = queue(100, 0, 0);
    queue.submit(|| async { Ok::<_, ApiError>(()) }).await.unwrap();

    // The queue went idle, but the next request still waits out the interval
    let begin = Instant::now();
    queue.submit(|| async { Ok::<_, ApiError>(()) }).await.unwrap();
    assert!(begin.elapsed() >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_does_not_wait() {
    let queue = queue(0, 0, 0);
    let begin = Instant::now();
    for _ in 0..3 {
        queue.submit(|| async { Ok::<_, ApiError>(()) }).await.unwrap();
    }
    assert_eq!(begin.elapsed(), Duration::ZERO);
}

// =============================================================================
// Retry
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_retry_goes_ahead_of_waiting_items() {
    let queue = queue(10, 3, 10);
    let log = EventLog::default();
    let a_calls = Arc::new(AtomicU32::new(0));

    let a = {
        let log = log.clone();
        let a_calls = a_calls.clone();
        queue.submit(move || {
            let log = log.clone();
            let n = a_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                log.push(format!("A{n}"));
                if n == 0 { Err(ApiError::Status(429)) } else { Ok("A") }
            }
        })
    };
    let b = {
        let log = log.clone();
        queue.submit(move || {
            let log = log.clone();
            async move {
                log.push("B");
                Ok::<_, ApiError>("B")
            }
        })
    };

    assert_eq!(a.await.unwrap(), "A");
    assert_eq!(b.await.unwrap(), "B");
    assert_eq!(log.events(), vec!["A0", "A1", "B"]);
}

#[tokio::test(start_paused = true)]
async fn test_arrival_during_retry_delay_waits_for_retry() {
    let queue = queue(10, 2, 50);
    let timeline = Arc::new(Mutex::new(Vec::<(String, Instant)>::new()));
    let a_failed = Arc::new(tokio::sync::Notify::new());
    let a_calls = Arc::new(AtomicU32::new(0));

    let a = {
        let timeline = timeline.clone();
        let a_failed = a_failed.clone();
        queue.submit(move || {
            let timeline = timeline.clone();
            let a_failed = a_failed.clone();
            let n = a_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    timeline.lock().unwrap().push(("A0 end".to_string(), Instant::now()));
                    a_failed.notify_one();
                    Err(ApiError::Status(429))
                } else {
                    timeline.lock().unwrap().push(("A1 start".to_string(), Instant::now()));
                    Ok("A")
                }
            }
        })
    };

    // Arrive 5ms into the 50ms retry delay
    a_failed.notified().await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let state = queue.queue_state();
    assert!(state.executing);
    assert_eq!(state.pending, 0);

    let b = {
        let timeline = timeline.clone();
        queue.submit(move || {
            let timeline = timeline.clone();
            async move {
                timeline.lock().unwrap().push(("B start".to_string(), Instant::now()));
                Ok::<_, ApiError>("B")
            }
        })
    };

    assert_eq!(a.await.unwrap(), "A");
    assert_eq!(b.await.unwrap(), "B");

    let timeline = timeline.lock().unwrap();
    let names: Vec<_> = timeline.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["A0 end", "A1 start", "B start"]);

    let gap = timeline[1].1 - timeline[0].1;
    assert!(gap >= Duration::from_millis(50), "retry gap was {:?}", gap);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_retried_exactly_max_retries_times() {
    let queue = queue(10, 2, 10);
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    let result = queue
        .submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ApiError::Status(429)) }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match result {
        Err(QueueError::Operation(e)) => assert_eq!(e, ApiError::Status(429)),
        other => panic!("expected the rate-limit error, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_quota_exceeded_counts_as_rate_limit() {
    let queue = queue(10, 1, 10);
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    let result = queue
        .submit(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { if n == 0 { Err(ApiError::QuotaExceeded) } else { Ok(n) } }
        })
        .await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(queue.queue_state().stats.retried, 1);
}

#[tokio::test(start_paused = true)]
async fn test_zero_max_retries_fails_on_first_rate_limit() {
    let queue = queue(10, 0, 1000);
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    let begin = Instant::now();
    let result = queue
        .submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ApiError::Status(429)) }
        })
        .await;

    assert!(result.unwrap_err().is_rate_limited());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(begin.elapsed() < Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_other_errors_are_delivered_on_first_attempt() {
    let queue = queue(100, 3, 1000);
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    let begin = Instant::now();
    let result = queue
        .submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ApiError::Status(500)) }
        })
        .await;

    assert!(matches!(result, Err(QueueError::Operation(ApiError::Status(500)))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // No retry delay was taken
    assert!(begin.elapsed() < Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_three_item_scenario() {
    let queue = queue(100, 2, 50);
    let log = EventLog::default();
    let item2_calls = Arc::new(AtomicU32::new(0));
    let begin = Instant::now();

    let item1 = {
        let log = log.clone();
        queue.submit(move || {
            let log = log.clone();
            async move {
                log.push("item1 start");
                tokio::time::sleep(Duration::from_millis(10)).await;
                log.push("item1 done");
                Ok::<_, ApiError>(1)
            }
        })
    };
    let item2 = {
        let log = log.clone();
        let calls = item2_calls.clone();
        queue.submit(move || {
            let log = log.clone();
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    log.push(format!("item2 rate limited {n}"));
                    Err(ApiError::Status(429))
                } else {
                    log.push("item2 done");
                    Ok(2)
                }
            }
        })
    };
    let item3 = {
        let log = log.clone();
        queue.submit(move || {
            let log = log.clone();
            async move {
                log.push("item3 start");
                Ok::<_, ApiError>(3)
            }
        })
    };

    let (r1, r2, r3) = tokio::join!(item1, item2, item3);
    let elapsed = begin.elapsed();

    assert_eq!(r1.unwrap(), 1);
    assert_eq!(r2.unwrap(), 2);
    assert_eq!(r3.unwrap(), 3);
    assert_eq!(item2_calls.load(Ordering::SeqCst), 3);

    assert!(log.position("item1 done") < log.position("item2 rate limited 0"));
    assert!(log.position("item2 done") < log.position("item3 start"));

    // 100 pacing + 2 x 50 retry delay + 2 x 100 pacing before the retries and item3
    assert!(elapsed >= Duration::from_millis(400), "elapsed {:?}", elapsed);
}

// =============================================================================
// Isolation and wrappers
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_panicking_operation_does_not_stall_queue() {
    let queue = queue(10, 0, 0);

    let panicked = queue.submit(|| async {
        if true {
            panic!("operation blew up");
        }
        Ok::<(), ApiError>(())
    });
    let next = queue.submit(|| async { Ok::<_, ApiError>("still running") });

    assert!(matches!(panicked.await, Err(QueueError::Panicked)));
    assert_eq!(next.await.unwrap(), "still running");
    assert_eq!(queue.queue_state().stats.panicked, 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_wrapper_gives_up_without_cancelling() {
    let queue = queue(10, 0, 0);
    let ran = Arc::new(AtomicU32::new(0));

    let counter = ran.clone();
    let result = queue
        .submit_with_timeout(Duration::from_millis(50), move || {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ApiError>(())
            }
        })
        .await;

    assert!(matches!(result, Err(QueueError::TimedOut(d)) if d == Duration::from_millis(50)));

    // The request kept its slot and still completes
    queue.submit(|| async { Ok::<_, ApiError>(()) }).await.unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_caller_does_not_block_later_items() {
    let queue = queue(10, 0, 0);
    let ran = Arc::new(AtomicU32::new(0));

    let counter = ran.clone();
    drop(queue.submit(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, ApiError>(()) }
    }));

    queue.submit(|| async { Ok::<_, ApiError>(()) }).await.unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn test_runtime_shutdown_settles_waiting_callers() {
    let queue = queue(10, 0, 0);
    let first_runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    let (stuck, waiting) = first_runtime.block_on(async {
        let stuck = queue.submit(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, ApiError>("never")
        });
        let waiting = queue.submit(|| async { Ok::<_, ApiError>("never either") });

        // Let the driver pick up the first request
        tokio::task::yield_now().await;
        (stuck, waiting)
    });
    drop(first_runtime);

    let state = queue.queue_state();
    assert!(!state.executing);
    assert_eq!(state.pending, 0);

    let second_runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    second_runtime.block_on(async {
        assert!(matches!(stuck.await, Err(QueueError::Closed)));
        assert!(matches!(waiting.await, Err(QueueError::Closed)));

        let fresh = queue.submit(|| async { Ok::<_, ApiError>("ran") });
        let result = tokio::time::timeout(Duration::from_secs(5), fresh)
            .await
            .expect("queue stayed stuck after shutdown");
        assert_eq!(result.unwrap(), "ran");
    });
}

#[tokio::test(start_paused = true)]
async fn test_independent_queues_do_not_pace_each_other() {
    let first = queue(1000, 0, 0);
    let second = queue(1000, 0, 0);

    first.submit(|| async { Ok::<_, ApiError>(()) }).await.unwrap();

    let begin = Instant::now();
    second.submit(|| async { Ok::<_, ApiError>(()) }).await.unwrap();
    assert!(begin.elapsed() < Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_stats_track_outcomes() {
    let queue = queue(10, 1, 10);

    let ok = queue.submit(|| async { Ok::<_, ApiError>(()) });
    let bad = queue.submit(|| async { Err::<(), _>(ApiError::Status(400)) });
    let limited = queue.submit(|| async { Err::<(), _>(ApiError::Status(429)) });

    let (ok, bad, limited) = tokio::join!(ok, bad, limited);
    assert!(ok.is_ok());
    assert!(bad.is_err());
    assert!(limited.is_err());

    let stats = queue.queue_state().stats;
    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.rate_limited, 2);
    assert_eq!(stats.peak_pending, 3);
}
