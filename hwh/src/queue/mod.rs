//! Serial request queue for a rate-limited upstream service
//!
//! Runs one request at a time, paces consecutive attempts, and retries
//! rate-limited requests ahead of newer arrivals.

mod config;
mod core;
mod types;

pub use config::QueueConfig;
pub use core::SerialRequestQueue;
pub use types::{QueueError, QueueState, QueueStats, RateLimitSignal};
