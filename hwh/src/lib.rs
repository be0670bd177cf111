//! Homework Helper - grade-level explanations for homework problems
//!
//! Problem text is sent to a chat-completion model which picks the grade
//! level and explains the problem step by step at that level. Every model
//! call goes through one [`SerialRequestQueue`], so bursts of problems reach
//! the API one at a time and rate limits are retried instead of failing.
//!
//! # Modules
//!
//! - [`queue`] - Single-lane request queue with pacing and rate-limit retry
//! - [`llm`] - LLM client trait and OpenAI implementation
//! - [`analysis`] - Prompting, response parsing and offline fallback
//! - [`store`] - In-memory record of analysed problems
//! - [`service`] - Solve and revise problems end to end
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod analysis;
pub mod cli;
pub mod config;
pub mod llm;
pub mod queue;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use analysis::{AnalysisError, Analyzer, GradeLevel, ProblemAnalysis, Step};
pub use config::{AnalysisConfig, Config, LlmConfig};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient, create_client};
pub use queue::{QueueConfig, QueueError, QueueState, QueueStats, RateLimitSignal, SerialRequestQueue};
pub use service::{HomeworkService, ServiceError};
pub use store::{HomeworkProblem, NewProblem, ProblemStore, StoreError};
