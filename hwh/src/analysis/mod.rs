//! Homework problem analysis
//!
//! Produces grade-level-adapted, step-by-step explanations, either from the
//! LLM (through the request queue) or from the offline fallback.

mod analyzer;
mod fallback;
mod types;

pub use analyzer::{AnalysisError, Analyzer, parse_analysis};
pub use fallback::{FallbackKind, classify, fallback_analysis};
pub use types::{GradeLevel, ProblemAnalysis, Step};
