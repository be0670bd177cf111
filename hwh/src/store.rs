//! In-memory store of analysed problems

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::analysis::{GradeLevel, ProblemAnalysis, Step};

/// Errors from the problem store
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Problem with ID {0} not found")]
    NotFound(u64),
}

/// A stored problem together with its latest analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeworkProblem {
    pub id: u64,

    /// Where the text came from (file name, "stdin", "argument")
    pub source: String,

    pub detected_text: String,
    pub problem_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<GradeLevel>,
    pub overview: String,
    pub steps: Vec<Step>,
    pub detailed_explanation: String,
    pub solution: String,
    pub created_at: DateTime<Utc>,
}

impl HomeworkProblem {
    fn apply(&mut self, analysis: &ProblemAnalysis) {
        self.problem_type = analysis.problem_type.clone();
        self.grade_level = analysis.grade_level;
        self.overview = analysis.overview.clone();
        self.steps = analysis.steps.clone();
        self.detailed_explanation = analysis.detailed_explanation.clone();
        self.solution = analysis.solution.clone();
    }

    /// The analysis part of this problem
    pub fn analysis(&self) -> ProblemAnalysis {
        ProblemAnalysis {
            problem_type: self.problem_type.clone(),
            overview: self.overview.clone(),
            steps: self.steps.clone(),
            detailed_explanation: self.detailed_explanation.clone(),
            solution: self.solution.clone(),
            grade_level: self.grade_level,
        }
    }
}

/// Input for creating a problem
#[derive(Debug, Clone)]
pub struct NewProblem {
    pub source: String,
    pub detected_text: String,
    pub analysis: ProblemAnalysis,
}

struct StoreInner {
    problems: BTreeMap<u64, HomeworkProblem>,
    next_id: u64,
}

/// Problems keyed by id; ids start at 1
pub struct ProblemStore {
    inner: RwLock<StoreInner>,
}

impl Default for ProblemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProblemStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                problems: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    pub async fn create(&self, problem: NewProblem) -> HomeworkProblem {
        let mut inner = self.inner.write().await;
        let id = inner.next_id;
        inner.next_id += 1;

        let mut stored = HomeworkProblem {
            id,
            source: problem.source,
            detected_text: problem.detected_text,
            problem_type: String::new(),
            grade_level: None,
            overview: String::new(),
            steps: Vec::new(),
            detailed_explanation: String::new(),
            solution: String::new(),
            created_at: Utc::now(),
        };
        stored.apply(&problem.analysis);

        debug!(id, "ProblemStore::create: stored");
        inner.problems.insert(id, stored.clone());
        stored
    }

    pub async fn get(&self, id: u64) -> Option<HomeworkProblem> {
        self.inner.read().await.problems.get(&id).cloned()
    }

    /// All problems, oldest first
    pub async fn list(&self) -> Vec<HomeworkProblem> {
        self.inner.read().await.problems.values().cloned().collect()
    }

    pub async fn update_text(&self, id: u64, text: &str) -> Result<HomeworkProblem, StoreError> {
        let mut inner = self.inner.write().await;
        let problem = inner.problems.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        problem.detected_text = text.to_string();
        debug!(id, "ProblemStore::update_text: updated");
        Ok(problem.clone())
    }

    pub async fn update_analysis(&self, id: u64, analysis: &ProblemAnalysis) -> Result<HomeworkProblem, StoreError> {
        let mut inner = self.inner.write().await;
        let problem = inner.problems.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        problem.apply(analysis);
        debug!(id, "ProblemStore::update_analysis: updated");
        Ok(problem.clone())
    }
}
