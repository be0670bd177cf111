//! Homework service: analyse problems and keep the results

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::{AnalysisError, Analyzer};
use crate::store::{HomeworkProblem, NewProblem, ProblemStore, StoreError};

/// Errors from the homework service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Could not find any problem text")]
    NoText,

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Solves and revises problems
///
/// Library API for long-lived hosts. The `hwh` binary is one-shot and only
/// uses `solve` and `list`; `revise` and `get` serve callers that keep the
/// service and its store alive between requests. Callers hold it in an `Arc`
/// and call it concurrently; model calls are serialized by the analyzer's
/// queue.
pub struct HomeworkService {
    analyzer: Analyzer,
    store: Arc<ProblemStore>,
}

impl HomeworkService {
    pub fn new(analyzer: Analyzer, store: Arc<ProblemStore>) -> Self {
        Self { analyzer, store }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Analyse new problem text and store the result
    pub async fn solve(&self, source: &str, text: &str) -> Result<HomeworkProblem, ServiceError> {
        debug!(%source, text_len = text.len(), "HomeworkService::solve: called");
        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::NoText);
        }

        let analysis = self.analyzer.analyze(text).await?;
        let problem = self
            .store
            .create(NewProblem {
                source: source.to_string(),
                detected_text: text.to_string(),
                analysis,
            })
            .await;

        info!(id = problem.id, problem_type = %problem.problem_type, "Created problem");
        Ok(problem)
    }

    /// Replace a problem's text and analyse it again
    pub async fn revise(&self, id: u64, text: &str) -> Result<HomeworkProblem, ServiceError> {
        debug!(id, text_len = text.len(), "HomeworkService::revise: called");
        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::NoText);
        }

        self.store.update_text(id, text).await?;
        let analysis = self.analyzer.analyze(text).await?;
        let problem = self.store.update_analysis(id, &analysis).await?;

        info!(id, problem_type = %problem.problem_type, "Revised problem");
        Ok(problem)
    }

    pub async fn get(&self, id: u64) -> Result<HomeworkProblem, ServiceError> {
        self.store.get(id).await.ok_or(ServiceError::Store(StoreError::NotFound(id)))
    }

    pub async fn list(&self) -> Vec<HomeworkProblem> {
        self.store.list().await
    }
}
