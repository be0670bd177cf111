//! LLM-backed problem analysis through the request queue

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::fallback::fallback_analysis;
use super::types::{GradeLevel, ProblemAnalysis, Step};
use crate::config::{AnalysisConfig, LlmConfig};
use crate::llm::{CompletionRequest, LlmClient, LlmError, Message};
use crate::queue::{QueueError, SerialRequestQueue};

const SYSTEM_PROMPT: &str = "You are an expert tutor. Identify the grade level a homework problem belongs to \
                             (elementary, middle school, high school, college) and explain it with vocabulary and \
                             depth suited to a student at that level. Reply with a single JSON object only.";

/// Errors from analysing a problem
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Problem text is empty")]
    EmptyProblem,

    #[error("LLM request failed: {0}")]
    Queue(#[from] QueueError<LlmError>),

    #[error("No content returned from the model")]
    EmptyResponse,

    #[error("Response is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid response structure: {0}")]
    InvalidStructure(String),
}

/// Turns problem text into a step-by-step explanation
///
/// Every model call goes through the shared request queue, so concurrent
/// analyses never hit the API at the same time.
pub struct Analyzer {
    llm: Option<Arc<dyn LlmClient>>,
    queue: SerialRequestQueue<LlmError>,
    llm_config: LlmConfig,
    config: AnalysisConfig,
}

impl Analyzer {
    /// Create an analyzer; with no client every analysis is the offline fallback
    pub fn new(
        llm: Option<Arc<dyn LlmClient>>,
        queue: SerialRequestQueue<LlmError>,
        llm_config: LlmConfig,
        config: AnalysisConfig,
    ) -> Self {
        debug!(has_llm = llm.is_some(), ?config, "Analyzer::new: called");
        Self {
            llm,
            queue,
            llm_config,
            config,
        }
    }

    /// The queue model calls are serialized through
    pub fn queue(&self) -> &SerialRequestQueue<LlmError> {
        &self.queue
    }

    /// Analyse one problem
    pub async fn analyze(&self, problem_text: &str) -> Result<ProblemAnalysis, AnalysisError> {
        debug!(text_len = problem_text.len(), "Analyzer::analyze: called");
        let problem_text = problem_text.trim();
        if problem_text.is_empty() {
            return Err(AnalysisError::EmptyProblem);
        }

        let Some(llm) = &self.llm else {
            debug!("Analyzer::analyze: no LLM client, using fallback");
            return Ok(fallback_analysis(problem_text));
        };

        match self.analyze_with_llm(llm.clone(), problem_text).await {
            Ok(analysis) => {
                if let Some(level) = analysis.grade_level {
                    info!("Detected grade level: {}", level);
                }
                Ok(analysis)
            }
            Err(e) if self.config.fallback_on_error => {
                warn!(error = %e, "LLM analysis failed, using fallback");
                Ok(fallback_analysis(problem_text))
            }
            Err(e) => Err(e),
        }
    }

    async fn analyze_with_llm(
        &self,
        llm: Arc<dyn LlmClient>,
        problem_text: &str,
    ) -> Result<ProblemAnalysis, AnalysisError> {
        let request = self.build_request(problem_text);

        let response = self
            .queue
            .submit(move || {
                let llm = llm.clone();
                let request = request.clone();
                async move { llm.complete(request).await }
            })
            .await?;

        debug!(usage = ?response.usage, "Analyzer::analyze_with_llm: response received");
        let content = response.content.ok_or(AnalysisError::EmptyResponse)?;
        parse_analysis(&content)
    }

    fn build_request(&self, problem_text: &str) -> CompletionRequest {
        let prompt = format!(
            r#"Analyze this homework problem: "{problem_text}"

First decide the grade level it is appropriate for, then explain it for a student at that level.

Respond in exactly this JSON structure:
{{
  "gradeLevel": "elementary | middle | high | college",
  "problemType": "short description of the problem type",
  "overview": "brief explanation of the approach",
  "steps": [
    {{
      "title": "step title",
      "description": "explanation of this step",
      "hintQuestion": "optional question that prompts thinking",
      "hint": "optional hint"
    }}
  ],
  "detailedExplanation": "how this connects to broader concepts",
  "solution": "the final answer with work shown"
}}"#
        );

        CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            messages: vec![Message::user(prompt)],
            max_tokens: self.llm_config.max_tokens,
            temperature: self.llm_config.temperature,
            json_mode: true,
        }
    }
}

/// Model output before validation; every field may be missing
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawAnalysis {
    grade_level: Option<String>,
    problem_type: Option<String>,
    overview: Option<String>,
    steps: Option<Vec<Step>>,
    detailed_explanation: Option<String>,
    solution: Option<String>,
}

/// Parse and validate the model's JSON reply
pub fn parse_analysis(content: &str) -> Result<ProblemAnalysis, AnalysisError> {
    debug!(content_len = content.len(), "parse_analysis: called");
    let raw: RawAnalysis = serde_json::from_str(content)?;

    let required = |field: Option<String>, name: &str| -> Result<String, AnalysisError> {
        field
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AnalysisError::InvalidStructure(format!("missing {}", name)))
    };

    let grade_level = raw.grade_level.as_deref().and_then(|g| match g.parse::<GradeLevel>() {
        Ok(level) => Some(level),
        Err(e) => {
            debug!(error = %e, "parse_analysis: ignoring grade level");
            None
        }
    });

    Ok(ProblemAnalysis {
        problem_type: required(raw.problem_type, "problemType")?,
        overview: required(raw.overview, "overview")?,
        steps: raw
            .steps
            .ok_or_else(|| AnalysisError::InvalidStructure("missing steps".to_string()))?,
        detailed_explanation: required(raw.detailed_explanation, "detailedExplanation")?,
        solution: required(raw.solution, "solution")?,
        grade_level,
    })
}
