//! Analysis result types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One step of a worked solution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub title: String,
    pub description: String,

    /// Question that prompts the student before the hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint_question: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Step {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            hint_question: None,
            hint: None,
        }
    }

    pub fn with_hint(mut self, question: impl Into<String>, hint: impl Into<String>) -> Self {
        self.hint_question = Some(question.into());
        self.hint = Some(hint.into());
        self
    }
}

/// School level an explanation is pitched at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeLevel {
    Elementary,
    Middle,
    High,
    College,
}

impl fmt::Display for GradeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GradeLevel::Elementary => "elementary",
            GradeLevel::Middle => "middle school",
            GradeLevel::High => "high school",
            GradeLevel::College => "college",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for GradeLevel {
    type Err = String;

    /// Lenient parse of what models write: "high school", "Grade 3", "middle", "university"...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();

        if let Some(grade) = lower
            .strip_prefix("grade")
            .and_then(|rest| rest.trim().split(|c: char| !c.is_ascii_digit()).next())
            .and_then(|n| n.parse::<u32>().ok())
        {
            return match grade {
                0..=5 => Ok(GradeLevel::Elementary),
                6..=8 => Ok(GradeLevel::Middle),
                9..=12 => Ok(GradeLevel::High),
                _ => Ok(GradeLevel::College),
            };
        }

        if lower.starts_with("elementary") || lower.starts_with("primary") || lower == "kindergarten" {
            Ok(GradeLevel::Elementary)
        } else if lower.starts_with("middle") || lower.starts_with("junior high") {
            Ok(GradeLevel::Middle)
        } else if lower.starts_with("high") || lower.starts_with("secondary") {
            Ok(GradeLevel::High)
        } else if lower.starts_with("college") || lower.starts_with("university") || lower.starts_with("undergrad") {
            Ok(GradeLevel::College)
        } else {
            Err(format!("Unrecognized grade level: '{}'", s))
        }
    }
}

/// A grade-level-adapted explanation of one problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemAnalysis {
    /// Short label, e.g. "Quadratic Equation"
    pub problem_type: String,
    pub overview: String,
    pub steps: Vec<Step>,
    pub detailed_explanation: String,
    pub solution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<GradeLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_level_words() {
        assert_eq!("high school".parse::<GradeLevel>(), Ok(GradeLevel::High));
        assert_eq!("Middle".parse::<GradeLevel>(), Ok(GradeLevel::Middle));
        assert_eq!("elementary".parse::<GradeLevel>(), Ok(GradeLevel::Elementary));
        assert_eq!("College".parse::<GradeLevel>(), Ok(GradeLevel::College));
        assert_eq!("university".parse::<GradeLevel>(), Ok(GradeLevel::College));
    }

    #[test]
    fn test_grade_level_numbers() {
        assert_eq!("Grade 3".parse::<GradeLevel>(), Ok(GradeLevel::Elementary));
        assert_eq!("grade 7".parse::<GradeLevel>(), Ok(GradeLevel::Middle));
        assert_eq!("Grade 11-12".parse::<GradeLevel>(), Ok(GradeLevel::High));
    }

    #[test]
    fn test_grade_level_unknown() {
        assert!("graduate seminar".parse::<GradeLevel>().is_err());
        assert!("".parse::<GradeLevel>().is_err());
    }

    #[test]
    fn test_step_serializes_camel_case() {
        let step = Step::new("Isolate x", "Subtract 3 from both sides").with_hint("What undoes +3?", "Subtract 3");
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["hintQuestion"], "What undoes +3?");
        assert_eq!(json["hint"], "Subtract 3");

        let bare = serde_json::to_value(Step::new("a", "b")).unwrap();
        assert!(bare.get("hint").is_none());
    }
}
