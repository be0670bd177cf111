//! Offline analysis used when no LLM is available
//!
//! Picks a generic walkthrough by keyword so the user still gets a
//! structured explanation.

use tracing::debug;

use super::types::{GradeLevel, ProblemAnalysis, Step};

const WORD_PROBLEM_KEYWORDS: &[&str] = &[
    "how many",
    "theater",
    "audience",
    "scrapbook",
    "hockey",
    "cards",
    "wheels",
    "model cars",
];

const GEOMETRY_KEYWORDS: &[&str] = &["symmetry", "figure", "congruent", "triangle", "draw"];

const EQUATION_MARKERS: &[&str] = &["=", "+", "-", "x", "solve", "equation"];

/// Kind of generic walkthrough to serve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    WordProblem,
    Geometry,
    Equation,
    ElementaryMath,
}

/// Pick a walkthrough by keyword; word problems win over geometry, geometry over equations
pub fn classify(problem_text: &str) -> FallbackKind {
    let text = problem_text.trim();
    let lower = text.to_lowercase();

    if WORD_PROBLEM_KEYWORDS.iter().any(|k| lower.contains(k)) {
        FallbackKind::WordProblem
    } else if GEOMETRY_KEYWORDS.iter().any(|k| lower.contains(k)) {
        FallbackKind::Geometry
    } else if EQUATION_MARKERS.iter().any(|k| text.contains(k)) {
        FallbackKind::Equation
    } else {
        FallbackKind::ElementaryMath
    }
}

/// Build the offline analysis for a problem
pub fn fallback_analysis(problem_text: &str) -> ProblemAnalysis {
    let kind = classify(problem_text);
    debug!(?kind, "fallback_analysis: classified");
    match kind {
        FallbackKind::WordProblem => word_problem(),
        FallbackKind::Geometry => geometry(),
        FallbackKind::Equation => equation(),
        FallbackKind::ElementaryMath => elementary_math(),
    }
}

fn word_problem() -> ProblemAnalysis {
    ProblemAnalysis {
        problem_type: "Word Problem".to_string(),
        overview: "Turn the story into numbers and pick the operation that matches what is happening.".to_string(),
        steps: vec![
            Step::new("Understand the question", "Read the problem and find exactly what you are asked to work out.")
                .with_hint("What is the problem asking for?", "Look for the question mark or words like 'how many'."),
            Step::new("Find the numbers", "Pick out the numbers and how they relate to each other.")
                .with_hint("Which numbers matter?", "Underline each number and what it counts."),
            Step::new("Choose the operation", "Decide whether to add, subtract, multiply or divide.").with_hint(
                "Are you combining, taking away, making groups or sharing?",
                "Adding combines, subtracting takes away, multiplying makes groups, dividing shares.",
            ),
            Step::new("Solve and check", "Write the number sentence, work it out, and check the answer makes sense."),
        ],
        detailed_explanation: "Word problems connect arithmetic to everyday situations. The skill is translating the \
                               words into a number sentence, then checking the result against the story."
            .to_string(),
        solution: "Write one number sentence for the story, solve it, and answer in a full sentence with units."
            .to_string(),
        grade_level: Some(GradeLevel::Elementary),
    }
}

fn geometry() -> ProblemAnalysis {
    ProblemAnalysis {
        problem_type: "Geometry & Symmetry".to_string(),
        overview: "Compare shapes by size and form, and look for lines that split a shape into mirror halves."
            .to_string(),
        steps: vec![
            Step::new("Recall symmetry", "A line of symmetry splits a shape into two halves that mirror each other.")
                .with_hint("If you fold along the line, do the halves match?", "Try folding a paper copy."),
            Step::new("Recall congruence", "Congruent figures have the same size and the same shape."),
            Step::new("Compare each figure", "Check sides and angles one figure at a time against the others."),
            Step::new("Draw your answer", "Mark lines of symmetry or matching figures clearly."),
        ],
        detailed_explanation: "Symmetry and congruence describe when parts of shapes match. They are the base for \
                               later work on transformations and proofs."
            .to_string(),
        solution: "List every line of symmetry found and name each pair of congruent figures.".to_string(),
        grade_level: Some(GradeLevel::Elementary),
    }
}

fn equation() -> ProblemAnalysis {
    ProblemAnalysis {
        problem_type: "Algebraic Equation".to_string(),
        overview: "Isolate the variable by doing the same operation to both sides of the equation.".to_string(),
        steps: vec![
            Step::new("Identify the equation", "Check the highest power of the variable to know which method applies.")
                .with_hint("What is the highest power of x?", "A power of 1 means a linear equation."),
            Step::new("Collect variable terms", "Move every term containing the variable to one side.")
                .with_hint("How do you move a term across?", "Add or subtract it on both sides."),
            Step::new("Collect constants", "Move the plain numbers to the other side."),
            Step::new("Divide by the coefficient", "Divide both sides by the number in front of the variable.")
                .with_hint("If ax = b, what is x?", "x = b / a"),
        ],
        detailed_explanation: "Doing the same thing to both sides keeps an equation balanced, so the solution does \
                               not change while the equation gets simpler."
            .to_string(),
        solution: "Substitute your value back into the original equation to confirm both sides match.".to_string(),
        grade_level: Some(GradeLevel::High),
    }
}

fn elementary_math() -> ProblemAnalysis {
    ProblemAnalysis {
        problem_type: "Elementary Mathematics".to_string(),
        overview: "Work through the problem one small piece at a time.".to_string(),
        steps: vec![
            Step::new("Read carefully", "Read the whole problem twice before starting."),
            Step::new("Plan", "Decide which operation or tool fits what is being asked."),
            Step::new("Work it out", "Show each step so you can find mistakes later."),
            Step::new("Check", "Ask whether the answer is reasonable."),
        ],
        detailed_explanation: "Breaking a problem into small steps makes it easier to solve and to check.".to_string(),
        solution: "Follow the steps above and write the final answer clearly.".to_string(),
        grade_level: Some(GradeLevel::Elementary),
    }
}
