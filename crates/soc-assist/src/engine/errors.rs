use std::path::PathBuf;

use serde::Serialize;

use super::domain::{ModuleId, OptionId, QuestionId, RuleId, SeverityLevel};

/// Caller-supplied answers reference questions or options the configuration does not define.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("answer set rejected: {}", join(.problems))]
pub struct ValidationError {
    pub problems: Vec<AnswerProblem>,
}

/// Single malformed answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerProblem {
    #[error("unknown question {question}")]
    UnknownQuestion { question: QuestionId },
    #[error("question {question} has no option {option}")]
    UnknownOption {
        question: QuestionId,
        option: OptionId,
    },
}

/// Configuration documents are rejected as a whole; `Invalid` lists every violation found.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("configuration rejected with {} violation(s): {}", .0.len(), join(.0))]
    Invalid(Vec<ConfigViolation>),
    #[error("configuration document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unable to read configuration document {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ConfigurationError {
    pub fn violations(&self) -> &[ConfigViolation] {
        match self {
            ConfigurationError::Invalid(violations) => violations,
            _ => &[],
        }
    }
}

/// Individual problem found while validating a configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigViolation {
    #[error("weight bounds [{min}, {max}] must be positive and increasing")]
    InvalidWeightBounds { min: f64, max: f64 },
    #[error("module {module} is defined more than once")]
    DuplicateModule { module: ModuleId },
    #[error("question {question} is defined more than once")]
    DuplicateQuestion { question: QuestionId },
    #[error("question {question} defines option {option} more than once")]
    DuplicateOption {
        question: QuestionId,
        option: OptionId,
    },
    #[error("question {question} has no answer options")]
    NoOptions { question: QuestionId },
    #[error("question {question} references nonexistent module {module}")]
    UnknownModule {
        question: QuestionId,
        module: ModuleId,
    },
    #[error("module {module} lists nonexistent question {question}")]
    ModuleListsUnknownQuestion {
        module: ModuleId,
        question: QuestionId,
    },
    #[error("module {module} lists question {question} more than once")]
    DuplicateModuleQuestion {
        module: ModuleId,
        question: QuestionId,
    },
    #[error("module {module} lists question {question} which belongs to another module")]
    QuestionModuleMismatch {
        module: ModuleId,
        question: QuestionId,
    },
    #[error("question {question} is not listed by its module {module}")]
    QuestionNotListed {
        question: QuestionId,
        module: ModuleId,
    },
    #[error("{target} weight {weight} outside bounds [{min}, {max}]")]
    WeightOutOfBounds {
        target: String,
        weight: f64,
        min: f64,
        max: f64,
    },
    #[error("expected {expected} threshold boundaries, found {found}")]
    ThresholdCount { expected: usize, found: usize },
    #[error("threshold position {position} must be {expected}, found {found}")]
    ThresholdOrder {
        position: usize,
        expected: SeverityLevel,
        found: SeverityLevel,
    },
    #[error("threshold for {level} must be a finite number")]
    NonFiniteThreshold { level: SeverityLevel },
    #[error("threshold for {level} ({min}) must exceed the previous boundary ({previous})")]
    ThresholdNotIncreasing {
        level: SeverityLevel,
        min: f64,
        previous: f64,
    },
    #[error("lowest threshold must start at 0 to cover every score, found {min}")]
    ThresholdNotExhaustive { min: f64 },
    #[error("rule {rule} is defined more than once")]
    DuplicateRule { rule: RuleId },
    #[error("rule {rule} references unknown question {question}")]
    UnknownPredicateQuestion { rule: RuleId, question: QuestionId },
    #[error("rule {rule} references unknown option {option} of question {question}")]
    UnknownPredicateOption {
        rule: RuleId,
        question: QuestionId,
        option: OptionId,
    },
    #[error("rule {rule} has a malformed predicate: {problem}")]
    MalformedPredicate { rule: RuleId, problem: String },
    #[error("multiplier {rule} factor {factor} must be a finite number greater than 1.0")]
    InvalidFactor { rule: RuleId, factor: f64 },
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
