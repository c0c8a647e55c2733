use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier wrapper for questionnaire questions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub String);

/// Identifier of an answer option, unique within its question.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(pub String);

/// Identifier wrapper for question modules.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub String);

/// Identifier shared by hard rules and multipliers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub String);

macro_rules! display_id {
    ($($name:ident),*) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $name {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }
        )*
    };
}

display_id!(QuestionId, OptionId, ModuleId, RuleId);

/// Severity levels in ascending order of seriousness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityLevel {
    Informative,
    Suspicious,
    Incident,
    Critical,
    Breach,
}

impl SeverityLevel {
    pub const COUNT: usize = 5;

    pub const fn ordered() -> [SeverityLevel; Self::COUNT] {
        [
            SeverityLevel::Informative,
            SeverityLevel::Suspicious,
            SeverityLevel::Incident,
            SeverityLevel::Critical,
            SeverityLevel::Breach,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            SeverityLevel::Informative => "Informative",
            SeverityLevel::Suspicious => "Suspicious",
            SeverityLevel::Incident => "Incident",
            SeverityLevel::Critical => "Critical",
            SeverityLevel::Breach => "Confirmed breach",
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Critical and breach classifications are handed to the escalation path.
    pub const fn requires_escalation(self) -> bool {
        matches!(self, SeverityLevel::Critical | SeverityLevel::Breach)
    }

    pub(crate) fn default_recommendation(self) -> &'static str {
        match self {
            SeverityLevel::Informative => {
                "Document the event and close it; no containment is required."
            }
            SeverityLevel::Suspicious => {
                "Keep the event under observation and gather additional telemetry."
            }
            SeverityLevel::Incident => {
                "Open an incident, assign an analyst and start containment of affected assets."
            }
            SeverityLevel::Critical => {
                "Escalate to the incident response lead and isolate affected systems immediately."
            }
            SeverityLevel::Breach => {
                "Activate the breach response plan, notify management and preserve evidence."
            }
        }
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Analyst answers keyed by question. Partial sets are valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSet(pub BTreeMap<QuestionId, OptionId>);

impl AnswerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, question: &str, option: &str) -> Self {
        self.insert(question, option);
        self
    }

    pub fn insert(&mut self, question: &str, option: &str) {
        self.0
            .insert(QuestionId(question.to_string()), OptionId(option.to_string()));
    }

    pub fn get(&self, question: &QuestionId) -> Option<&OptionId> {
        self.0.get(question)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &OptionId)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(QuestionId, OptionId)> for AnswerSet {
    fn from_iter<T: IntoIterator<Item = (QuestionId, OptionId)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Whether a question contributed to the score or was left blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerState {
    Answered,
    Unanswered,
}

/// One question's share of the raw score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub question_id: QuestionId,
    pub module_id: ModuleId,
    pub state: AnswerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_id: Option<OptionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_label: Option<String>,
    pub raw_score: i32,
    pub question_weight: f64,
    pub module_weight: f64,
    pub contribution: f64,
    /// Percentage of the raw score; zero when the raw score is not positive.
    pub share: f64,
}

/// Hard rule whose predicate matched the answer set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredRule {
    pub rule_id: RuleId,
    pub description: String,
    pub minimum_level: SeverityLevel,
    pub minimum_score: f64,
    /// False when the weighted score already met the floor.
    pub raised_score: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Multiplier whose predicate matched the answer set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveMultiplier {
    pub multiplier_id: RuleId,
    pub description: String,
    pub factor: f64,
}

/// Immutable evaluation output, traceable to the configuration version used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    pub config_version: u64,
    pub raw_score: f64,
    pub floored_score: f64,
    pub final_score: f64,
    pub level: SeverityLevel,
    pub breakdown: Vec<Contribution>,
    pub module_scores: BTreeMap<ModuleId, f64>,
    pub triggered_rules: Vec<TriggeredRule>,
    pub active_multipliers: Vec<ActiveMultiplier>,
    pub recommendation: String,
    pub escalate: bool,
}

impl ScoringResult {
    /// Product of all active multiplier factors; `1.0` when none matched.
    pub fn combined_factor(&self) -> f64 {
        ordered_product(self.active_multipliers.iter().map(|m| m.factor))
    }

    pub fn answered(&self) -> impl Iterator<Item = &Contribution> {
        self.breakdown
            .iter()
            .filter(|entry| entry.state == AnswerState::Answered)
    }
}

/// Multiplies factors in ascending order so the result depends only on the set of factors.
pub(crate) fn ordered_product(factors: impl IntoIterator<Item = f64>) -> f64 {
    let mut factors: Vec<f64> = factors.into_iter().collect();
    factors.sort_by(f64::total_cmp);
    factors.into_iter().product()
}
