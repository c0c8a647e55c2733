//! Feedback calibration of question and module weights.
//!
//! A run reads resolved outcomes, measures how often risk-indicating answers led to a
//! confirmed true positive, and nudges each weight toward or away from that evidence by
//! at most `max_step`. The result is a proposal only: nothing changes until the
//! [`crate::versions::ConfigurationRegistry`] applies it.

pub mod history;


use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{
    AnswerSet, ConfigurationError, EngineConfig, ModuleId, QuestionId, ScoringResult,
};

pub const DEFAULT_TARGET_BASELINE: f64 = 0.5;
pub const DEFAULT_MAX_STEP: f64 = 0.05;
pub const DEFAULT_MIN_SAMPLES: usize = 5;

/// Identifier of an incident owned by the external incident store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(pub String);

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Analyst-confirmed resolution of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroundTruth {
    TruePositive,
    FalsePositive,
    EscalatedTruePositive,
}

impl GroundTruth {
    pub const fn is_true_positive(self) -> bool {
        matches!(
            self,
            GroundTruth::TruePositive | GroundTruth::EscalatedTruePositive
        )
    }
}

/// Past evaluation plus its ground truth. `resolution: None` marks an incident still open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedOutcome {
    pub incident_id: IncidentId,
    pub answers: AnswerSet,
    pub result: ScoringResult,
    #[serde(default)]
    pub resolution: Option<GroundTruth>,
}

/// Tuning constants for one calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSettings {
    /// Precision treated as neutral; above it weights grow, below it they shrink.
    pub target_baseline: f64,
    /// Largest absolute weight change a single run may propose.
    pub max_step: f64,
    /// Risk-indicating samples required before a weight is touched.
    pub min_samples: usize,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            target_baseline: DEFAULT_TARGET_BASELINE,
            max_step: DEFAULT_MAX_STEP,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

impl CalibrationSettings {
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if !(0.0..=1.0).contains(&self.target_baseline) {
            return Err(CalibrationError::InvalidSettings(format!(
                "target baseline {} must lie within [0, 1]",
                self.target_baseline
            )));
        }
        if !self.max_step.is_finite() || self.max_step <= 0.0 {
            return Err(CalibrationError::InvalidSettings(format!(
                "max step {} must be a positive number",
                self.max_step
            )));
        }
        Ok(())
    }
}

/// Weight a calibration run may adjust.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum WeightTarget {
    Question(QuestionId),
    Module(ModuleId),
}

impl fmt::Display for WeightTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightTarget::Question(id) => write!(f, "question {id}"),
            WeightTarget::Module(id) => write!(f, "module {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Adjusted,
    Unchanged,
    InsufficientEvidence,
}

/// One row of the diff report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightChange {
    pub target: WeightTarget,
    pub old_weight: f64,
    pub new_weight: f64,
    /// Resolved outcomes with a risk-indicating answer for this target.
    pub samples: usize,
    pub true_positives: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    pub delta: f64,
    pub status: ChangeStatus,
    pub clamped: bool,
}

/// Non-fatal findings surfaced to the operator alongside the proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationWarning {
    InsufficientEvidence {
        target: WeightTarget,
        samples: usize,
        required: usize,
    },
    BoundsClamped {
        target: WeightTarget,
        proposed: f64,
        bound: f64,
    },
}

/// Operator-facing summary of a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    pub generated_at: DateTime<Utc>,
    pub base_version: u64,
    pub settings: CalibrationSettings,
    pub considered: usize,
    pub unresolved_excluded: usize,
    pub true_positives: usize,
    pub false_positives: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub false_positive_rate: Option<f64>,
    pub adjustments: usize,
    /// Answers referencing questions or options absent from the calibrated configuration.
    pub stale_answers: usize,
    pub question_changes: Vec<WeightChange>,
    pub module_changes: Vec<WeightChange>,
    pub warnings: Vec<CalibrationWarning>,
}

impl DiffReport {
    pub fn changes(&self) -> impl Iterator<Item = &WeightChange> {
        self.question_changes.iter().chain(self.module_changes.iter())
    }

    pub fn adjusted(&self) -> impl Iterator<Item = &WeightChange> {
        self.changes()
            .filter(|change| change.status == ChangeStatus::Adjusted)
    }
}

/// Proposed configuration and the report explaining it. Never active on its own.
#[derive(Debug, Clone)]
pub struct CalibrationProposal {
    pub base_version: u64,
    pub proposed: EngineConfig,
    pub report: DiffReport,
}

/// Cooperative cancellation handle shared with a running calibration.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("invalid calibration settings: {0}")]
    InvalidSettings(String),
    #[error("calibration run was cancelled")]
    Cancelled,
    #[error("calibration task failed: {0}")]
    Interrupted(String),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// `calibrate(config, resolvedOutcomes) -> (proposedConfig, diffReport)`.
pub fn calibrate(
    config: &EngineConfig,
    base_version: u64,
    outcomes: &[ResolvedOutcome],
    settings: &CalibrationSettings,
) -> Result<CalibrationProposal, CalibrationError> {
    calibrate_with_cancel(config, base_version, outcomes, settings, &CancelFlag::new())
}

pub fn calibrate_with_cancel(
    config: &EngineConfig,
    base_version: u64,
    outcomes: &[ResolvedOutcome],
    settings: &CalibrationSettings,
    cancel: &CancelFlag,
) -> Result<CalibrationProposal, CalibrationError> {
    settings.validate()?;

    let resolved: Vec<(&ResolvedOutcome, GroundTruth)> = outcomes
        .iter()
        .filter_map(|outcome| outcome.resolution.map(|truth| (outcome, truth)))
        .collect();
    let unresolved_excluded = outcomes.len() - resolved.len();
    let true_positives = resolved
        .iter()
        .filter(|(_, truth)| truth.is_true_positive())
        .count();
    let false_positives = resolved.len() - true_positives;

    info!(
        base_version,
        considered = resolved.len(),
        unresolved_excluded,
        "calibration run started"
    );

    let stale_answers = resolved
        .iter()
        .flat_map(|(outcome, _)| outcome.answers.iter())
        .filter(|(question_id, option_id)| {
            config
                .question(question_id)
                .and_then(|question| question.option(option_id))
                .is_none()
        })
        .count();
    if stale_answers > 0 {
        warn!(stale_answers, "ignoring answers unknown to the calibrated configuration");
    }

    let bounds = config.weight_bounds();
    let mut warnings = Vec::new();

    let mut question_changes = Vec::with_capacity(config.questions().len());
    for question in config.questions() {
        if cancel.is_cancelled() {
            return Err(CalibrationError::Cancelled);
        }
        let (samples, hits) = tally(&resolved, |answers| {
            answers
                .get(&question.id)
                .is_some_and(|option| question.is_risk_indicating(option))
        });
        question_changes.push(propose(
            WeightTarget::Question(question.id.clone()),
            question.weight,
            samples,
            hits,
            settings,
            |weight| bounds.clamp(weight),
            &mut warnings,
        ));
    }

    let mut module_changes = Vec::with_capacity(config.modules().len());
    for module in config.modules() {
        if cancel.is_cancelled() {
            return Err(CalibrationError::Cancelled);
        }
        let (samples, hits) = tally(&resolved, |answers| {
            config.module_questions(module).any(|question| {
                answers
                    .get(&question.id)
                    .is_some_and(|option| question.is_risk_indicating(option))
            })
        });
        module_changes.push(propose(
            WeightTarget::Module(module.id.clone()),
            module.weight,
            samples,
            hits,
            settings,
            |weight| bounds.clamp(weight),
            &mut warnings,
        ));
    }

    let question_weights: BTreeMap<QuestionId, f64> = question_changes
        .iter()
        .filter_map(|change| match &change.target {
            WeightTarget::Question(id) if change.status == ChangeStatus::Adjusted => {
                Some((id.clone(), change.new_weight))
            }
            _ => None,
        })
        .collect();
    let module_weights: BTreeMap<ModuleId, f64> = module_changes
        .iter()
        .filter_map(|change| match &change.target {
            WeightTarget::Module(id) if change.status == ChangeStatus::Adjusted => {
                Some((id.clone(), change.new_weight))
            }
            _ => None,
        })
        .collect();
    let adjustments = question_weights.len() + module_weights.len();
    let proposed = config.with_weights(&question_weights, &module_weights)?;

    let considered = resolved.len();
    let report = DiffReport {
        generated_at: Utc::now(),
        base_version,
        settings: *settings,
        considered,
        unresolved_excluded,
        true_positives,
        false_positives,
        false_positive_rate: (considered > 0)
            .then(|| false_positives as f64 / considered as f64),
        adjustments,
        stale_answers,
        question_changes,
        module_changes,
        warnings,
    };

    info!(
        base_version,
        adjustments,
        warnings = report.warnings.len(),
        "calibration run finished"
    );

    Ok(CalibrationProposal {
        base_version,
        proposed,
        report,
    })
}

/// Runs [`calibrate_with_cancel`] on the blocking pool so long history scans never stall
/// request handling.
pub async fn spawn_calibration(
    config: EngineConfig,
    base_version: u64,
    outcomes: Vec<ResolvedOutcome>,
    settings: CalibrationSettings,
    cancel: CancelFlag,
) -> Result<CalibrationProposal, CalibrationError> {
    tokio::task::spawn_blocking(move || {
        calibrate_with_cancel(&config, base_version, &outcomes, &settings, &cancel)
    })
    .await
    .map_err(|error| CalibrationError::Interrupted(error.to_string()))?
}

/// Counts outcomes selected by `matches` and how many of those were true positives.
fn tally(
    resolved: &[(&ResolvedOutcome, GroundTruth)],
    matches: impl Fn(&AnswerSet) -> bool,
) -> (usize, usize) {
    resolved
        .iter()
        .filter(|(outcome, _)| matches(&outcome.answers))
        .fold((0, 0), |(samples, hits), (_, truth)| {
            (samples + 1, hits + usize::from(truth.is_true_positive()))
        })
}

fn propose(
    target: WeightTarget,
    old_weight: f64,
    samples: usize,
    true_positives: usize,
    settings: &CalibrationSettings,
    clamp: impl Fn(f64) -> f64,
    warnings: &mut Vec<CalibrationWarning>,
) -> WeightChange {
    let precision = (samples > 0).then(|| true_positives as f64 / samples as f64);

    let evidence = match precision {
        Some(precision) if samples >= settings.min_samples.max(1) => precision,
        _ => {
            warnings.push(CalibrationWarning::InsufficientEvidence {
                target: target.clone(),
                samples,
                required: settings.min_samples.max(1),
            });
            return WeightChange {
                target,
                old_weight,
                new_weight: old_weight,
                samples,
                true_positives,
                precision,
                delta: 0.0,
                status: ChangeStatus::InsufficientEvidence,
                clamped: false,
            };
        }
    };

    let delta = (evidence - settings.target_baseline).clamp(-settings.max_step, settings.max_step);
    let unclamped = round_weight(old_weight + delta);
    let new_weight = clamp(unclamped);
    let clamped = new_weight != unclamped;
    if clamped {
        warn!(%target, proposed = unclamped, bound = new_weight, "weight clamped to bounds");
        warnings.push(CalibrationWarning::BoundsClamped {
            target: target.clone(),
            proposed: unclamped,
            bound: new_weight,
        });
    }

    let status = if (new_weight - old_weight).abs() > f64::EPSILON {
        ChangeStatus::Adjusted
    } else {
        ChangeStatus::Unchanged
    };

    WeightChange {
        target,
        old_weight,
        new_weight,
        samples,
        true_positives,
        precision,
        delta: new_weight - old_weight,
        status,
        clamped,
    }
}

fn round_weight(weight: f64) -> f64 {
    (weight * 1000.0).round() / 1000.0
}
