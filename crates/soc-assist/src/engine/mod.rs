//! Deterministic severity scoring over an immutable configuration snapshot.
//!
//! The pipeline runs in a fixed order: weighted scoring, hard-rule floor, multipliers,
//! threshold classification. Every stage is a pure function of the configuration and
//! the answer set.

mod catalog;
mod document;
pub mod domain;
mod errors;
mod explain;
mod model;
mod predicate;
mod rules;
mod thresholds;

#[cfg(test)]
mod tests;

pub use catalog::{catalog, ModuleCatalog, OptionPreview, QuestionCatalog};
pub use domain::{
    ActiveMultiplier, AnswerSet, AnswerState, Contribution, ModuleId, OptionId, QuestionId,
    RuleId, ScoringResult, SeverityLevel, TriggeredRule,
};
pub use errors::{AnswerProblem, ConfigViolation, ConfigurationError, ValidationError};
pub use explain::{
    explain, FactorView, HardRuleView, MultiplierView, Report, DEFAULT_TOP_FACTORS,
};
pub use model::{
    AnswerOption, ConfigDocument, EngineConfig, HardRule, Module, Multiplier, Question,
    WeightBounds,
};
pub use predicate::Predicate;
pub use thresholds::{SeverityRange, ThresholdDefinition, ThresholdTable};

use std::collections::BTreeMap;

use tracing::debug;

/// Stateless evaluator bound to one configuration snapshot and its version number.
#[derive(Debug, Clone, Copy)]
pub struct ScoringEngine<'a> {
    config: &'a EngineConfig,
    version: u64,
}

impl<'a> ScoringEngine<'a> {
    pub fn new(config: &'a EngineConfig, version: u64) -> Self {
        Self { config, version }
    }

    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }

    /// `score(config, answers) -> (raw score, breakdown)`.
    pub fn score(&self, answers: &AnswerSet) -> Result<(f64, Vec<Contribution>), ValidationError> {
        rules::score_answers(self.config, answers)
    }

    /// `applyHardRules(config, answers, raw score) -> (floored score, triggered rules)`.
    pub fn apply_hard_rules(&self, answers: &AnswerSet, raw_score: f64) -> (f64, Vec<TriggeredRule>) {
        rules::apply_hard_rules(self.config, answers, raw_score)
    }

    /// `applyMultipliers(config, answers, floored score) -> (final score, active multipliers)`.
    pub fn apply_multipliers(
        &self,
        answers: &AnswerSet,
        floored_score: f64,
    ) -> (f64, Vec<ActiveMultiplier>) {
        rules::apply_multipliers(self.config, answers, floored_score)
    }

    pub fn classify(&self, final_score: f64) -> SeverityLevel {
        self.config.thresholds().classify(final_score)
    }

    /// Runs the full pipeline and produces an immutable, version-stamped result.
    pub fn evaluate(&self, answers: &AnswerSet) -> Result<ScoringResult, ValidationError> {
        let (raw_score, breakdown) = self.score(answers)?;
        let (floored_score, triggered_rules) = self.apply_hard_rules(answers, raw_score);
        let (final_score, active_multipliers) = self.apply_multipliers(answers, floored_score);
        let level = self.classify(final_score);

        let mut module_scores: BTreeMap<ModuleId, f64> = self
            .config
            .modules()
            .iter()
            .map(|module| (module.id.clone(), 0.0))
            .collect();
        for entry in &breakdown {
            if let Some(total) = module_scores.get_mut(&entry.module_id) {
                *total += entry.contribution;
            }
        }

        debug!(
            config_version = self.version,
            raw_score,
            floored_score,
            final_score,
            level = level.label(),
            hard_rules = triggered_rules.len(),
            multipliers = active_multipliers.len(),
            "evaluated answer set"
        );

        Ok(ScoringResult {
            config_version: self.version,
            raw_score,
            floored_score,
            final_score,
            level,
            breakdown,
            module_scores,
            triggered_rules,
            active_multipliers,
            recommendation: self.config.recommendation(level).to_string(),
            escalate: level.requires_escalation(),
        })
    }
}
