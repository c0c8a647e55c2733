use serde::{Deserialize, Serialize};

use super::domain::{
    ordered_product, ActiveMultiplier, AnswerState, Contribution, ModuleId, OptionId, QuestionId,
    RuleId, ScoringResult, SeverityLevel, TriggeredRule,
};

/// Number of contributing questions listed when the caller does not ask for more.
pub const DEFAULT_TOP_FACTORS: usize = 5;

/// Presentation view of a scoring result. Built only from persisted result fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub level: SeverityLevel,
    pub level_label: String,
    pub final_score: f64,
    pub escalate: bool,
    pub headline: String,
    pub top_factors: Vec<FactorView>,
    pub answered_questions: usize,
    pub unanswered_questions: usize,
    pub hard_rules: Vec<HardRuleView>,
    pub multipliers: Vec<MultiplierView>,
    pub combined_factor: f64,
    /// `final_score - floored_score`: the score added by all multipliers together.
    pub multiplier_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorView {
    pub rank: usize,
    pub question_id: QuestionId,
    pub module_id: ModuleId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_id: Option<OptionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_label: Option<String>,
    pub contribution: f64,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardRuleView {
    pub rule_id: RuleId,
    pub description: String,
    pub forced_level: SeverityLevel,
    pub minimum_score: f64,
    pub raised_score: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplierView {
    pub multiplier_id: RuleId,
    pub description: String,
    pub factor: f64,
    /// Score this multiplier alone would add on top of the floored score.
    pub standalone_delta: f64,
}

impl Report {
    pub fn for_result(result: &ScoringResult, top_n: usize) -> Self {
        explain(
            &result.breakdown,
            &result.triggered_rules,
            &result.active_multipliers,
            result.floored_score,
            result.final_score,
            result.level,
            top_n,
        )
    }
}

/// Ranks answered questions by absolute contribution and summarises rules and multipliers.
pub fn explain(
    breakdown: &[Contribution],
    triggered_rules: &[TriggeredRule],
    active_multipliers: &[ActiveMultiplier],
    floored_score: f64,
    final_score: f64,
    level: SeverityLevel,
    top_n: usize,
) -> Report {
    let mut answered: Vec<&Contribution> = breakdown
        .iter()
        .filter(|entry| entry.state == AnswerState::Answered)
        .collect();
    let answered_questions = answered.len();
    answered.sort_by(|left, right| {
        right
            .contribution
            .abs()
            .total_cmp(&left.contribution.abs())
            .then_with(|| left.question_id.cmp(&right.question_id))
    });

    let top_factors = answered
        .into_iter()
        .filter(|entry| entry.contribution != 0.0)
        .take(top_n)
        .enumerate()
        .map(|(index, entry)| FactorView {
            rank: index + 1,
            question_id: entry.question_id.clone(),
            module_id: entry.module_id.clone(),
            option_id: entry.option_id.clone(),
            option_label: entry.option_label.clone(),
            contribution: entry.contribution,
            share: entry.share,
        })
        .collect();

    let hard_rules: Vec<HardRuleView> = triggered_rules
        .iter()
        .map(|rule| HardRuleView {
            rule_id: rule.rule_id.clone(),
            description: rule.description.clone(),
            forced_level: rule.minimum_level,
            minimum_score: rule.minimum_score,
            raised_score: rule.raised_score,
            message: rule.message.clone(),
        })
        .collect();

    let multipliers: Vec<MultiplierView> = active_multipliers
        .iter()
        .map(|multiplier| MultiplierView {
            multiplier_id: multiplier.multiplier_id.clone(),
            description: multiplier.description.clone(),
            factor: multiplier.factor,
            standalone_delta: floored_score.max(0.0) * (multiplier.factor - 1.0),
        })
        .collect();

    let headline = format!(
        "{} (score {:.2}): {} answered question(s), {} hard rule(s), {} multiplier(s)",
        level.label(),
        final_score,
        answered_questions,
        hard_rules.len(),
        multipliers.len()
    );

    Report {
        level,
        level_label: level.label().to_string(),
        final_score,
        escalate: level.requires_escalation(),
        headline,
        top_factors,
        answered_questions,
        unanswered_questions: breakdown.len() - answered_questions,
        hard_rules,
        multipliers,
        combined_factor: ordered_product(active_multipliers.iter().map(|m| m.factor)),
        multiplier_delta: final_score - floored_score,
    }
}
