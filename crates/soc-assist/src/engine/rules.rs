use super::domain::{
    ordered_product, ActiveMultiplier, AnswerSet, AnswerState, Contribution, TriggeredRule,
};
use super::errors::{AnswerProblem, ValidationError};
use super::model::EngineConfig;

/// Weighted sum of the selected option scores plus a per-question breakdown.
///
/// The breakdown covers every question of the configuration, sorted by descending
/// contribution; unanswered questions are recorded with a zero contribution.
pub(crate) fn score_answers(
    config: &EngineConfig,
    answers: &AnswerSet,
) -> Result<(f64, Vec<Contribution>), ValidationError> {
    let problems: Vec<AnswerProblem> = answers
        .iter()
        .filter_map(|(question_id, option_id)| match config.question(question_id) {
            None => Some(AnswerProblem::UnknownQuestion {
                question: question_id.clone(),
            }),
            Some(question) if question.option(option_id).is_none() => {
                Some(AnswerProblem::UnknownOption {
                    question: question_id.clone(),
                    option: option_id.clone(),
                })
            }
            Some(_) => None,
        })
        .collect();
    if !problems.is_empty() {
        return Err(ValidationError { problems });
    }

    let mut breakdown = Vec::with_capacity(config.questions().len());
    for module in config.modules() {
        for question in config.module_questions(module) {
            let selected = answers
                .get(&question.id)
                .and_then(|option_id| question.option(option_id));

            let entry = match selected {
                Some(option) => Contribution {
                    question_id: question.id.clone(),
                    module_id: module.id.clone(),
                    state: AnswerState::Answered,
                    option_id: Some(option.id.clone()),
                    option_label: Some(option.label.clone()),
                    raw_score: option.score,
                    question_weight: question.weight,
                    module_weight: module.weight,
                    contribution: f64::from(option.score) * question.weight * module.weight,
                    share: 0.0,
                },
                None => Contribution {
                    question_id: question.id.clone(),
                    module_id: module.id.clone(),
                    state: AnswerState::Unanswered,
                    option_id: None,
                    option_label: None,
                    raw_score: 0,
                    question_weight: question.weight,
                    module_weight: module.weight,
                    contribution: 0.0,
                    share: 0.0,
                },
            };
            breakdown.push(entry);
        }
    }

    let raw_score: f64 = breakdown.iter().map(|entry| entry.contribution).sum();
    if raw_score > 0.0 {
        for entry in &mut breakdown {
            entry.share = entry.contribution / raw_score * 100.0;
        }
    }

    breakdown.sort_by(|left, right| {
        right
            .contribution
            .total_cmp(&left.contribution)
            .then_with(|| state_rank(left.state).cmp(&state_rank(right.state)))
    });

    Ok((raw_score, breakdown))
}

fn state_rank(state: AnswerState) -> u8 {
    match state {
        AnswerState::Answered => 0,
        AnswerState::Unanswered => 1,
    }
}

/// Raises the score to the lower boundary of the most severe matching hard rule.
///
/// Rules only ever act as a floor. Every matching rule is reported, including those whose
/// minimum the weighted score already exceeded.
pub(crate) fn apply_hard_rules(
    config: &EngineConfig,
    answers: &AnswerSet,
    raw_score: f64,
) -> (f64, Vec<TriggeredRule>) {
    let thresholds = config.thresholds();
    let mut triggered: Vec<TriggeredRule> = config
        .hard_rules()
        .iter()
        .filter(|rule| rule.when.matches(answers))
        .map(|rule| {
            let minimum_score = thresholds.lower_bound(rule.minimum_level);
            TriggeredRule {
                rule_id: rule.id.clone(),
                description: rule.description.clone(),
                minimum_level: rule.minimum_level,
                minimum_score,
                raised_score: false,
                message: rule.message.clone(),
            }
        })
        .collect();

    let floor = triggered
        .iter()
        .map(|rule| rule.minimum_score)
        .fold(raw_score, f64::max);

    if floor > raw_score {
        for rule in &mut triggered {
            rule.raised_score = rule.minimum_score == floor;
        }
    }

    (floor, triggered)
}

/// Scales the floored score by the product of every matching multiplier.
///
/// Non-positive scores are returned unchanged so a multiplier never lowers a score.
pub(crate) fn apply_multipliers(
    config: &EngineConfig,
    answers: &AnswerSet,
    floored_score: f64,
) -> (f64, Vec<ActiveMultiplier>) {
    let active: Vec<ActiveMultiplier> = config
        .multipliers()
        .iter()
        .filter(|multiplier| multiplier.when.matches(answers))
        .map(|multiplier| ActiveMultiplier {
            multiplier_id: multiplier.id.clone(),
            description: multiplier.description.clone(),
            factor: multiplier.factor,
        })
        .collect();

    if floored_score <= 0.0 {
        return (floored_score, active);
    }

    let factor = ordered_product(active.iter().map(|multiplier| multiplier.factor));
    (floored_score * factor, active)
}
