use super::common::*;
use crate::engine::{explain, QuestionId, Report, SeverityLevel};

#[test]
fn report_ranks_factors_by_absolute_contribution() {
    let config = fixture_config();
    let result = engine(&config)
        .evaluate(&answers(&[
            ("q_alpha", "low"),
            ("q_lateral", "confirmed"),
            ("q_benign", "yes"),
            ("q_admin", "no"),
        ]))
        .expect("valid answers");

    let report = Report::for_result(&result, 2);

    assert_eq!(report.top_factors.len(), 2);
    assert_eq!(report.top_factors[0].question_id, QuestionId::from("q_lateral"));
    assert_eq!(report.top_factors[0].rank, 1);
    assert_eq!(report.top_factors[1].question_id, QuestionId::from("q_benign"));
    assert_eq!(report.answered_questions, 4);
    assert_eq!(report.unanswered_questions, 1);
}

#[test]
fn report_describes_rules_and_multiplier_deltas() {
    let config = fixture_config();
    let result = engine(&config)
        .evaluate(&answers(&[
            ("q_ransom", "yes"),
            ("q_lateral", "confirmed"),
            ("q_admin", "yes"),
        ]))
        .expect("valid answers");

    let report = Report::for_result(&result, 5);

    assert_eq!(report.level, SeverityLevel::Breach);
    assert!(report.escalate);
    assert_eq!(report.hard_rules.len(), 2);
    assert!(report
        .hard_rules
        .iter()
        .any(|rule| rule.forced_level == SeverityLevel::Breach && rule.raised_score));
    assert_eq!(report.multipliers.len(), 2);
    let lateral = report
        .multipliers
        .iter()
        .find(|view| view.multiplier_id.0 == "mx_lateral")
        .expect("lateral multiplier listed");
    assert!(approx(lateral.standalone_delta, 601.0 * 0.5));
    assert!(approx(report.combined_factor, 1.8));
    assert!(approx(report.multiplier_delta, result.final_score - 601.0));
    assert!(report.headline.starts_with("Confirmed breach"));
}

#[test]
fn report_uses_only_persisted_result_fields() {
    let config = fixture_config();
    let result = engine(&config)
        .evaluate(&answers(&[("q_alpha", "high"), ("q_admin", "yes")]))
        .expect("valid answers");

    let rebuilt = explain(
        &result.breakdown,
        &result.triggered_rules,
        &result.active_multipliers,
        result.floored_score,
        result.final_score,
        result.level,
        3,
    );

    assert_eq!(rebuilt, Report::for_result(&result, 3));
    assert_eq!(rebuilt.top_factors.len(), 2);
    assert!(approx(rebuilt.combined_factor, result.combined_factor()));
}

#[test]
fn zero_contributions_are_not_listed_as_factors() {
    let config = fixture_config();
    let result = engine(&config)
        .evaluate(&answers(&[("q_admin", "no"), ("q_ransom", "no")]))
        .expect("valid answers");

    let report = Report::for_result(&result, 5);

    assert!(report.top_factors.is_empty());
    assert_eq!(report.answered_questions, 2);
    assert_eq!(report.level, SeverityLevel::Informative);
    assert_eq!(report.combined_factor, 1.0);
}
