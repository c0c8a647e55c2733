use std::sync::Arc;
use std::thread;

use super::*;
use crate::calibration::{
    calibrate, CalibrationSettings, GroundTruth, IncidentId, ResolvedOutcome,
};
use crate::engine::AnswerSet;

fn registry() -> ConfigurationRegistry {
    ConfigurationRegistry::new(EngineConfig::embedded_default().expect("default config"))
}

fn question_weight(config: &EngineConfig, id: &str) -> f64 {
    config
        .question(&QuestionId::from(id))
        .map(|question| question.weight)
        .expect("question present")
}

fn ransomware_proposal(registry: &ConfigurationRegistry) -> CalibrationProposal {
    let active = registry.active();
    let answers = AnswerSet::new().with("q_ransomware", "yes");
    let result = active.engine().evaluate(&answers).expect("valid answers");
    let history: Vec<ResolvedOutcome> = (0..6)
        .map(|index| ResolvedOutcome {
            incident_id: IncidentId(format!("inc-{index}")),
            answers: answers.clone(),
            result: result.clone(),
            resolution: Some(GroundTruth::TruePositive),
        })
        .collect();
    calibrate(
        active.config(),
        active.version,
        &history,
        &CalibrationSettings::default(),
    )
    .expect("calibration runs")
}

#[test]
fn starts_with_single_active_version() {
    let registry = registry();

    assert_eq!(registry.active().version, 1);
    assert_eq!(registry.status(1), Some(VersionStatus::Active));
    assert_eq!(registry.status(2), None);
    assert_eq!(registry.versions().len(), 1);
    assert!(registry.weight_history().is_empty());
}

#[test]
fn calibration_draft_does_not_touch_active_until_applied() {
    let registry = registry();
    let draft = registry.submit_calibration(ransomware_proposal(&registry));

    assert_eq!(draft.state, DraftState::Pending);
    assert_eq!(draft.origin, DraftOrigin::Calibration);
    assert_eq!(draft.changes.len(), 2);
    assert_eq!(question_weight(registry.active().config(), "q_ransomware"), 2.0);

    let activated = registry.apply(&draft.id).expect("draft applies");

    assert_eq!(activated.version, 2);
    assert_eq!(registry.active().version, 2);
    assert_eq!(question_weight(registry.active().config(), "q_ransomware"), 2.05);
    assert_eq!(registry.status(1), Some(VersionStatus::Archived));
    assert_eq!(registry.status(2), Some(VersionStatus::Active));
    assert_eq!(
        registry.draft(&draft.id).expect("draft kept").state,
        DraftState::Applied { version: 2 }
    );
}

#[test]
fn archived_versions_remain_available_for_rescoring() {
    let registry = registry();
    let draft = registry.submit_calibration(ransomware_proposal(&registry));
    registry.apply(&draft.id).expect("draft applies");

    let answers = AnswerSet::new().with("q_persistence", "yes");
    let pinned = registry.version(1).expect("version 1 retained");
    let result = pinned.engine().evaluate(&answers).expect("valid answers");

    assert_eq!(result.config_version, 1);
    assert_eq!(question_weight(pinned.config(), "q_ransomware"), 2.0);
    let view = registry.view(1).expect("view available");
    assert_eq!(view.status, VersionStatus::Archived);
}

#[test]
fn applying_records_weight_history() {
    let registry = registry();
    let draft = registry.submit_calibration(ransomware_proposal(&registry));
    registry.apply(&draft.id).expect("draft applies");

    let history = registry.weight_history();

    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|entry| entry.version == 2 && entry.draft_id == draft.id));
    let ransomware = history
        .iter()
        .find(|entry| {
            entry.target
                == ChangeTarget::QuestionWeight {
                    question: QuestionId::from("q_ransomware"),
                }
        })
        .expect("question change logged");
    assert_eq!(ransomware.old, 2.0);
    assert_eq!(ransomware.new, 2.05);
    assert!(ransomware.reason.starts_with("calibration"));
}

#[test]
fn stale_draft_is_refused() {
    let registry = registry();
    let first = registry.submit_calibration(ransomware_proposal(&registry));
    let second = registry
        .propose_edits(
            &[ConfigEdit::ModuleWeight {
                module: ModuleId::from("impact"),
                weight: 2.5,
            }],
            Some("raise impact"),
        )
        .expect("edit drafted");

    registry.apply(&first.id).expect("first applies");
    let error = registry.apply(&second.id).expect_err("second is stale");

    assert!(matches!(
        error,
        RegistryError::StaleProposal {
            base_version: 1,
            active_version: 2,
            ..
        }
    ));
    assert_eq!(registry.active().version, 2);
}

#[test]
fn rejected_draft_cannot_be_applied() {
    let registry = registry();
    let draft = registry.submit_calibration(ransomware_proposal(&registry));

    let rejected = registry.reject(&draft.id).expect("draft rejected");
    assert_eq!(rejected.state, DraftState::Rejected);

    let error = registry.apply(&draft.id).expect_err("closed draft");
    assert!(matches!(
        error,
        RegistryError::DraftClosed {
            state: DraftState::Rejected,
            ..
        }
    ));
    assert_eq!(registry.active().version, 1);
}

#[test]
fn unknown_draft_is_reported() {
    let registry = registry();
    let error = registry
        .apply(&DraftId("draft-999999".to_string()))
        .expect_err("unknown draft");
    assert!(matches!(error, RegistryError::UnknownDraft(_)));
}

#[test]
fn manual_threshold_edit_changes_classification() {
    let registry = registry();
    let draft = registry
        .propose_edits(
            &[ConfigEdit::Threshold {
                level: SeverityLevel::Suspicious,
                min: 30.0,
            }],
            None,
        )
        .expect("edit drafted");

    assert_eq!(draft.changes[0].old, 41.0);
    assert_eq!(draft.changes[0].reason, "manual edit");
    registry.apply(&draft.id).expect("draft applies");

    let active = registry.active();
    assert_eq!(active.engine().classify(35.0), SeverityLevel::Suspicious);
}

#[test]
fn out_of_bounds_edit_is_rejected_as_configuration_error() {
    let registry = registry();
    let error = registry
        .propose_edits(
            &[ConfigEdit::QuestionWeight {
                question: QuestionId::from("q_ransomware"),
                weight: 7.5,
            }],
            None,
        )
        .expect_err("weight outside bounds");

    match error {
        RegistryError::Configuration(error) => assert!(!error.violations().is_empty()),
        other => panic!("unexpected error: {other}"),
    }
    assert!(registry.drafts().is_empty());
}

#[test]
fn edits_must_name_known_targets() {
    let registry = registry();
    let error = registry
        .propose_edits(
            &[ConfigEdit::ModuleWeight {
                module: ModuleId::from("physical"),
                weight: 1.0,
            }],
            None,
        )
        .expect_err("unknown module");
    assert!(matches!(error, RegistryError::UnknownEditTarget(_)));

    let error = registry.propose_edits(&[], None).expect_err("empty edit");
    assert!(matches!(error, RegistryError::EmptyEdit));
}

#[test]
fn concurrent_evaluations_see_one_consistent_version() {
    let registry = Arc::new(registry());
    let answers = AnswerSet::new().with("q_ransomware", "no").with("q_persistence", "yes");

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let answers = answers.clone();
            thread::spawn(move || {
                (0..200)
                    .map(|_| {
                        let snapshot = registry.active();
                        let result = snapshot.engine().evaluate(&answers).expect("valid answers");
                        (snapshot.version, result.raw_score)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let draft = registry
        .propose_edits(
            &[ConfigEdit::ModuleWeight {
                module: ModuleId::from("malware"),
                weight: 2.0,
            }],
            None,
        )
        .expect("edit drafted");
    registry.apply(&draft.id).expect("draft applies");

    for reader in readers {
        for (version, raw_score) in reader.join().expect("reader thread") {
            let expected = if version == 1 { 15.0 * 1.5 } else { 15.0 * 2.0 };
            assert_eq!(raw_score, expected);
        }
    }
}

#[test]
fn closed_drafts_release_their_configuration() {
    let registry = registry();
    let applied = registry.submit_calibration(ransomware_proposal(&registry));
    let rejected = registry
        .propose_edits(
            &[ConfigEdit::ModuleWeight {
                module: ModuleId::from("impact"),
                weight: 2.5,
            }],
            None,
        )
        .expect("edit drafted");
    assert!(registry.draft(&applied.id).expect("pending").config().is_some());

    registry.apply(&applied.id).expect("draft applies");
    registry.reject(&rejected.id).expect("draft rejected");

    for id in [&applied.id, &rejected.id] {
        let draft = registry.draft(id).expect("draft kept for audit");
        assert!(draft.config().is_none());
        assert!(!draft.changes.is_empty());
    }
    assert_eq!(question_weight(registry.active().config(), "q_ransomware"), 2.05);
}
