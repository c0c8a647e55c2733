use super::common::*;
use crate::calibration::{CalibrationError, CancelFlag, GroundTruth, IncidentId};
use crate::engine::{AnswerSet, SeverityLevel};
use crate::triage::repository::RepositoryError;
use crate::triage::service::TriageServiceError;
use crate::versions::{ConfigEdit, DraftOrigin, DraftState, RegistryError};

#[test]
fn evaluate_binds_to_active_version() {
    let (service, _) = build_service();

    let evaluation = service
        .evaluate(&ransomware_answers(), None)
        .expect("evaluation succeeds");

    assert_eq!(evaluation.result.config_version, 1);
    assert_eq!(evaluation.result.level, SeverityLevel::Breach);
    assert!(evaluation.report.top_factors.len() <= 3);
    assert_eq!(evaluation.report.hard_rules.len(), 1);
}

#[test]
fn evaluate_rejects_unknown_answers() {
    let (service, _) = build_service();
    let answers = AnswerSet::new().with("q_ransomware", "perhaps");

    let error = service.evaluate(&answers, None).expect_err("invalid answers");

    assert!(matches!(error, TriageServiceError::Validation(_)));
}

#[test]
fn rescore_pins_requested_version() {
    let (service, _) = build_service();
    let draft = service
        .propose_edits(
            &[ConfigEdit::QuestionWeight {
                question: "q_alert_source".into(),
                weight: 2.0,
            }],
            Some("trust EDR more"),
        )
        .expect("edit drafted");
    service.apply(&draft.id).expect("draft applies");

    let answers = AnswerSet::new().with("q_alert_source", "edr_high");
    let current = service.rescore(&answers, None, None).expect("rescore active");
    let pinned = service.rescore(&answers, Some(1), None).expect("rescore v1");

    assert_eq!(current.result.config_version, 2);
    assert_eq!(current.result.raw_score, 20.0);
    assert_eq!(pinned.result.config_version, 1);
    assert_eq!(pinned.result.raw_score, 10.0);

    let error = service
        .rescore(&answers, Some(42), None)
        .expect_err("unknown version");
    assert!(matches!(
        error,
        TriageServiceError::Registry(RegistryError::UnknownVersion(42))
    ));
}

#[test]
fn record_outcome_scores_and_stores() {
    let (service, repository) = build_service();

    let stored = service
        .record_outcome(submission("inc-100", Some(GroundTruth::FalsePositive)))
        .expect("outcome recorded");

    assert_eq!(stored.result.level, SeverityLevel::Breach);
    assert_eq!(repository.records.lock().expect("lock").len(), 1);
    let fetched = service
        .outcome(&IncidentId("inc-100".to_string()))
        .expect("outcome fetched");
    assert_eq!(fetched.resolution, Some(GroundTruth::FalsePositive));

    let error = service
        .record_outcome(submission("inc-100", None))
        .expect_err("duplicate incident");
    assert!(matches!(
        error,
        TriageServiceError::Repository(RepositoryError::Conflict)
    ));
}

#[tokio::test]
async fn calibration_proposal_becomes_draft_then_version() {
    let (service, _) = build_service();
    seed_true_positives(&service);

    let draft = service
        .propose_calibration(CancelFlag::new())
        .await
        .expect("calibration proposed");

    assert_eq!(draft.origin, DraftOrigin::Calibration);
    assert_eq!(draft.base_version, 1);
    let report = draft.report.as_ref().expect("report attached");
    assert_eq!(report.considered, 6);
    assert!(report.adjustments >= 2);
    assert_eq!(service.versions().len(), 1);

    let view = service.apply(&draft.id).expect("draft applies");
    assert_eq!(view.version, 2);
    assert_eq!(
        service.draft(&draft.id).expect("draft kept").state,
        DraftState::Applied { version: 2 }
    );
    assert_eq!(service.weight_history().len(), report.adjustments);
}

#[tokio::test]
async fn cancelled_calibration_files_no_draft() {
    let (service, _) = build_service();
    seed_true_positives(&service);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let error = service
        .propose_calibration(cancel)
        .await
        .expect_err("cancelled");

    assert!(matches!(
        error,
        TriageServiceError::Calibration(CalibrationError::Cancelled)
    ));
    assert!(service.registry().drafts().is_empty());
}

#[tokio::test]
async fn unavailable_store_surfaces_repository_error() {
    let service = crate::triage::TriageService::new(
        registry(),
        std::sync::Arc::new(UnavailableRepository),
        crate::calibration::CalibrationSettings::default(),
        5,
    );

    let error = service
        .propose_calibration(CancelFlag::new())
        .await
        .expect_err("store offline");

    assert!(matches!(
        error,
        TriageServiceError::Repository(RepositoryError::Unavailable(_))
    ));
}

#[tokio::test]
async fn open_outcomes_count_as_evidence_once_resolved() {
    let (service, _) = build_service();
    for index in 0..5 {
        service
            .record_outcome(submission(&format!("open-{index}"), None))
            .expect("outcome recorded");
    }

    let draft = service
        .propose_calibration(CancelFlag::new())
        .await
        .expect("calibration proposed");
    let report = draft.report.as_ref().expect("report attached");
    assert_eq!(report.considered, 0);
    assert_eq!(report.unresolved_excluded, 5);
    assert!(draft.changes.is_empty());

    for index in 0..5 {
        let resolved = service
            .resolve_outcome(
                &IncidentId(format!("open-{index}")),
                Some(GroundTruth::EscalatedTruePositive),
            )
            .expect("outcome resolved");
        assert_eq!(resolved.resolution, Some(GroundTruth::EscalatedTruePositive));
    }

    let draft = service
        .propose_calibration(CancelFlag::new())
        .await
        .expect("calibration proposed");
    let report = draft.report.as_ref().expect("report attached");
    assert_eq!(report.considered, 5);
    assert_eq!(report.unresolved_excluded, 0);
    assert!(report.adjustments >= 2);
}

#[test]
fn resolving_unknown_incident_is_not_found() {
    let (service, _) = build_service();

    let error = service
        .resolve_outcome(
            &IncidentId("missing".to_string()),
            Some(GroundTruth::FalsePositive),
        )
        .expect_err("never recorded");

    assert!(matches!(
        error,
        TriageServiceError::Repository(RepositoryError::NotFound)
    ));
}
