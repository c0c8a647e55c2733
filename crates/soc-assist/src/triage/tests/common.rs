use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::calibration::{CalibrationSettings, GroundTruth, IncidentId, ResolvedOutcome};
use crate::engine::{AnswerSet, EngineConfig};
use crate::triage::repository::{OutcomeRepository, RepositoryError};
use crate::triage::service::{OutcomeSubmission, TriageService};
use crate::triage::triage_router;
use crate::versions::ConfigurationRegistry;

pub(super) fn registry() -> Arc<ConfigurationRegistry> {
    Arc::new(ConfigurationRegistry::new(
        EngineConfig::embedded_default().expect("default config"),
    ))
}

pub(super) fn build_service() -> (TriageService<MemoryRepository>, Arc<MemoryRepository>) {
    let repository = Arc::new(MemoryRepository::default());
    let service = TriageService::new(
        registry(),
        repository.clone(),
        CalibrationSettings::default(),
        3,
    );
    (service, repository)
}

pub(super) fn ransomware_answers() -> AnswerSet {
    AnswerSet::new()
        .with("q_ransomware", "yes")
        .with("q_alert_source", "edr_high")
}

pub(super) fn submission(id: &str, resolution: Option<GroundTruth>) -> OutcomeSubmission {
    OutcomeSubmission {
        incident_id: IncidentId(id.to_string()),
        answers: ransomware_answers(),
        resolution,
    }
}

/// Six confirmed ransomware incidents: enough evidence to move the ransomware weights.
pub(super) fn seed_true_positives(service: &TriageService<MemoryRepository>) {
    for index in 0..6 {
        service
            .record_outcome(submission(
                &format!("inc-{index:03}"),
                Some(GroundTruth::TruePositive),
            ))
            .expect("outcome recorded");
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<BTreeMap<IncidentId, ResolvedOutcome>>>,
}

impl OutcomeRepository for MemoryRepository {
    fn insert(&self, outcome: ResolvedOutcome) -> Result<ResolvedOutcome, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&outcome.incident_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(outcome.incident_id.clone(), outcome.clone());
        Ok(outcome)
    }

    fn fetch(&self, id: &IncidentId) -> Result<Option<ResolvedOutcome>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn resolve(
        &self,
        id: &IncidentId,
        resolution: Option<GroundTruth>,
    ) -> Result<ResolvedOutcome, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let outcome = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        outcome.resolution = resolution;
        Ok(outcome.clone())
    }

    fn history(&self) -> Result<Vec<ResolvedOutcome>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

pub(super) struct UnavailableRepository;

impl OutcomeRepository for UnavailableRepository {
    fn insert(&self, _outcome: ResolvedOutcome) -> Result<ResolvedOutcome, RepositoryError> {
        Err(RepositoryError::Unavailable("incident store offline".to_string()))
    }

    fn fetch(&self, _id: &IncidentId) -> Result<Option<ResolvedOutcome>, RepositoryError> {
        Err(RepositoryError::Unavailable("incident store offline".to_string()))
    }

    fn resolve(
        &self,
        _id: &IncidentId,
        _resolution: Option<GroundTruth>,
    ) -> Result<ResolvedOutcome, RepositoryError> {
        Err(RepositoryError::Unavailable("incident store offline".to_string()))
    }

    fn history(&self) -> Result<Vec<ResolvedOutcome>, RepositoryError> {
        Err(RepositoryError::Unavailable("incident store offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn router_with_service(service: TriageService<MemoryRepository>) -> axum::Router {
    triage_router(Arc::new(service))
}
