use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::repository::{OutcomeRepository, RepositoryError};
use crate::calibration::{
    spawn_calibration, CalibrationError, CalibrationSettings, CancelFlag, GroundTruth,
    IncidentId, ResolvedOutcome,
};
use crate::engine::{
    catalog, AnswerSet, ModuleCatalog, Report, ScoringResult, ValidationError,
};
use crate::versions::{
    ConfigEdit, ConfigurationRegistry, ConfigurationVersion, Draft, DraftId, RegistryError,
    VersionSummary, VersionView, WeightHistoryEntry,
};

/// Scoring result paired with its presentation report.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub result: ScoringResult,
    pub report: Report,
}

/// Outcome reported by the incident store; scored against the Active version on intake.
#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeSubmission {
    pub incident_id: IncidentId,
    pub answers: AnswerSet,
    #[serde(default)]
    pub resolution: Option<GroundTruth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogView {
    pub config_version: u64,
    pub modules: Vec<ModuleCatalog>,
}

/// Service composing the version registry, calibration settings and outcome store.
pub struct TriageService<R> {
    registry: Arc<ConfigurationRegistry>,
    repository: Arc<R>,
    settings: CalibrationSettings,
    top_n: usize,
}

impl<R> TriageService<R>
where
    R: OutcomeRepository + 'static,
{
    pub fn new(
        registry: Arc<ConfigurationRegistry>,
        repository: Arc<R>,
        settings: CalibrationSettings,
        top_n: usize,
    ) -> Self {
        Self {
            registry,
            repository,
            settings,
            top_n,
        }
    }

    pub fn registry(&self) -> &Arc<ConfigurationRegistry> {
        &self.registry
    }

    /// Scores an answer set against the Active version.
    pub fn evaluate(
        &self,
        answers: &AnswerSet,
        top_n: Option<usize>,
    ) -> Result<Evaluation, TriageServiceError> {
        let snapshot = self.registry.active();
        Ok(self.score(&snapshot, answers, top_n)?)
    }

    /// Scores against a retained version, or the Active one when `version` is absent.
    pub fn rescore(
        &self,
        answers: &AnswerSet,
        version: Option<u64>,
        top_n: Option<usize>,
    ) -> Result<Evaluation, TriageServiceError> {
        let snapshot = match version {
            Some(number) => self
                .registry
                .version(number)
                .ok_or(RegistryError::UnknownVersion(number))?,
            None => self.registry.active(),
        };
        Ok(self.score(&snapshot, answers, top_n)?)
    }

    pub fn catalog(&self) -> CatalogView {
        let snapshot = self.registry.active();
        CatalogView {
            config_version: snapshot.version,
            modules: catalog(snapshot.config()),
        }
    }

    pub fn record_outcome(
        &self,
        submission: OutcomeSubmission,
    ) -> Result<ResolvedOutcome, TriageServiceError> {
        let snapshot = self.registry.active();
        let result = snapshot.engine().evaluate(&submission.answers)?;
        let stored = self.repository.insert(ResolvedOutcome {
            incident_id: submission.incident_id,
            answers: submission.answers,
            result,
            resolution: submission.resolution,
        })?;
        info!(
            incident = %stored.incident_id,
            version = snapshot.version,
            resolved = stored.resolution.is_some(),
            "outcome recorded"
        );
        Ok(stored)
    }

    /// Records the analyst verdict for an incident that was triaged earlier.
    pub fn resolve_outcome(
        &self,
        id: &IncidentId,
        resolution: Option<GroundTruth>,
    ) -> Result<ResolvedOutcome, TriageServiceError> {
        let updated = self.repository.resolve(id, resolution)?;
        info!(
            incident = %updated.incident_id,
            resolved = updated.resolution.is_some(),
            "outcome resolution updated"
        );
        Ok(updated)
    }

    pub fn outcome(&self, id: &IncidentId) -> Result<ResolvedOutcome, TriageServiceError> {
        let outcome = self
            .repository
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(outcome)
    }

    /// Runs calibration over the recorded history and files the result as a draft.
    pub async fn propose_calibration(
        &self,
        cancel: CancelFlag,
    ) -> Result<Draft, TriageServiceError> {
        let outcomes = self.repository.history()?;
        let snapshot = self.registry.active();
        let proposal = spawn_calibration(
            snapshot.config().clone(),
            snapshot.version,
            outcomes,
            self.settings,
            cancel,
        )
        .await?;
        Ok(self.registry.submit_calibration(proposal))
    }

    pub fn propose_edits(
        &self,
        edits: &[ConfigEdit],
        note: Option<&str>,
    ) -> Result<Draft, TriageServiceError> {
        Ok(self.registry.propose_edits(edits, note)?)
    }

    pub fn draft(&self, id: &DraftId) -> Result<Draft, TriageServiceError> {
        Ok(self.registry.draft(id)?)
    }

    pub fn apply(&self, id: &DraftId) -> Result<VersionView, TriageServiceError> {
        let activated = self.registry.apply(id)?;
        Ok(self.registry.view(activated.version)?)
    }

    pub fn reject(&self, id: &DraftId) -> Result<Draft, TriageServiceError> {
        Ok(self.registry.reject(id)?)
    }

    pub fn active_view(&self) -> Result<VersionView, TriageServiceError> {
        let version = self.registry.active().version;
        Ok(self.registry.view(version)?)
    }

    pub fn version_view(&self, version: u64) -> Result<VersionView, TriageServiceError> {
        Ok(self.registry.view(version)?)
    }

    pub fn versions(&self) -> Vec<VersionSummary> {
        self.registry.versions()
    }

    pub fn weight_history(&self) -> Vec<WeightHistoryEntry> {
        self.registry.weight_history()
    }

    fn score(
        &self,
        snapshot: &ConfigurationVersion,
        answers: &AnswerSet,
        top_n: Option<usize>,
    ) -> Result<Evaluation, ValidationError> {
        let result = snapshot.engine().evaluate(answers)?;
        let report = Report::for_result(&result, top_n.unwrap_or(self.top_n));
        Ok(Evaluation { result, report })
    }
}

/// Error raised by the triage service.
#[derive(Debug, thiserror::Error)]
pub enum TriageServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
