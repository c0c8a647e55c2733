use crate::calibration::{GroundTruth, IncidentId, ResolvedOutcome};

/// Incident store seam. The engine reads history through it and never owns persistence.
pub trait OutcomeRepository: Send + Sync {
    fn insert(&self, outcome: ResolvedOutcome) -> Result<ResolvedOutcome, RepositoryError>;
    fn fetch(&self, id: &IncidentId) -> Result<Option<ResolvedOutcome>, RepositoryError>;
    /// Replaces the resolution of a recorded incident; `NotFound` when it was never recorded.
    fn resolve(
        &self,
        id: &IncidentId,
        resolution: Option<GroundTruth>,
    ) -> Result<ResolvedOutcome, RepositoryError>;
    /// Every recorded outcome in insertion order, resolved or not.
    fn history(&self) -> Result<Vec<ResolvedOutcome>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("outcome already recorded")]
    Conflict,
    #[error("outcome not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
