use metrics_exporter_prometheus::PrometheusHandle;
use soc_assist::calibration::{GroundTruth, IncidentId, ResolvedOutcome};
use soc_assist::engine::{AnswerSet, EngineConfig};
use soc_assist::error::AppError;
use soc_assist::triage::{OutcomeRepository, RepositoryError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local incident store standing in for the external one.
#[derive(Default, Clone)]
pub(crate) struct InMemoryOutcomeRepository {
    store: Arc<Mutex<OutcomeStore>>,
}

#[derive(Default)]
struct OutcomeStore {
    records: Vec<ResolvedOutcome>,
    index: HashMap<IncidentId, usize>,
}

impl InMemoryOutcomeRepository {
    pub(crate) fn with_history(outcomes: Vec<ResolvedOutcome>) -> Result<Self, RepositoryError> {
        let repository = Self::default();
        for outcome in outcomes {
            repository.insert(outcome)?;
        }
        Ok(repository)
    }

    fn lock(&self) -> Result<MutexGuard<'_, OutcomeStore>, RepositoryError> {
        self.store
            .lock()
            .map_err(|_| RepositoryError::Unavailable("outcome store poisoned".to_string()))
    }
}

impl OutcomeRepository for InMemoryOutcomeRepository {
    fn insert(&self, outcome: ResolvedOutcome) -> Result<ResolvedOutcome, RepositoryError> {
        let mut store = self.lock()?;
        if store.index.contains_key(&outcome.incident_id) {
            return Err(RepositoryError::Conflict);
        }
        let position = store.records.len();
        store.index.insert(outcome.incident_id.clone(), position);
        store.records.push(outcome.clone());
        Ok(outcome)
    }

    fn fetch(&self, id: &IncidentId) -> Result<Option<ResolvedOutcome>, RepositoryError> {
        let store = self.lock()?;
        Ok(store
            .index
            .get(id)
            .and_then(|&position| store.records.get(position).cloned()))
    }

    fn resolve(
        &self,
        id: &IncidentId,
        resolution: Option<GroundTruth>,
    ) -> Result<ResolvedOutcome, RepositoryError> {
        let mut store = self.lock()?;
        let position = *store.index.get(id).ok_or(RepositoryError::NotFound)?;
        let outcome = store
            .records
            .get_mut(position)
            .ok_or(RepositoryError::NotFound)?;
        outcome.resolution = resolution;
        Ok(outcome.clone())
    }

    fn history(&self) -> Result<Vec<ResolvedOutcome>, RepositoryError> {
        Ok(self.lock()?.records.clone())
    }
}

/// Loads the engine document at `path`, or the embedded default when absent.
pub(crate) fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig, AppError> {
    let config = match path {
        Some(path) => {
            info!(path = %path.display(), "loading engine configuration");
            EngineConfig::load(path)?
        }
        None => EngineConfig::embedded_default()?,
    };
    Ok(config)
}

/// Parses a `question=option` pair from the command line.
pub(crate) fn parse_answer(raw: &str) -> Result<(String, String), String> {
    let (question, option) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected QUESTION=OPTION, got '{raw}'"))?;
    let (question, option) = (question.trim(), option.trim());
    if question.is_empty() || option.is_empty() {
        return Err(format!("expected QUESTION=OPTION, got '{raw}'"));
    }
    Ok((question.to_string(), option.to_string()))
}

/// Reads an answer set from a JSON object file (`{"question": "option", ...}`).
pub(crate) fn read_answer_file(path: &Path) -> Result<AnswerSet, AppError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|err| {
        AppError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{}: {err}", path.display()),
        ))
    })
}
