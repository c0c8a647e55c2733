//! Numbered configuration snapshots and the single mutable Active pointer.
//!
//! Evaluations clone the `Arc` of the Active version once and score against that
//! snapshot only, so a concurrent apply can never mix weights from two versions.
//! Proposals (calibration or manual edits) wait as drafts until an operator applies or
//! rejects them.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::calibration::{CalibrationProposal, DiffReport, WeightTarget};
use crate::engine::{
    ConfigDocument, ConfigurationError, EngineConfig, ModuleId, QuestionId, ScoringEngine,
    SeverityLevel, ThresholdDefinition,
};

/// Immutable, numbered configuration snapshot.
#[derive(Debug)]
pub struct ConfigurationVersion {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    config: EngineConfig,
}

impl ConfigurationVersion {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn engine(&self) -> ScoringEngine<'_> {
        ScoringEngine::new(&self.config, self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionSummary {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub status: VersionStatus,
}

/// Full view of a version for audit endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionView {
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub status: VersionStatus,
    pub document: ConfigDocument,
}

/// Identifier of a pending proposal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(pub String);

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftOrigin {
    Calibration,
    Manual,
}

/// Draft lifecycle. `Applied` drafts became the version they name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DraftState {
    Pending,
    Applied { version: u64 },
    Rejected,
}

impl fmt::Display for DraftState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DraftState::Pending => f.write_str("pending"),
            DraftState::Applied { version } => write!(f, "applied as version {version}"),
            DraftState::Rejected => f.write_str("rejected"),
        }
    }
}

/// Weight or boundary touched by a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeTarget {
    QuestionWeight { question: QuestionId },
    ModuleWeight { module: ModuleId },
    Threshold { level: SeverityLevel },
}

impl fmt::Display for ChangeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeTarget::QuestionWeight { question } => write!(f, "weight of question {question}"),
            ChangeTarget::ModuleWeight { module } => write!(f, "weight of module {module}"),
            ChangeTarget::Threshold { level } => write!(f, "lower bound of {level}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigChange {
    pub target: ChangeTarget,
    pub old: f64,
    pub new: f64,
    pub reason: String,
}

/// Operator edit drafted against the Active version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigEdit {
    QuestionWeight { question: QuestionId, weight: f64 },
    ModuleWeight { module: ModuleId, weight: f64 },
    Threshold { level: SeverityLevel, min: f64 },
}

/// Proposed configuration awaiting an operator decision.
#[derive(Debug, Clone, Serialize)]
pub struct Draft {
    pub id: DraftId,
    /// Active version the proposal was derived from.
    pub base_version: u64,
    pub origin: DraftOrigin,
    pub created_at: DateTime<Utc>,
    pub state: DraftState,
    pub changes: Vec<ConfigChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<DiffReport>,
    /// Proposed configuration; released once the draft is applied or rejected.
    #[serde(skip)]
    config: Option<EngineConfig>,
}

impl Draft {
    pub fn config(&self) -> Option<&EngineConfig> {
        self.config.as_ref()
    }
}

/// Audit row written for every change a draft carried when it was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightHistoryEntry {
    pub version: u64,
    pub draft_id: DraftId,
    pub target: ChangeTarget,
    pub old: f64,
    pub new: f64,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("configuration version {0} does not exist")]
    UnknownVersion(u64),
    #[error("draft {0} does not exist")]
    UnknownDraft(DraftId),
    #[error("draft {draft} is already {state}")]
    DraftClosed { draft: DraftId, state: DraftState },
    #[error(
        "draft {draft} was derived from version {base_version} but version {active_version} is active"
    )]
    StaleProposal {
        draft: DraftId,
        base_version: u64,
        active_version: u64,
    },
    #[error("edit targets unknown {0}")]
    UnknownEditTarget(String),
    #[error("no edits supplied")]
    EmptyEdit,
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

struct RegistryState {
    active: Arc<ConfigurationVersion>,
    versions: BTreeMap<u64, Arc<ConfigurationVersion>>,
}

/// Owns every retained version, the pending drafts and the weight audit log.
pub struct ConfigurationRegistry {
    state: RwLock<RegistryState>,
    drafts: Mutex<BTreeMap<DraftId, Draft>>,
    history: Mutex<Vec<WeightHistoryEntry>>,
    draft_sequence: AtomicU64,
}

impl ConfigurationRegistry {
    /// Publishes `initial` as version 1.
    pub fn new(initial: EngineConfig) -> Self {
        let first = Arc::new(ConfigurationVersion {
            version: 1,
            created_at: Utc::now(),
            config: initial,
        });
        let mut versions = BTreeMap::new();
        versions.insert(first.version, first.clone());

        Self {
            state: RwLock::new(RegistryState {
                active: first,
                versions,
            }),
            drafts: Mutex::new(BTreeMap::new()),
            history: Mutex::new(Vec::new()),
            draft_sequence: AtomicU64::new(1),
        }
    }

    /// Snapshot every evaluation should bind to.
    pub fn active(&self) -> Arc<ConfigurationVersion> {
        self.read_state().active.clone()
    }

    pub fn version(&self, version: u64) -> Option<Arc<ConfigurationVersion>> {
        self.read_state().versions.get(&version).cloned()
    }

    pub fn status(&self, version: u64) -> Option<VersionStatus> {
        let state = self.read_state();
        state
            .versions
            .contains_key(&version)
            .then(|| status_of(&state, version))
    }

    pub fn versions(&self) -> Vec<VersionSummary> {
        let state = self.read_state();
        state
            .versions
            .values()
            .map(|version| VersionSummary {
                version: version.version,
                created_at: version.created_at,
                status: status_of(&state, version.version),
            })
            .collect()
    }

    pub fn view(&self, version: u64) -> Result<VersionView, RegistryError> {
        let state = self.read_state();
        let snapshot = state
            .versions
            .get(&version)
            .ok_or(RegistryError::UnknownVersion(version))?;
        Ok(VersionView {
            version,
            created_at: snapshot.created_at,
            status: status_of(&state, version),
            document: snapshot.config.document().clone(),
        })
    }

    /// Files a calibration proposal as a draft; only adjusted weights become changes.
    pub fn submit_calibration(&self, proposal: CalibrationProposal) -> Draft {
        let changes = proposal
            .report
            .adjusted()
            .map(|change| ConfigChange {
                target: match &change.target {
                    WeightTarget::Question(question) => {
                        ChangeTarget::QuestionWeight {
                            question: question.clone(),
                        }
                    }
                    WeightTarget::Module(module) => {
                        ChangeTarget::ModuleWeight {
                            module: module.clone(),
                        }
                    }
                },
                old: change.old_weight,
                new: change.new_weight,
                reason: format!(
                    "calibration: precision {:.2} over {} sample(s)",
                    change.precision.unwrap_or_default(),
                    change.samples
                ),
            })
            .collect();

        self.file_draft(
            proposal.base_version,
            DraftOrigin::Calibration,
            changes,
            Some(proposal.report),
            proposal.proposed,
        )
    }

    /// Drafts manual weight and threshold edits against the Active version.
    ///
    /// The edited document is validated in full; out-of-bounds weights or a broken
    /// threshold order reject the whole edit.
    pub fn propose_edits(
        &self,
        edits: &[ConfigEdit],
        note: Option<&str>,
    ) -> Result<Draft, RegistryError> {
        if edits.is_empty() {
            return Err(RegistryError::EmptyEdit);
        }

        let base = self.active();
        let mut document = base.config.document().clone();
        let reason = note.unwrap_or("manual edit").to_string();
        let mut changes = Vec::with_capacity(edits.len());

        for edit in edits {
            let (target, old, new) = match edit {
                ConfigEdit::QuestionWeight { question, weight } => {
                    let entry = document
                        .questions
                        .iter_mut()
                        .find(|candidate| &candidate.id == question)
                        .ok_or_else(|| {
                            RegistryError::UnknownEditTarget(format!("question {question}"))
                        })?;
                    let old = std::mem::replace(&mut entry.weight, *weight);
                    let target = ChangeTarget::QuestionWeight {
                        question: question.clone(),
                    };
                    (target, old, *weight)
                }
                ConfigEdit::ModuleWeight { module, weight } => {
                    let entry = document
                        .modules
                        .iter_mut()
                        .find(|candidate| &candidate.id == module)
                        .ok_or_else(|| {
                            RegistryError::UnknownEditTarget(format!("module {module}"))
                        })?;
                    let old = std::mem::replace(&mut entry.weight, *weight);
                    let target = ChangeTarget::ModuleWeight {
                        module: module.clone(),
                    };
                    (target, old, *weight)
                }
                ConfigEdit::Threshold { level, min } => {
                    let entry: &mut ThresholdDefinition = document
                        .thresholds
                        .iter_mut()
                        .find(|candidate| candidate.level == *level)
                        .ok_or_else(|| {
                            RegistryError::UnknownEditTarget(format!("threshold {level}"))
                        })?;
                    let old = std::mem::replace(&mut entry.min, *min);
                    (ChangeTarget::Threshold { level: *level }, old, *min)
                }
            };
            changes.push(ConfigChange {
                target,
                old,
                new,
                reason: reason.clone(),
            });
        }

        let config = EngineConfig::from_document(document)?;
        Ok(self.file_draft(base.version, DraftOrigin::Manual, changes, None, config))
    }

    pub fn draft(&self, id: &DraftId) -> Result<Draft, RegistryError> {
        self.lock_drafts()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownDraft(id.clone()))
    }

    pub fn drafts(&self) -> Vec<Draft> {
        self.lock_drafts().values().cloned().collect()
    }

    /// Activates a pending draft as the next version and archives the previous one.
    ///
    /// Fails with [`RegistryError::StaleProposal`] when another version became Active
    /// after the draft was derived.
    pub fn apply(&self, id: &DraftId) -> Result<Arc<ConfigurationVersion>, RegistryError> {
        let mut drafts = self.lock_drafts();
        let draft = drafts
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownDraft(id.clone()))?;
        if draft.state != DraftState::Pending {
            return Err(RegistryError::DraftClosed {
                draft: id.clone(),
                state: draft.state,
            });
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let active_version = state.active.version;
        if draft.base_version != active_version {
            return Err(RegistryError::StaleProposal {
                draft: id.clone(),
                base_version: draft.base_version,
                active_version,
            });
        }

        let config = draft.config.take().ok_or(RegistryError::DraftClosed {
            draft: id.clone(),
            state: draft.state,
        })?;
        let next = Arc::new(ConfigurationVersion {
            version: state
                .versions
                .keys()
                .next_back()
                .copied()
                .unwrap_or(active_version)
                + 1,
            created_at: Utc::now(),
            config,
        });
        state.versions.insert(next.version, next.clone());
        state.active = next.clone();
        drop(state);

        draft.state = DraftState::Applied {
            version: next.version,
        };

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.extend(draft.changes.iter().map(|change| WeightHistoryEntry {
            version: next.version,
            draft_id: id.clone(),
            target: change.target.clone(),
            old: change.old,
            new: change.new,
            reason: change.reason.clone(),
            recorded_at: next.created_at,
        }));

        info!(
            draft = %id,
            version = next.version,
            archived = active_version,
            changes = draft.changes.len(),
            "configuration version activated"
        );

        Ok(next)
    }

    pub fn reject(&self, id: &DraftId) -> Result<Draft, RegistryError> {
        let mut drafts = self.lock_drafts();
        let draft = drafts
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownDraft(id.clone()))?;
        if draft.state != DraftState::Pending {
            return Err(RegistryError::DraftClosed {
                draft: id.clone(),
                state: draft.state,
            });
        }
        draft.state = DraftState::Rejected;
        draft.config = None;
        info!(draft = %id, "draft rejected");
        Ok(draft.clone())
    }

    pub fn weight_history(&self) -> Vec<WeightHistoryEntry> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn file_draft(
        &self,
        base_version: u64,
        origin: DraftOrigin,
        changes: Vec<ConfigChange>,
        report: Option<DiffReport>,
        config: EngineConfig,
    ) -> Draft {
        let sequence = self.draft_sequence.fetch_add(1, Ordering::Relaxed);
        let draft = Draft {
            id: DraftId(format!("draft-{sequence:06}")),
            base_version,
            origin,
            created_at: Utc::now(),
            state: DraftState::Pending,
            changes,
            report,
            config: Some(config),
        };
        info!(
            draft = %draft.id,
            base_version,
            origin = ?origin,
            changes = draft.changes.len(),
            "draft proposed"
        );
        self.lock_drafts().insert(draft.id.clone(), draft.clone());
        draft
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_drafts(&self) -> std::sync::MutexGuard<'_, BTreeMap<DraftId, Draft>> {
        self.drafts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn status_of(state: &RegistryState, version: u64) -> VersionStatus {
    if state.active.version == version {
        VersionStatus::Active
    } else {
        VersionStatus::Archived
    }
}
