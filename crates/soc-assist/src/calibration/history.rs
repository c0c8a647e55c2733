//! CSV import of resolved incident history.
//!
//! One row per recorded answer:
//!
//! ```text
//! incident_id,resolution,config_version,question_id,option_id
//! inc-001,tp_escalated,1,q_ransomware,yes
//! inc-001,tp_escalated,1,q_asset_criticality,production
//! ```
//!
//! Rows of one incident share its resolution and configuration version. Each incident is
//! re-scored against the version it was originally scored with.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use super::{GroundTruth, IncidentId, ResolvedOutcome};
use crate::engine::{AnswerProblem, AnswerSet, OptionId, QuestionId, ValidationError};
use crate::versions::ConfigurationRegistry;

#[derive(Debug, Deserialize)]
struct HistoryRow {
    incident_id: String,
    #[serde(default)]
    resolution: String,
    config_version: u64,
    question_id: String,
    option_id: String,
}

/// Outcomes rebuilt from an export, in first-seen incident order.
#[derive(Debug, Clone)]
pub struct HistoryImport {
    pub outcomes: Vec<ResolvedOutcome>,
    /// Answers dropped because the pinned version no longer knows them.
    pub stale_answers: usize,
}

impl HistoryImport {
    pub fn resolved(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.resolution.is_some())
            .count()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryImportError {
    #[error("unable to read history file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed history export: {0}")]
    Csv(#[from] csv::Error),
    #[error("incident {incident}: unknown resolution '{value}'")]
    UnknownResolution { incident: IncidentId, value: String },
    #[error("incident {incident}: rows disagree on {field}")]
    Inconsistent {
        incident: IncidentId,
        field: &'static str,
    },
    #[error("incident {incident}: configuration version {version} is not retained")]
    UnknownVersion { incident: IncidentId, version: u64 },
    #[error("incident {incident}: {source}")]
    Rescore {
        incident: IncidentId,
        source: ValidationError,
    },
}

/// Maps an export resolution code. Open incidents (`ongoing` or blank) have no ground truth.
pub fn parse_resolution(raw: &str) -> Option<Option<GroundTruth>> {
    match raw.trim() {
        "fp" => Some(Some(GroundTruth::FalsePositive)),
        "tp_resolved" => Some(Some(GroundTruth::TruePositive)),
        "tp_escalated" => Some(Some(GroundTruth::EscalatedTruePositive)),
        "ongoing" | "" => Some(None),
        _ => None,
    }
}

pub fn import_history_path(
    path: &Path,
    registry: &ConfigurationRegistry,
) -> Result<HistoryImport, HistoryImportError> {
    let file = File::open(path).map_err(|source| HistoryImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    import_history(file, registry)
}

pub fn import_history<R: Read>(
    reader: R,
    registry: &ConfigurationRegistry,
) -> Result<HistoryImport, HistoryImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut pending: Vec<PendingIncident> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in csv_reader.deserialize::<HistoryRow>() {
        let row = row?;
        let incident = IncidentId(row.incident_id.clone());
        let resolution = parse_resolution(&row.resolution).ok_or_else(|| {
            HistoryImportError::UnknownResolution {
                incident: incident.clone(),
                value: row.resolution.clone(),
            }
        })?;

        let position = *positions.entry(row.incident_id.clone()).or_insert_with(|| {
            pending.push(PendingIncident {
                incident_id: incident.clone(),
                resolution,
                config_version: row.config_version,
                answers: AnswerSet::new(),
            });
            pending.len() - 1
        });
        let entry = &mut pending[position];
        if entry.resolution != resolution {
            return Err(HistoryImportError::Inconsistent {
                incident,
                field: "resolution",
            });
        }
        if entry.config_version != row.config_version {
            return Err(HistoryImportError::Inconsistent {
                incident,
                field: "config_version",
            });
        }
        entry.answers.insert(&row.question_id, &row.option_id);
    }

    let mut stale_answers = 0;
    let mut outcomes = Vec::with_capacity(pending.len());
    for incident in pending {
        let (outcome, stale) = rescore(incident, registry)?;
        stale_answers += stale;
        outcomes.push(outcome);
    }

    info!(
        incidents = outcomes.len(),
        stale_answers, "imported incident history"
    );

    Ok(HistoryImport {
        outcomes,
        stale_answers,
    })
}

struct PendingIncident {
    incident_id: IncidentId,
    resolution: Option<GroundTruth>,
    config_version: u64,
    answers: AnswerSet,
}

/// Scores against the pinned version, dropping answers that version does not define.
fn rescore(
    incident: PendingIncident,
    registry: &ConfigurationRegistry,
) -> Result<(ResolvedOutcome, usize), HistoryImportError> {
    let PendingIncident {
        incident_id,
        resolution,
        config_version,
        mut answers,
    } = incident;

    let version = registry
        .version(config_version)
        .ok_or_else(|| HistoryImportError::UnknownVersion {
            incident: incident_id.clone(),
            version: config_version,
        })?;
    let engine = version.engine();

    let mut stale = 0;
    let result = match engine.evaluate(&answers) {
        Ok(result) => result,
        Err(error) => {
            for problem in &error.problems {
                let question = match problem {
                    AnswerProblem::UnknownQuestion { question } => question,
                    AnswerProblem::UnknownOption { question, .. } => question,
                };
                if answers.0.remove(question).is_some() {
                    stale += 1;
                }
            }
            warn!(
                incident = %incident_id,
                version = config_version,
                stale,
                "dropping answers unknown to the pinned configuration"
            );
            engine
                .evaluate(&answers)
                .map_err(|source| HistoryImportError::Rescore {
                    incident: incident_id.clone(),
                    source,
                })?
        }
    };

    Ok((
        ResolvedOutcome {
            incident_id,
            answers,
            result,
            resolution,
        },
        stale,
    ))
}

/// Serialises outcomes back into the export layout, one row per answer.
pub fn export_history<W: std::io::Write>(
    writer: W,
    outcomes: &[ResolvedOutcome],
) -> Result<(), HistoryImportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([
        "incident_id",
        "resolution",
        "config_version",
        "question_id",
        "option_id",
    ])?;
    for outcome in outcomes {
        let resolution = match outcome.resolution {
            Some(GroundTruth::FalsePositive) => "fp",
            Some(GroundTruth::TruePositive) => "tp_resolved",
            Some(GroundTruth::EscalatedTruePositive) => "tp_escalated",
            None => "ongoing",
        };
        let version = outcome.result.config_version.to_string();
        for (QuestionId(question), OptionId(option)) in outcome.answers.iter() {
            csv_writer.write_record([
                outcome.incident_id.0.as_str(),
                resolution,
                version.as_str(),
                question.as_str(),
                option.as_str(),
            ])?;
        }
    }
    csv_writer
        .flush()
        .map_err(|source| HistoryImportError::Csv(source.into()))?;
    Ok(())
}
