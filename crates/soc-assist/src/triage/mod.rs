//! Service facade and HTTP surface tying the engine, calibration and version registry to
//! the incident store collaborator.

pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use repository::{OutcomeRepository, RepositoryError};
pub use router::triage_router;
pub use service::{Evaluation, OutcomeSubmission, TriageService, TriageServiceError};
