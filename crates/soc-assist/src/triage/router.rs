use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::repository::{OutcomeRepository, RepositoryError};
use super::service::{OutcomeSubmission, TriageService, TriageServiceError};
use crate::calibration::{CalibrationError, CancelFlag, GroundTruth, IncidentId};
use crate::engine::AnswerSet;
use crate::versions::{ConfigEdit, DraftId, RegistryError};

#[derive(Debug, Deserialize)]
pub struct EvaluationRequest {
    pub answers: AnswerSet,
    #[serde(default)]
    pub top_n: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RescoreRequest {
    pub answers: AnswerSet,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub top_n: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ResolutionRequest {
    #[serde(default)]
    pub resolution: Option<GroundTruth>,
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub edits: Vec<ConfigEdit>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Router builder exposing evaluation, outcome intake, calibration and version endpoints.
pub fn triage_router<R>(service: Arc<TriageService<R>>) -> Router
where
    R: OutcomeRepository + 'static,
{
    Router::new()
        .route("/api/v1/evaluations", post(evaluate_handler::<R>))
        .route("/api/v1/evaluations/rescore", post(rescore_handler::<R>))
        .route("/api/v1/catalog", get(catalog_handler::<R>))
        .route("/api/v1/outcomes", post(outcome_handler::<R>))
        .route(
            "/api/v1/outcomes/:incident_id",
            get(outcome_fetch_handler::<R>).patch(resolution_handler::<R>),
        )
        .route(
            "/api/v1/calibration/proposals",
            post(calibration_handler::<R>),
        )
        .route("/api/v1/configuration", get(active_handler::<R>))
        .route("/api/v1/configuration/versions", get(versions_handler::<R>))
        .route(
            "/api/v1/configuration/versions/:version",
            get(version_handler::<R>),
        )
        .route("/api/v1/configuration/history", get(history_handler::<R>))
        .route("/api/v1/configuration/drafts", post(edit_handler::<R>))
        .route(
            "/api/v1/configuration/drafts/:draft_id",
            get(draft_handler::<R>),
        )
        .route(
            "/api/v1/configuration/drafts/:draft_id/apply",
            post(apply_handler::<R>),
        )
        .route(
            "/api/v1/configuration/drafts/:draft_id/reject",
            post(reject_handler::<R>),
        )
        .with_state(service)
}

pub(crate) async fn evaluate_handler<R>(
    State(service): State<Arc<TriageService<R>>>,
    axum::Json(request): axum::Json<EvaluationRequest>,
) -> Response
where
    R: OutcomeRepository + 'static,
{
    match service.evaluate(&request.answers, request.top_n) {
        Ok(evaluation) => (StatusCode::OK, axum::Json(evaluation)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn rescore_handler<R>(
    State(service): State<Arc<TriageService<R>>>,
    axum::Json(request): axum::Json<RescoreRequest>,
) -> Response
where
    R: OutcomeRepository + 'static,
{
    match service.rescore(&request.answers, request.version, request.top_n) {
        Ok(evaluation) => (StatusCode::OK, axum::Json(evaluation)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn catalog_handler<R>(State(service): State<Arc<TriageService<R>>>) -> Response
where
    R: OutcomeRepository + 'static,
{
    (StatusCode::OK, axum::Json(service.catalog())).into_response()
}

pub(crate) async fn outcome_handler<R>(
    State(service): State<Arc<TriageService<R>>>,
    axum::Json(submission): axum::Json<OutcomeSubmission>,
) -> Response
where
    R: OutcomeRepository + 'static,
{
    match service.record_outcome(submission) {
        Ok(outcome) => (StatusCode::CREATED, axum::Json(outcome)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn outcome_fetch_handler<R>(
    State(service): State<Arc<TriageService<R>>>,
    Path(incident_id): Path<String>,
) -> Response
where
    R: OutcomeRepository + 'static,
{
    match service.outcome(&IncidentId(incident_id)) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn resolution_handler<R>(
    State(service): State<Arc<TriageService<R>>>,
    Path(incident_id): Path<String>,
    axum::Json(request): axum::Json<ResolutionRequest>,
) -> Response
where
    R: OutcomeRepository + 'static,
{
    match service.resolve_outcome(&IncidentId(incident_id), request.resolution) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn calibration_handler<R>(
    State(service): State<Arc<TriageService<R>>>,
) -> Response
where
    R: OutcomeRepository + 'static,
{
    match service.propose_calibration(CancelFlag::new()).await {
        Ok(draft) => (StatusCode::CREATED, axum::Json(draft)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn active_handler<R>(State(service): State<Arc<TriageService<R>>>) -> Response
where
    R: OutcomeRepository + 'static,
{
    match service.active_view() {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn versions_handler<R>(State(service): State<Arc<TriageService<R>>>) -> Response
where
    R: OutcomeRepository + 'static,
{
    (StatusCode::OK, axum::Json(service.versions())).into_response()
}

pub(crate) async fn version_handler<R>(
    State(service): State<Arc<TriageService<R>>>,
    Path(version): Path<u64>,
) -> Response
where
    R: OutcomeRepository + 'static,
{
    match service.version_view(version) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn history_handler<R>(State(service): State<Arc<TriageService<R>>>) -> Response
where
    R: OutcomeRepository + 'static,
{
    (StatusCode::OK, axum::Json(service.weight_history())).into_response()
}

pub(crate) async fn edit_handler<R>(
    State(service): State<Arc<TriageService<R>>>,
    axum::Json(request): axum::Json<EditRequest>,
) -> Response
where
    R: OutcomeRepository + 'static,
{
    match service.propose_edits(&request.edits, request.note.as_deref()) {
        Ok(draft) => (StatusCode::CREATED, axum::Json(draft)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn draft_handler<R>(
    State(service): State<Arc<TriageService<R>>>,
    Path(draft_id): Path<String>,
) -> Response
where
    R: OutcomeRepository + 'static,
{
    match service.draft(&DraftId(draft_id)) {
        Ok(draft) => (StatusCode::OK, axum::Json(draft)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn apply_handler<R>(
    State(service): State<Arc<TriageService<R>>>,
    Path(draft_id): Path<String>,
) -> Response
where
    R: OutcomeRepository + 'static,
{
    match service.apply(&DraftId(draft_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => failure(error),
    }
}

pub(crate) async fn reject_handler<R>(
    State(service): State<Arc<TriageService<R>>>,
    Path(draft_id): Path<String>,
) -> Response
where
    R: OutcomeRepository + 'static,
{
    match service.reject(&DraftId(draft_id)) {
        Ok(draft) => (StatusCode::OK, axum::Json(draft)).into_response(),
        Err(error) => failure(error),
    }
}

fn failure(error: TriageServiceError) -> Response {
    let status = status_for(&error);
    let payload = match &error {
        TriageServiceError::Validation(validation) => json!({
            "error": error.to_string(),
            "problems": validation.problems,
        }),
        TriageServiceError::Registry(RegistryError::Configuration(configuration)) => json!({
            "error": error.to_string(),
            "violations": configuration.violations(),
        }),
        _ => json!({ "error": error.to_string() }),
    };
    (status, axum::Json(payload)).into_response()
}

pub(crate) fn status_for(error: &TriageServiceError) -> StatusCode {
    match error {
        TriageServiceError::Validation(_)
        | TriageServiceError::Registry(RegistryError::Configuration(_))
        | TriageServiceError::Registry(RegistryError::UnknownEditTarget(_))
        | TriageServiceError::Registry(RegistryError::EmptyEdit)
        | TriageServiceError::Calibration(CalibrationError::InvalidSettings(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        TriageServiceError::Registry(RegistryError::UnknownVersion(_))
        | TriageServiceError::Registry(RegistryError::UnknownDraft(_))
        | TriageServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        TriageServiceError::Registry(RegistryError::StaleProposal { .. })
        | TriageServiceError::Registry(RegistryError::DraftClosed { .. })
        | TriageServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        TriageServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        TriageServiceError::Calibration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
