use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{Actor, LockEntryId, ResultId, ResultRecord, SessionId};
use super::error::WorkflowError;
use super::lock::{NewSession, PublicationLockGovernor};
use super::report::BulkTransitionReport;
use super::repository::{GovernanceStore, NotificationSender};
use super::service::{NewResult, ResultWorkflowService};

#[derive(Debug, Deserialize)]
pub struct CreateResultRequest {
    pub actor: Actor,
    #[serde(flatten)]
    pub draft: NewResult,
}

#[derive(Debug, Deserialize)]
pub struct ScoresRequest {
    pub actor: Actor,
    pub result_id: ResultId,
    pub ca_score: u8,
    pub exam_score: u8,
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub actor: Actor,
    pub result_ids: Vec<ResultId>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub actor: Actor,
    pub result_id: ResultId,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CorrectionRequest {
    pub actor: Actor,
    pub result_id: ResultId,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub actor: Actor,
    #[serde(default)]
    pub session: Option<SessionId>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryRequest {
    pub actor: Actor,
    pub result_id: ResultId,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub actor: Actor,
    #[serde(flatten)]
    pub session: NewSession,
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub actor: Actor,
    pub session: SessionId,
}

#[derive(Debug, Deserialize)]
pub struct ReopenRequest {
    pub actor: Actor,
    pub session: SessionId,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub actor: Actor,
    pub session: SessionId,
    pub request_id: LockEntryId,
}

/// Router exposing the approval pipeline and the publication lock over HTTP.
pub fn governance_router<S, N>(
    results: Arc<ResultWorkflowService<S, N>>,
    governor: Arc<PublicationLockGovernor<S, N>>,
) -> Router
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    let result_routes = Router::new()
        .route("/api/v1/results", post(create_result_handler::<S, N>))
        .route("/api/v1/results/scores", post(scores_handler::<S, N>))
        .route("/api/v1/results/submit", post(submit_handler::<S, N>))
        .route(
            "/api/v1/results/department-approve",
            post(department_approve_handler::<S, N>),
        )
        .route(
            "/api/v1/results/faculty-approve",
            post(faculty_approve_handler::<S, N>),
        )
        .route(
            "/api/v1/results/final-approve",
            post(final_approve_handler::<S, N>),
        )
        .route("/api/v1/results/reject", post(reject_handler::<S, N>))
        .route(
            "/api/v1/results/request-correction",
            post(correction_handler::<S, N>),
        )
        .route("/api/v1/results/query", post(query_handler::<S, N>))
        .route("/api/v1/results/history", post(history_handler::<S, N>))
        .with_state(results);

    let session_routes = Router::new()
        .route("/api/v1/sessions", post(create_session_handler::<S, N>))
        .route("/api/v1/sessions/publish", post(publish_handler::<S, N>))
        .route(
            "/api/v1/sessions/request-reopen",
            post(request_reopen_handler::<S, N>),
        )
        .route(
            "/api/v1/sessions/approve-reopen",
            post(approve_reopen_handler::<S, N>),
        )
        .route(
            "/api/v1/sessions/reject-reopen",
            post(reject_reopen_handler::<S, N>),
        )
        .route("/api/v1/sessions/archive", post(archive_handler::<S, N>))
        .route("/api/v1/sessions/audit", post(audit_handler::<S, N>))
        .route("/api/v1/sessions/summary", post(summary_handler::<S, N>))
        .with_state(governor);

    result_routes.merge(session_routes)
}

/// HTTP status for a workflow failure.
pub fn status_for(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::OutOfScope { .. }
        | WorkflowError::SelfApproval
        | WorkflowError::InsufficientSeniority { .. } => StatusCode::FORBIDDEN,
        WorkflowError::RecordNotFound(_)
        | WorkflowError::SessionNotFound(_)
        | WorkflowError::RequestNotFound { .. } => StatusCode::NOT_FOUND,
        WorkflowError::AlreadyPublished(_)
        | WorkflowError::ReopenAlreadyPending(_)
        | WorkflowError::ConcurrentModification(_)
        | WorkflowError::SessionLocked(_)
        | WorkflowError::SessionArchived(_)
        | WorkflowError::ArchiveWhilePublished(_)
        | WorkflowError::DuplicateRecord(_)
        | WorkflowError::DuplicateSession(_)
        | WorkflowError::RequestNotPending(_) => StatusCode::CONFLICT,
        WorkflowError::InvalidTransition { .. }
        | WorkflowError::RecordReadOnly { .. }
        | WorkflowError::MissingScores(_)
        | WorkflowError::InvalidScore { .. }
        | WorkflowError::MissingReason(_)
        | WorkflowError::EmptySelection
        | WorkflowError::InvalidSessionDates(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(err: WorkflowError) -> Response {
    let status = status_for(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %err, "governance request failed");
    }
    let payload = json!({
        "error": err.to_string(),
        "code": err.code(),
    });
    (status, axum::Json(payload)).into_response()
}

fn record_response(status: StatusCode, outcome: Result<ResultRecord, WorkflowError>) -> Response {
    match outcome {
        Ok(record) => (status, axum::Json(record.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

fn bulk_response(outcome: Result<BulkTransitionReport, WorkflowError>) -> Response {
    match outcome {
        Ok(report) => (StatusCode::OK, axum::Json(report.summary())).into_response(),
        Err(err) => error_response(err),
    }
}

fn json_response<T: serde::Serialize>(
    status: StatusCode,
    outcome: Result<T, WorkflowError>,
) -> Response {
    match outcome {
        Ok(value) => (status, axum::Json(value)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn create_result_handler<S, N>(
    State(service): State<Arc<ResultWorkflowService<S, N>>>,
    axum::Json(request): axum::Json<CreateResultRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    record_response(
        StatusCode::CREATED,
        service.create_draft(&request.actor, request.draft),
    )
}

pub(crate) async fn scores_handler<S, N>(
    State(service): State<Arc<ResultWorkflowService<S, N>>>,
    axum::Json(request): axum::Json<ScoresRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    record_response(
        StatusCode::OK,
        service.enter_scores(
            &request.actor,
            &request.result_id,
            request.ca_score,
            request.exam_score,
        ),
    )
}

pub(crate) async fn submit_handler<S, N>(
    State(service): State<Arc<ResultWorkflowService<S, N>>>,
    axum::Json(request): axum::Json<BulkRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    bulk_response(service.submit_results(&request.actor, &request.result_ids))
}

pub(crate) async fn department_approve_handler<S, N>(
    State(service): State<Arc<ResultWorkflowService<S, N>>>,
    axum::Json(request): axum::Json<BulkRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    bulk_response(service.department_approve(&request.actor, &request.result_ids))
}

pub(crate) async fn faculty_approve_handler<S, N>(
    State(service): State<Arc<ResultWorkflowService<S, N>>>,
    axum::Json(request): axum::Json<BulkRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    bulk_response(service.faculty_approve(&request.actor, &request.result_ids))
}

pub(crate) async fn final_approve_handler<S, N>(
    State(service): State<Arc<ResultWorkflowService<S, N>>>,
    axum::Json(request): axum::Json<BulkRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    bulk_response(service.final_approve(&request.actor, &request.result_ids))
}

pub(crate) async fn reject_handler<S, N>(
    State(service): State<Arc<ResultWorkflowService<S, N>>>,
    axum::Json(request): axum::Json<RejectRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    record_response(
        StatusCode::OK,
        service.reject_result(&request.actor, &request.result_id, request.reason),
    )
}

pub(crate) async fn correction_handler<S, N>(
    State(service): State<Arc<ResultWorkflowService<S, N>>>,
    axum::Json(request): axum::Json<CorrectionRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    record_response(
        StatusCode::OK,
        service.request_correction(&request.actor, &request.result_id, &request.message),
    )
}

pub(crate) async fn query_handler<S, N>(
    State(service): State<Arc<ResultWorkflowService<S, N>>>,
    axum::Json(request): axum::Json<QueryRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    let outcome = service
        .results_visible_to(&request.actor, request.session.as_ref())
        .map(|records| {
            records
                .iter()
                .map(ResultRecord::status_view)
                .collect::<Vec<_>>()
        });
    json_response(StatusCode::OK, outcome)
}

pub(crate) async fn history_handler<S, N>(
    State(service): State<Arc<ResultWorkflowService<S, N>>>,
    axum::Json(request): axum::Json<HistoryRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    json_response(
        StatusCode::OK,
        service.result_history(&request.actor, &request.result_id),
    )
}

pub(crate) async fn create_session_handler<S, N>(
    State(governor): State<Arc<PublicationLockGovernor<S, N>>>,
    axum::Json(request): axum::Json<CreateSessionRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    json_response(
        StatusCode::CREATED,
        governor.create_session(&request.actor, request.session),
    )
}

pub(crate) async fn publish_handler<S, N>(
    State(governor): State<Arc<PublicationLockGovernor<S, N>>>,
    axum::Json(request): axum::Json<SessionRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    let outcome = governor
        .publish_session(&request.actor, &request.session)
        .map(|report| report.view());
    json_response(StatusCode::OK, outcome)
}

pub(crate) async fn request_reopen_handler<S, N>(
    State(governor): State<Arc<PublicationLockGovernor<S, N>>>,
    axum::Json(request): axum::Json<ReopenRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    json_response(
        StatusCode::CREATED,
        governor.request_reopen(&request.actor, &request.session, &request.reason),
    )
}

pub(crate) async fn approve_reopen_handler<S, N>(
    State(governor): State<Arc<PublicationLockGovernor<S, N>>>,
    axum::Json(request): axum::Json<ResolveRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    json_response(
        StatusCode::OK,
        governor.approve_reopen(&request.actor, &request.session, request.request_id),
    )
}

pub(crate) async fn reject_reopen_handler<S, N>(
    State(governor): State<Arc<PublicationLockGovernor<S, N>>>,
    axum::Json(request): axum::Json<ResolveRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    json_response(
        StatusCode::OK,
        governor.reject_reopen(&request.actor, &request.session, request.request_id),
    )
}

pub(crate) async fn archive_handler<S, N>(
    State(governor): State<Arc<PublicationLockGovernor<S, N>>>,
    axum::Json(request): axum::Json<SessionRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    json_response(
        StatusCode::OK,
        governor.archive_session(&request.actor, &request.session),
    )
}

pub(crate) async fn audit_handler<S, N>(
    State(governor): State<Arc<PublicationLockGovernor<S, N>>>,
    axum::Json(request): axum::Json<SessionRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    json_response(
        StatusCode::OK,
        governor.session_audit(&request.actor, &request.session),
    )
}

pub(crate) async fn summary_handler<S, N>(
    State(governor): State<Arc<PublicationLockGovernor<S, N>>>,
    axum::Json(request): axum::Json<SessionRequest>,
) -> Response
where
    S: GovernanceStore + 'static,
    N: NotificationSender + 'static,
{
    json_response(
        StatusCode::OK,
        governor.session_summary(&request.actor, &request.session),
    )
}
