use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::domain::SubmissionRequest;
use super::invoker::AutomationBackend;
use super::ledger::{LedgerError, LedgerRecord, ResultLedger};
use super::service::{ApplicationDesk, SubmissionError};

/// Desk plus the server-wide token whose cancellation stops in-flight workers.
pub struct SubmissionState<B, L> {
    pub desk: ApplicationDesk<B, L>,
    pub shutdown: CancellationToken,
}

impl<B, L> Clone for SubmissionState<B, L> {
    fn clone(&self) -> Self {
        Self {
            desk: self.desk.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApplyAndRecordRequest {
    #[serde(flatten)]
    submission: SubmissionRequest,
    #[serde(default)]
    application: Map<String, Value>,
}

/// Router builder exposing the automation and ledger endpoints.
///
/// The routes are not gated here; callers layer the session check on top.
pub fn submission_router<B, L>(desk: ApplicationDesk<B, L>, shutdown: CancellationToken) -> Router
where
    B: AutomationBackend + 'static,
    L: ResultLedger + 'static,
{
    Router::new()
        .route("/api/apply-internships", post(apply_handler::<B, L>))
        .route("/api/apply-and-record", post(apply_and_record_handler::<B, L>))
        .route("/submit-application", post(record_handler::<B, L>))
        .route("/api/submitted-applications", get(list_handler::<B, L>))
        .with_state(SubmissionState { desk, shutdown })
}

pub(crate) async fn apply_handler<B, L>(
    State(state): State<SubmissionState<B, L>>,
    payload: Result<Json<SubmissionRequest>, JsonRejection>,
) -> Response
where
    B: AutomationBackend + 'static,
    L: ResultLedger + 'static,
{
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return malformed_submission(rejection),
    };

    let cancel = state.shutdown.child_token();
    match state.desk.submit_for_automation(request, &cancel).await {
        Ok(receipt) => {
            let payload = json!({
                "success": true,
                "message": "Applications submitted!",
                "result": receipt.result_payload,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => submission_error_response(err),
    }
}

pub(crate) async fn apply_and_record_handler<B, L>(
    State(state): State<SubmissionState<B, L>>,
    payload: Result<Json<ApplyAndRecordRequest>, JsonRejection>,
) -> Response
where
    B: AutomationBackend + 'static,
    L: ResultLedger + 'static,
{
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return malformed_submission(rejection),
    };

    let record = match LedgerRecord::from_json_object(request.application) {
        Ok(record) => record,
        Err(err) => return ledger_error_response(err.into()),
    };

    let cancel = state.shutdown.child_token();
    match state
        .desk
        .submit_and_record(request.submission, record, &cancel)
        .await
    {
        Ok(receipt) => {
            let payload = json!({
                "success": true,
                "message": "Applications submitted and recorded!",
                "result": receipt.result_payload,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => submission_error_response(err),
    }
}

pub(crate) async fn record_handler<B, L>(
    State(state): State<SubmissionState<B, L>>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Response
where
    B: AutomationBackend + 'static,
    L: ResultLedger + 'static,
{
    let Json(data) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            let message = format!(
                "application data must be a JSON object: {}",
                rejection.body_text()
            );
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response();
        }
    };

    let record = match LedgerRecord::from_json_object(data) {
        Ok(record) => record,
        Err(err) => return ledger_error_response(err.into()),
    };

    match state.desk.record_application(record).await {
        Ok(()) => {
            let payload = json!({ "message": "Application submitted successfully" });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => ledger_error_response(err),
    }
}

pub(crate) async fn list_handler<B, L>(State(state): State<SubmissionState<B, L>>) -> Response
where
    B: AutomationBackend + 'static,
    L: ResultLedger + 'static,
{
    match state.desk.list_applications().await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(err) => ledger_error_response(err),
    }
}

fn malformed_submission(rejection: JsonRejection) -> Response {
    let payload = json!({
        "success": false,
        "message": format!("Profile and cover letter required: {}", rejection.body_text()),
    });
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}

fn submission_error_response(err: SubmissionError) -> Response {
    match err {
        SubmissionError::Validation(err) => {
            let payload = json!({ "success": false, "message": err.to_string() });
            (StatusCode::BAD_REQUEST, Json(payload)).into_response()
        }
        SubmissionError::Worker(failure) => {
            let payload = json!({
                "success": false,
                "message": "Failed to apply",
                "error": failure.message(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
        SubmissionError::Ledger(err) => ledger_error_response(err),
    }
}

fn ledger_error_response(err: LedgerError) -> Response {
    let (status, message) = match &err {
        LedgerError::NotFound => (StatusCode::NOT_FOUND, "CSV file not found".to_string()),
        LedgerError::InvalidRecord(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        LedgerError::SchemaMismatch { .. } => (StatusCode::CONFLICT, err.to_string()),
        LedgerError::Io(_)
        | LedgerError::Csv(_)
        | LedgerError::Poisoned
        | LedgerError::Join(_) => {
            error!(error = %err, "ledger operation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to access submitted applications".to_string(),
            )
        }
    };
    (status, Json(json!({ "error": message }))).into_response()
}
