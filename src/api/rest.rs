// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// The UI binding for the workflow engine. All endpoints live under
// `/api/v1/`. CORS is configured permissively for development; tighten
// `allowed_origins` in production.
//
// HTTP mapping: validation and precondition failures are 400, a stage
// violation is 409, upstream service failures are 502, a trigger ignored
// by an in-flight guard is 202 with `{"status":"in_flight"}`, and a
// result discarded because the session was superseded mid-call is 409
// with `{"status":"superseded"}`.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::error::WorkflowError;
use crate::types::CompanyProfile;
use crate::workflow::{Triggered, WorkflowEngine};

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and the shared
/// workflow engine.
pub fn router(engine: Arc<WorkflowEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/tender", post(ingest_tender))
        .route("/api/v1/catalog", post(upload_catalog))
        .route("/api/v1/catalog", get(list_catalog))
        .route("/api/v1/recommend", post(recommend))
        .route("/api/v1/threshold", post(set_threshold))
        .route("/api/v1/confirm", post(confirm_suggestion))
        .route("/api/v1/finalize", post(finalize_proposal))
        .route("/api/v1/proposal", post(quick_proposal))
        .route("/api/v1/history", get(list_history))
        .layer(cors)
        .with_state(engine)
}

// =============================================================================
// Error mapping
// =============================================================================

type ApiError = (StatusCode, Json<serde_json::Value>);

fn workflow_error(err: WorkflowError) -> ApiError {
    let status = match &err {
        WorkflowError::Ingestion(_)
        | WorkflowError::Recommendation(_)
        | WorkflowError::DocumentGeneration(_) => StatusCode::BAD_GATEWAY,
        WorkflowError::NoChosenProduct
        | WorkflowError::NoCandidates
        | WorkflowError::MissingTenderData
        | WorkflowError::IncompleteCompanyProfile(_)
        | WorkflowError::InvalidSuggestionIndex(_) => StatusCode::BAD_REQUEST,
        WorkflowError::InvalidStage { .. } => StatusCode::CONFLICT,
    };
    (status, Json(serde_json::json!({ "detail": err.to_string() })))
}

fn upstream_error(err: anyhow::Error) -> ApiError {
    (
        StatusCode::BAD_GATEWAY,
        Json(serde_json::json!({ "detail": err.to_string() })),
    )
}

fn in_flight_response() -> Response {
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "in_flight" })),
    )
        .into_response()
}

fn superseded_response() -> Response {
    (
        StatusCode::CONFLICT,
        Json(serde_json::json!({
            "status": "superseded",
            "detail": "a new tender was ingested while the call was outstanding; the result was discarded",
        })),
    )
        .into_response()
}

/// Pull the `file` part out of a multipart upload.
async fn read_file_part(mut multipart: Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "detail": format!("invalid multipart body: {e}") })),
        )
    })? {
        if field.name() == Some("file") {
            let file_name = field
                .file_name()
                .unwrap_or("upload.bin")
                .to_string();
            let bytes = field.bytes().await.map_err(|e| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "detail": format!("failed to read upload: {e}") })),
                )
            })?;
            return Ok((file_name, bytes.to_vec()));
        }
    }
    Err((
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "detail": "multipart field 'file' is required" })),
    ))
}

/// Wrap generated document bytes in a downloadable attachment response.
fn attachment_response(file_name: &str, document: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={file_name}"),
            ),
        ],
        document,
    )
        .into_response()
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(engine): State<Arc<WorkflowEngine>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "stage": engine.state.current_stage().to_string(),
        "state_version": engine.state.current_state_version(),
        "server_time": chrono::Utc::now().timestamp_millis(),
    }))
}

// =============================================================================
// Full state snapshot
// =============================================================================

async fn full_state(State(engine): State<Arc<WorkflowEngine>>) -> impl IntoResponse {
    Json(engine.state.build_snapshot())
}

// =============================================================================
// Ingest
// =============================================================================

async fn ingest_tender(
    State(engine): State<Arc<WorkflowEngine>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let (file_name, bytes) = read_file_part(multipart).await?;

    match engine.ingest(&file_name, bytes).await {
        Ok(Triggered::Completed(tender)) => Ok(Json(tender).into_response()),
        Ok(Triggered::AlreadyRunning) => Ok(in_flight_response()),
        Ok(Triggered::Superseded) => Ok(superseded_response()),
        Err(e) => Err(workflow_error(e)),
    }
}

// =============================================================================
// Catalog passthroughs
// =============================================================================

async fn upload_catalog(
    State(engine): State<Arc<WorkflowEngine>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let (file_name, bytes) = read_file_part(multipart).await?;

    let count = engine
        .upload_catalog(&file_name, bytes)
        .await
        .map_err(upstream_error)?;
    Ok(Json(serde_json::json!({ "count": count })).into_response())
}

async fn list_catalog(
    State(engine): State<Arc<WorkflowEngine>>,
) -> Result<Response, ApiError> {
    let products = engine.list_catalog().await.map_err(upstream_error)?;
    Ok(Json(serde_json::json!({ "products": products })).into_response())
}

// =============================================================================
// Bid review
// =============================================================================

async fn recommend(
    State(engine): State<Arc<WorkflowEngine>>,
) -> Result<Response, ApiError> {
    match engine.request_recommendation().await {
        Ok(Triggered::Completed(set)) => {
            let record = engine.state.store.snapshot();
            Ok(Json(serde_json::json!({
                "suggestions": set.suggestions,
                "chosen_suggestion": record.chosen_suggestion,
                "profit_threshold_pct": record.profit_threshold_pct,
            }))
            .into_response())
        }
        Ok(Triggered::AlreadyRunning) => Ok(in_flight_response()),
        Ok(Triggered::Superseded) => Ok(superseded_response()),
        Err(e) => Err(workflow_error(e)),
    }
}

#[derive(Deserialize)]
struct ThresholdRequest {
    profit_threshold_pct: f64,
}

async fn set_threshold(
    State(engine): State<Arc<WorkflowEngine>>,
    Json(req): Json<ThresholdRequest>,
) -> impl IntoResponse {
    engine.set_profit_threshold(req.profit_threshold_pct);
    Json(engine.state.store.snapshot())
}

#[derive(Deserialize)]
struct ConfirmRequest {
    index: usize,
}

async fn confirm_suggestion(
    State(engine): State<Arc<WorkflowEngine>>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Response, ApiError> {
    let chosen = engine
        .confirm_suggestion(req.index)
        .map_err(workflow_error)?;
    Ok(Json(chosen).into_response())
}

// =============================================================================
// Finalize
// =============================================================================

#[derive(Deserialize)]
struct FinalizeBody {
    company: CompanyProfile,
    #[serde(default)]
    tender_name: Option<String>,
}

async fn finalize_proposal(
    State(engine): State<Arc<WorkflowEngine>>,
    Json(body): Json<FinalizeBody>,
) -> Result<Response, ApiError> {
    match engine.finalize(body.company, body.tender_name).await {
        Ok(Triggered::Completed(proposal)) => {
            let mut response = attachment_response(&proposal.file_name, proposal.document);
            let headers = response.headers_mut();

            if let Some(id) = proposal.history_id {
                if let Ok(v) = id.to_string().parse() {
                    headers.insert("x-history-id", v);
                }
                headers.insert("x-history-status", header::HeaderValue::from_static("ok"));
            } else {
                // history failure is soft: the document still ships
                warn!("finalize succeeded but history persistence failed");
                headers.insert(
                    "x-history-status",
                    header::HeaderValue::from_static("failed"),
                );
            }
            Ok(response)
        }
        Ok(Triggered::AlreadyRunning) => Ok(in_flight_response()),
        Ok(Triggered::Superseded) => Ok(superseded_response()),
        Err(e) => Err(workflow_error(e)),
    }
}

async fn quick_proposal(
    State(engine): State<Arc<WorkflowEngine>>,
) -> Result<Response, ApiError> {
    match engine.quick_proposal().await {
        Ok(Triggered::Completed(doc)) => Ok(attachment_response(&doc.file_name, doc.document)),
        Ok(Triggered::AlreadyRunning) => Ok(in_flight_response()),
        Ok(Triggered::Superseded) => Ok(superseded_response()),
        Err(e) => Err(workflow_error(e)),
    }
}

// =============================================================================
// History
// =============================================================================

async fn list_history(
    State(engine): State<Arc<WorkflowEngine>>,
) -> Result<Response, ApiError> {
    let proposals = engine.list_history().await.map_err(upstream_error)?;
    Ok(Json(serde_json::json!({ "proposals": proposals })).into_response())
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::AppState;
    use crate::runtime_config::RuntimeConfig;
    use crate::services::client::HttpBackendClient;

    #[test]
    fn router_builds_with_shared_engine() {
        let state = Arc::new(AppState::new(RuntimeConfig::default()));
        let client = Arc::new(HttpBackendClient::new("http://127.0.0.1:8000"));
        let engine = Arc::new(WorkflowEngine::new(
            state,
            client.clone(),
            client.clone(),
            client.clone(),
            client,
        ));
        let _router = router(engine);
    }

    #[test]
    fn error_mapping_distinguishes_operator_and_upstream_faults() {
        let (status, _) = workflow_error(WorkflowError::MissingTenderData);
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = workflow_error(WorkflowError::Recommendation("down".into()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, _) = workflow_error(WorkflowError::InvalidStage {
            operation: "confirm",
            stage: crate::types::WorkflowStage::Empty,
        });
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
