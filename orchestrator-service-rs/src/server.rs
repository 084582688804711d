// orchestrator-service-rs/src/server.rs
// HTTP/REST surface over the workflow orchestrator
//
// Routes:
// - POST /workflow/execute      submit a request (202), or run it to completion with `wait`
// - GET  /workflow/status       every status record
// - GET  /workflow/status/:id   one status record
// - POST /workflow/cancel/:id   stop a workflow before its next stage
// - GET  /agents/info           capabilities available to each stage
// - GET  /health

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use shared_types_rs::{StageName, StatusRecord};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::errors::OrchestrationError;
use crate::orchestrator::{SubmitRequest, WorkflowOrchestrator};

pub const SERVICE_NAME: &str = "orchestrator-service";

/// Request bodies above this size are rejected with 413
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    orchestrator: WorkflowOrchestrator,
    started_at: Instant,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    #[serde(alias = "user_request")]
    pub raw_text: String,
    #[serde(default, alias = "request_id")]
    pub id: Option<String>,
    /// Hold the response until the workflow is terminal
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub request_id: String,
    pub status_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub request_id: String,
    pub cancelled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub service_name: String,
    pub uptime_seconds: u64,
    pub workflows: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CapabilityInfo {
    pub name: String,
    pub primary_available: bool,
    pub primary_blocker: Option<String>,
    pub circuit: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

/// Maps orchestrator failures onto status codes
pub struct ApiError(OrchestrationError);

impl From<OrchestrationError> for ApiError {
    fn from(err: OrchestrationError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OrchestrationError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            OrchestrationError::NotFound(_) => StatusCode::NOT_FOUND,
            OrchestrationError::DuplicateRequest(_) => StatusCode::CONFLICT,
            OrchestrationError::StageFailure { .. }
            | OrchestrationError::Cancelled(_)
            | OrchestrationError::Join(_)
            | OrchestrationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(orchestrator: WorkflowOrchestrator) -> Router {
    let state = AppState {
        orchestrator,
        started_at: Instant::now(),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/workflow/execute", post(execute_handler))
        .route("/workflow/status", get(list_handler))
        .route("/workflow/status/:id", get(status_handler))
        .route("/workflow/cancel/:id", post(cancel_handler))
        .route("/agents/info", get(agents_handler))
        .layer(RequestBodyLimitLayer::new(MAX_PAYLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(orchestrator: WorkflowOrchestrator, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(orchestrator);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %listener.local_addr()?, "{} listening", SERVICE_NAME);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("{} stopped", SERVICE_NAME);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        service_name: SERVICE_NAME.to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        workflows: state.orchestrator.list_statuses().len(),
    })
}

async fn execute_handler(
    State(state): State<AppState>,
    Json(body): Json<ExecuteRequest>,
) -> Result<Response, ApiError> {
    let submission = SubmitRequest {
        raw_text: body.raw_text,
        id: body.id,
    };
    let handle = state.orchestrator.submit(submission)?;
    info!(request_id = %handle.request_id, wait = body.wait, "workflow submitted over http");

    if body.wait {
        let record: StatusRecord = handle.wait().await?;
        return Ok((StatusCode::OK, Json(record)).into_response());
    }

    let response = ExecuteResponse {
        status_url: format!("/workflow/status/{}", handle.request_id),
        request_id: handle.request_id,
    };
    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

async fn list_handler(State(state): State<AppState>) -> Json<Vec<StatusRecord>> {
    Json(state.orchestrator.list_statuses())
}

async fn status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusRecord>, ApiError> {
    Ok(Json(state.orchestrator.status(&id)?))
}

async fn cancel_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = state.orchestrator.cancel(&id)?;
    Ok(Json(CancelResponse {
        request_id: id,
        cancelled,
    }))
}

async fn agents_handler(
    State(state): State<AppState>,
) -> Json<BTreeMap<StageName, Vec<CapabilityInfo>>> {
    let registry = state.orchestrator.registry();
    let agents = StageName::ALL
        .into_iter()
        .map(|stage| {
            let capabilities = registry
                .capabilities_for(stage)
                .iter()
                .filter_map(|name| registry.lookup(stage, name).ok())
                .map(|entry| CapabilityInfo {
                    name: entry.descriptor.capability_name.clone(),
                    primary_available: entry.primary_blocker().is_none(),
                    primary_blocker: entry.primary_blocker().map(str::to_string),
                    circuit: entry.resilience.circuit_breaker_status().to_string(),
                })
                .collect();
            (stage, capabilities)
        })
        .collect();
    Json(agents)
}
