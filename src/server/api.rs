//! REST API handlers for the control server

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::channel::{ChannelEvent, InboundReply};
use crate::metrics;
use crate::queue::{CancelAck, QueueError, QueueStatus, StartAck};
use crate::schedule::ScheduleConfig;

use super::AppState;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

fn fail<T: Serialize>(status: StatusCode, message: impl Into<String>) -> ApiResult<T> {
    (status, Json(ApiResponse::error(message)))
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub queue_active: bool,
}

/// Start request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    /// Topics, one item each
    pub items: Vec<String>,

    /// Falls back to the server's default schedule
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,

    #[serde(default)]
    pub approval_required: bool,
}

/// Operator reply acknowledgement
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplyAck {
    /// Whether the reply answered the pending question
    pub accepted: bool,
}

fn queue_error_status(err: &QueueError) -> StatusCode {
    match err {
        QueueError::AlreadyActive { .. } | QueueError::NotActive => StatusCode::CONFLICT,
        QueueError::ApprovalUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        QueueError::EmptyBatch | QueueError::BatchTooLarge { .. } | QueueError::InvalidSchedule(_) => {
            StatusCode::BAD_REQUEST
        }
    }
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/queue/start", post(start_queue))
        .route("/api/queue/cancel", post(cancel_queue))
        .route("/api/queue/status", get(queue_status))
        .route("/api/operator/replies", post(operator_reply))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.queue.status().await;

    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        queue_active: status.active,
    }))
}

async fn start_queue(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> ApiResult<StartAck> {
    let schedule = request
        .schedule
        .unwrap_or_else(|| state.default_schedule.clone());

    match state
        .queue
        .start(request.items, schedule, request.approval_required)
        .await
    {
        Ok(ack) => ok(ack),
        Err(e) => fail(queue_error_status(&e), e.to_string()),
    }
}

async fn cancel_queue(State(state): State<AppState>) -> ApiResult<CancelAck> {
    match state.queue.cancel().await {
        Ok(ack) => ok(ack),
        Err(e) => fail(queue_error_status(&e), e.to_string()),
    }
}

async fn queue_status(State(state): State<AppState>) -> ApiResult<QueueStatus> {
    ok(state.queue.status().await)
}

async fn operator_reply(
    State(state): State<AppState>,
    Json(inbound): Json<InboundReply>,
) -> ApiResult<ReplyAck> {
    let Some(inbox) = &state.inbox else {
        return fail(StatusCode::SERVICE_UNAVAILABLE, "No operator channel configured");
    };

    match ChannelEvent::try_from(inbound) {
        Ok(event) => ok(ReplyAck {
            accepted: inbox.deliver(event),
        }),
        Err(e) => fail(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

async fn prometheus_metrics() -> Response {
    match metrics::gather_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
