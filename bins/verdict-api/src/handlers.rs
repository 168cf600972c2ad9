// HTTP route handlers for the Verdict API

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use verdict_common::types::{ExecuteRequest, ExecuteResponse};
use verdict_engine::executor::CODE_REQUIRED;
use verdict_engine::{Engine, EngineError};

use crate::metrics;
use crate::AppState;

pub const INVALID_BODY: &str = "Invalid request body";

/// POST /api/execute - Run a submission and judge its test cases
pub async fn execute_code(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> impl IntoResponse {
    let body = match payload {
        Ok(Json(body)) => Some(body),
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected unreadable request body");
            None
        }
    };

    let (status, response) = handle_execute(&state.engine, body).await;
    (status, Json(response))
}

/// Request handling without the axum extractors.
///
/// `None` stands for a body that was not JSON at all.
pub async fn handle_execute(engine: &Engine, body: Option<Value>) -> (StatusCode, ExecuteResponse) {
    let request = match body.ok_or_else(|| INVALID_BODY.to_string()).and_then(parse_request) {
        Ok(request) => request,
        Err(message) => {
            metrics::record_rejected();
            return (StatusCode::BAD_REQUEST, ExecuteResponse::rejected(message));
        }
    };

    match engine.execute(request).await {
        Ok(response) => {
            info!(
                success = response.success,
                passed = response.passed_count(),
                execution_ms = response.execution_time,
                "Submission finished"
            );
            metrics::record_response(&response);
            (StatusCode::OK, response)
        }
        Err(EngineError::InvalidInput(message)) => {
            metrics::record_rejected();
            (StatusCode::BAD_REQUEST, ExecuteResponse::rejected(message))
        }
        Err(e) => {
            error!(error = %e, "Submission failed outside the sandbox");
            metrics::record_rejected();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ExecuteResponse::rejected(e.to_string()),
            )
        }
    }
}

/// `code` is checked before the rest of the shape so a non-string code gets
/// the specific message.
fn parse_request(body: Value) -> Result<ExecuteRequest, String> {
    match body.get("code") {
        Some(Value::String(code)) if !code.is_empty() => {}
        _ => return Err(CODE_REQUIRED.to_string()),
    }
    serde_json::from_value(body).map_err(|_| INVALID_BODY.to_string())
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text exposition
pub async fn export_metrics() -> impl IntoResponse {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
