//! Control-plane handlers.
//!
//! Read-only views of the gate: health, current load, degradation
//! state, and the latest scaling recommendation.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use loadgate_core::HealthState;
use loadgate_metrics::render_prometheus;

use crate::GateState;

/// Response wrapper for consistent API format.
///
/// These handlers read infallible cached state, so the envelope only
/// carries the success shape; the gate middleware owns the error body.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    data: T,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// GET /api/v1/health
///
/// Always answers, degraded or not; orchestrators that only look at
/// the status code get a 503 while shedding is possible.
pub async fn get_health(State(state): State<GateState>) -> impl IntoResponse {
    let report = state.controller.health_status();
    let recommendation = state.advisor.latest();
    let status = match report.status {
        HealthState::Healthy => StatusCode::OK,
        HealthState::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };

    let body = Json(serde_json::json!({
        "system_health": {
            "status": report.status,
            "checks": {
                "load_level": report.snapshot.load_level,
                "overall_load": report.snapshot.overall_load,
                "degradation_active": report.snapshot.load_level.is_degraded(),
                "error_rate": report.snapshot.error_rate,
                "request_rate": report.snapshot.request_rate,
            },
        },
        "scaling_recommendation": {
            "action": recommendation.action,
            "reason": recommendation.reason,
        },
        "timestamp": now_millis(),
    }));
    (status, body)
}

/// GET /api/v1/load
pub async fn get_load(State(state): State<GateState>) -> impl IntoResponse {
    ApiResponse::ok(state.controller.current_metrics())
}

/// GET /api/v1/degradation
pub async fn get_degradation(State(state): State<GateState>) -> impl IntoResponse {
    ApiResponse::ok(state.controller.degradation_state())
}

/// GET /api/v1/scaling
pub async fn get_scaling(State(state): State<GateState>) -> impl IntoResponse {
    ApiResponse::ok(state.advisor.latest())
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<GateState>) -> impl IntoResponse {
    let snapshot = state.controller.current_metrics();
    let (admitted, rejected) = state.controller.counters();
    let body = render_prometheus(&snapshot, admitted, rejected);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
