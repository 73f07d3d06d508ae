//! Admission middleware.
//!
//! Sits in front of every gated route. Rejected requests get a 503
//! with a `Retry-After` header and never reach the handler; admitted
//! requests are timed end to end and fed back into the metrics
//! recorder, closing the loop that drives the next evaluation.
//!
//! Every response carries `x-load-level` and `x-load-score`, so
//! clients can back off before the gate ever rejects them.

use std::time::Instant;

use axum::body::Body;
use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::http::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use tracing::debug;

use loadgate_core::LoadSnapshot;

use crate::GateState;

pub const LOAD_LEVEL_HEADER: &str = "x-load-level";
pub const LOAD_SCORE_HEADER: &str = "x-load-score";
pub const DEGRADATION_ACTIVE_HEADER: &str = "x-degradation-active";
pub const DEGRADATION_LEVEL_HEADER: &str = "x-degradation-level";
pub const RESPONSE_TIME_HEADER: &str = "x-response-time-ms";

/// Admission gate middleware, applied via [`crate::apply_gate`].
pub async fn admission_gate(
    State(state): State<GateState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // The matched route pattern is the endpoint identity; raw paths
    // only appear for requests that matched no route.
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let decision = state.controller.admit(&endpoint);
    if !decision.allowed {
        let snapshot = state.controller.current_metrics();
        return rejection_response(&decision, &snapshot);
    }

    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    // Rejections never get here, so the window only ever holds samples
    // for work the application actually performed.
    state
        .recorder
        .record(elapsed_ms, response.status().is_server_error());

    let snapshot = state.controller.current_metrics();
    apply_load_headers(response.headers_mut(), &snapshot);
    insert_header(
        response.headers_mut(),
        RESPONSE_TIME_HEADER,
        &format!("{elapsed_ms:.1}"),
    );
    response
}

fn rejection_response(
    decision: &loadgate_core::AdmitDecision,
    snapshot: &LoadSnapshot,
) -> Response {
    let retry_after = decision.retry_after_seconds.unwrap_or(0);
    debug!(retry_after, "shedding request");

    let body = Json(serde_json::json!({
        "success": false,
        "error": {
            "code": decision.reason_code,
            "message": "system overloaded, request shed",
        },
        "retry_after": decision.retry_after_seconds,
    }));

    let mut response = (StatusCode::SERVICE_UNAVAILABLE, body).into_response();
    apply_load_headers(response.headers_mut(), snapshot);
    if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
        response.headers_mut().insert(RETRY_AFTER, value);
    }
    response
}

fn apply_load_headers(headers: &mut HeaderMap, snapshot: &LoadSnapshot) {
    insert_header(headers, LOAD_LEVEL_HEADER, snapshot.load_level.as_str());
    insert_header(
        headers,
        LOAD_SCORE_HEADER,
        &format!("{:.1}", snapshot.overall_load),
    );
    if snapshot.load_level.is_degraded() {
        insert_header(headers, DEGRADATION_ACTIVE_HEADER, "true");
        insert_header(
            headers,
            DEGRADATION_LEVEL_HEADER,
            snapshot.load_level.as_str(),
        );
    }
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
