//! loadgate-api — HTTP surface for the load gate.
//!
//! Provides the admission middleware that fronts application routes,
//! plus the control-plane endpoints for inspecting the gate.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/health` | Health status with current snapshot |
//! | GET | `/api/v1/load` | Current load snapshot |
//! | GET | `/api/v1/degradation` | Degradation state |
//! | GET | `/api/v1/scaling` | Latest scaling recommendation |
//! | GET | `/metrics` | Prometheus exposition |
//!
//! The admission middleware is applied with [`apply_gate`]; endpoints
//! are identified by their matched route path, so allowlist entries for
//! HTTP routes are paths like `/api/v1/health`.

pub mod gate;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::get;

use loadgate_advisor::ScalingAdvisor;
use loadgate_control::DegradationController;
use loadgate_metrics::MetricsRecorder;

/// Shared state for the gate middleware and the API handlers.
#[derive(Clone)]
pub struct GateState {
    pub controller: Arc<DegradationController>,
    pub advisor: Arc<ScalingAdvisor>,
    pub recorder: Arc<MetricsRecorder>,
}

/// Build the control-plane router (status endpoints + metrics).
pub fn build_router(state: GateState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/load", get(handlers::get_load))
        .route("/degradation", get(handlers::get_degradation))
        .route("/scaling", get(handlers::get_scaling))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}

/// Layer the admission gate over a router.
///
/// Every request through the returned router is admitted or shed by the
/// controller, and admitted requests feed their response time and
/// status back into the metrics recorder.
pub fn apply_gate(router: Router, state: GateState) -> Router {
    router.layer(middleware::from_fn_with_state(state, gate::admission_gate))
}
