//! Domain types for the loadgate subsystem.
//!
//! Snapshots and recommendations are immutable value objects: a new one
//! replaces the old one wholesale, never a field-wise merge. Consumers
//! may rely on `computed_at` / `generated_at` being monotonically
//! non-decreasing across successive observations.

use serde::{Deserialize, Serialize};

// ── Load level ────────────────────────────────────────────────────

/// Discrete classification of the overall load score.
///
/// Ordered: `Normal < Elevated < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadLevel {
    Normal,
    Elevated,
    High,
    Critical,
}

impl LoadLevel {
    /// Whether this level counts as active degradation.
    pub fn is_degraded(self) -> bool {
        matches!(self, LoadLevel::High | LoadLevel::Critical)
    }

    /// Stable lowercase name, used in headers and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            LoadLevel::Normal => "normal",
            LoadLevel::Elevated => "elevated",
            LoadLevel::High => "high",
            LoadLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for LoadLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Window statistics ─────────────────────────────────────────────

/// Raw, read-only view of the metrics window.
///
/// Produced by the metrics recorder as a consistent point-in-time copy;
/// the load evaluator derives its scores from this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub count: u64,
    pub error_count: u64,
    pub sum_response_time_ms: f64,
    pub max_response_time_ms: f64,
    /// Span of the window in seconds (bucket width × bucket count).
    pub window_span_secs: f64,
}

impl WindowStats {
    /// Requests per second over the window span.
    pub fn request_rate(&self) -> f64 {
        if self.window_span_secs > 0.0 {
            self.count as f64 / self.window_span_secs
        } else {
            0.0
        }
    }

    /// Mean response time in milliseconds; 0 for an empty window.
    pub fn avg_response_time_ms(&self) -> f64 {
        if self.count > 0 {
            self.sum_response_time_ms / self.count as f64
        } else {
            0.0
        }
    }

    /// Error fraction (0.0–1.0); 0 for an empty window.
    pub fn error_rate(&self) -> f64 {
        if self.count > 0 {
            self.error_count as f64 / self.count as f64
        } else {
            0.0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

// ── Load snapshot ─────────────────────────────────────────────────

/// Point-in-time load assessment produced by the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSnapshot {
    /// Combined load score in [0, 100].
    pub overall_load: f64,
    pub load_level: LoadLevel,
    /// Requests per second over the window.
    pub request_rate: f64,
    pub avg_response_time_ms: f64,
    /// Error fraction (0.0–1.0).
    pub error_rate: f64,
    /// Unix timestamp in milliseconds when this snapshot was computed.
    pub computed_at: u64,
}

impl LoadSnapshot {
    /// Snapshot for an idle window. Absence of traffic is never overload.
    pub fn idle(computed_at: u64) -> Self {
        Self {
            overall_load: 0.0,
            load_level: LoadLevel::Normal,
            request_rate: 0.0,
            avg_response_time_ms: 0.0,
            error_rate: 0.0,
            computed_at,
        }
    }
}

// ── Degradation state ─────────────────────────────────────────────

/// Process-wide degradation state, driven solely by successive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationState {
    /// True while the level is `High` or `Critical`.
    pub active: bool,
    pub level: LoadLevel,
    /// Unix timestamp (ms) when degradation last activated; `None` while inactive.
    pub activated_at: Option<u64>,
    /// Unix timestamp (ms) of the last successful evaluation.
    pub last_evaluated_at: u64,
}

// ── Scaling recommendation ────────────────────────────────────────

/// Capacity action recommended to an external orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleAction {
    ScaleUp,
    ScaleDown,
    None,
}

impl ScaleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ScaleAction::ScaleUp => "scale_up",
            ScaleAction::ScaleDown => "scale_down",
            ScaleAction::None => "none",
        }
    }
}

impl std::fmt::Display for ScaleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One advisory cycle's output. Superseded, never merged, by the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingRecommendation {
    pub action: ScaleAction,
    pub reason: String,
    /// How strongly the trend supports the action, in [0, 1].
    pub confidence: f64,
    /// Unix timestamp in milliseconds.
    pub generated_at: u64,
}

impl ScalingRecommendation {
    /// A no-action recommendation with the given reason.
    pub fn none(reason: impl Into<String>, generated_at: u64) -> Self {
        Self {
            action: ScaleAction::None,
            reason: reason.into(),
            confidence: 0.0,
            generated_at,
        }
    }
}

// ── Admission decision ────────────────────────────────────────────

/// The boundary object handed to the request gate for each request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmitDecision {
    pub allowed: bool,
    /// Machine-readable reason code, set on rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    /// Back-off hint for the caller, set on rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl AdmitDecision {
    pub fn admit() -> Self {
        Self {
            allowed: true,
            reason_code: None,
            retry_after_seconds: None,
        }
    }

    pub fn reject(reason_code: &str, retry_after_seconds: u64) -> Self {
        Self {
            allowed: false,
            reason_code: Some(reason_code.to_string()),
            retry_after_seconds: Some(retry_after_seconds),
        }
    }
}

// ── Health report ─────────────────────────────────────────────────

/// Coarse health classification for the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
}

impl HealthState {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health status plus the snapshot it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub snapshot: LoadSnapshot,
}
