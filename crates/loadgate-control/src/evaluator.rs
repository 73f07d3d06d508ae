//! Load evaluator — converts the raw metrics window into a `LoadSnapshot`.
//!
//! A pure function of the recorder's current window statistics plus any
//! injected external gauges (CPU, queue depth). Each signal is
//! normalized to [0, 100] against its configured ceiling, then combined
//! as a weighted average over the signals that are actually available:
//! an unconfigured or absent signal contributes neither value nor weight.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, bail};
use tracing::debug;

use loadgate_core::{EvaluatorConfig, LoadSnapshot};
use loadgate_metrics::MetricsRecorder;

/// Anything that can produce the current load snapshot.
///
/// Implemented by [`LoadEvaluator`]; the degradation controller and the
/// scaling advisor depend on this seam, so tests substitute scripted
/// sources.
pub trait SnapshotSource: Send + Sync {
    fn evaluate(&self) -> anyhow::Result<LoadSnapshot>;
}

/// Callback supplying an external scalar signal, already normalized to
/// [0, 100] by its provider.
pub type GaugeFn = Arc<dyn Fn() -> anyhow::Result<f64> + Send + Sync>;

struct ExternalGauge {
    name: String,
    weight: f64,
    read: GaugeFn,
}

/// Scores the metrics window into an overall load value and level.
pub struct LoadEvaluator {
    recorder: Arc<MetricsRecorder>,
    config: EvaluatorConfig,
    gauges: Vec<ExternalGauge>,
}

impl LoadEvaluator {
    /// Create an evaluator over a recorder. `config` must have passed
    /// `GateConfig::validate`.
    pub fn new(recorder: Arc<MetricsRecorder>, config: EvaluatorConfig) -> Self {
        Self {
            recorder,
            config,
            gauges: Vec::new(),
        }
    }

    /// Add an external scalar input as an additional weighted term.
    pub fn with_gauge(mut self, name: &str, weight: f64, read: GaugeFn) -> Self {
        self.gauges.push(ExternalGauge {
            name: name.to_string(),
            weight,
            read,
        });
        self
    }

    /// Clock-explicit evaluation, for deterministic tests.
    pub fn evaluate_at(&self, now_ms: u64) -> anyhow::Result<LoadSnapshot> {
        let stats = self.recorder.stats_at(now_ms);
        if stats.is_empty() {
            return Ok(LoadSnapshot::idle(now_ms));
        }

        let avg_response_time_ms = stats.avg_response_time_ms();
        let error_rate = stats.error_rate();
        let request_rate = stats.request_rate();

        let weights = &self.config.weights;
        let mut weighted = 0.0;
        let mut total_weight = 0.0;

        let response_time_score =
            clamp_score(avg_response_time_ms / self.config.response_time_ceiling_ms * 100.0);
        weighted += weights.response_time * response_time_score;
        total_weight += weights.response_time;

        let error_rate_score = clamp_score(error_rate / self.config.error_rate_ceiling * 100.0);
        weighted += weights.error_rate * error_rate_score;
        total_weight += weights.error_rate;

        if let Some(capacity_rps) = self.config.capacity_rps {
            let throughput_score = clamp_score(request_rate / capacity_rps * 100.0);
            weighted += weights.throughput * throughput_score;
            total_weight += weights.throughput;
        }

        for gauge in &self.gauges {
            let value = (gauge.read)()
                .with_context(|| format!("external gauge {} failed", gauge.name))?;
            if !value.is_finite() {
                bail!("external gauge {} returned a non-finite value", gauge.name);
            }
            weighted += gauge.weight * clamp_score(value);
            total_weight += gauge.weight;
        }

        let overall_load = if total_weight > 0.0 {
            weighted / total_weight
        } else {
            0.0
        };
        let load_level = self.config.thresholds.classify(overall_load);

        debug!(
            overall_load,
            level = %load_level,
            request_rate,
            error_rate,
            "load evaluated"
        );

        Ok(LoadSnapshot {
            overall_load,
            load_level,
            request_rate,
            avg_response_time_ms,
            error_rate,
            computed_at: now_ms,
        })
    }
}

impl SnapshotSource for LoadEvaluator {
    fn evaluate(&self) -> anyhow::Result<LoadSnapshot> {
        self.evaluate_at(now_millis())
    }
}

fn clamp_score(value: f64) -> f64 {
    value.min(100.0).max(0.0)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
