//! Gate configuration.
//!
//! Every knob is deserializable from TOML with per-field defaults, so a
//! partial config file only overrides what it names. `validate()` must
//! be called before the configuration is used; the constructors of the
//! runtime components assume a validated config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::LoadLevel;

/// Top-level configuration for the whole subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub window: WindowConfig,
    pub evaluator: EvaluatorConfig,
    pub degradation: DegradationConfig,
    pub advisor: AdvisorConfig,
}

/// Shape of the metrics window: `bucket_count` buckets of `bucket_secs` each.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub bucket_secs: u64,
    pub bucket_count: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        // 12 × 5 s = a trailing 60-second window.
        Self {
            bucket_secs: 5,
            bucket_count: 12,
        }
    }
}

/// Weights for combining the normalized signal scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub response_time: f64,
    pub error_rate: f64,
    pub throughput: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            response_time: 0.4,
            error_rate: 0.4,
            throughput: 0.2,
        }
    }
}

/// Lower bounds of the elevated/high/critical bands.
///
/// Intervals are closed-open: a score exactly on a boundary belongs to
/// the higher level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelThresholds {
    pub elevated: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            elevated: 50.0,
            high: 75.0,
            critical: 90.0,
        }
    }
}

impl LevelThresholds {
    /// Classify an overall load score into a level.
    pub fn classify(&self, overall_load: f64) -> LoadLevel {
        if overall_load >= self.critical {
            LoadLevel::Critical
        } else if overall_load >= self.high {
            LoadLevel::High
        } else if overall_load >= self.elevated {
            LoadLevel::Elevated
        } else {
            LoadLevel::Normal
        }
    }
}

/// Load evaluator scoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Mean response time (ms) that maps to a score of 100.
    pub response_time_ceiling_ms: f64,
    /// Error fraction that maps to a score of 100 (0.10 = 10 %).
    pub error_rate_ceiling: f64,
    /// Estimated capacity in requests per second. When unset, the
    /// throughput signal is unavailable and contributes nothing.
    pub capacity_rps: Option<f64>,
    pub weights: ScoreWeights,
    pub thresholds: LevelThresholds,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            response_time_ceiling_ms: 2000.0,
            error_rate_ceiling: 0.10,
            capacity_rps: None,
            weights: ScoreWeights::default(),
            thresholds: LevelThresholds::default(),
        }
    }
}

/// Degradation controller parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationConfig {
    /// Endpoints exempt from shedding at critical load, matched by
    /// exact identifier. Unlisted endpoints are never exempt.
    pub essential_endpoints: Vec<String>,
    /// Maximum staleness of the cached snapshot on the hot path.
    pub refresh_interval_ms: u64,
    /// Floor for the retry-after hint handed to rejected callers.
    pub min_retry_after_secs: u64,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            essential_endpoints: vec![
                "health_check".to_string(),
                "auth_login".to_string(),
                "auth_logout".to_string(),
                "emergency_access".to_string(),
            ],
            refresh_interval_ms: 1000,
            min_retry_after_secs: 5,
        }
    }
}

/// Scaling advisor parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Number of snapshots the trend window holds.
    pub history_len: usize,
    /// Minimum interval between emitted scale-down actions.
    pub cooldown_secs: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            history_len: 5,
            cooldown_secs: 300,
        }
    }
}

impl GateConfig {
    /// Validate the whole configuration. Any violation is fatal.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.window.bucket_secs == 0 || self.window.bucket_count == 0 {
            return Err(ConfigError::EmptyWindow);
        }

        let e = &self.evaluator;
        if !(e.response_time_ceiling_ms > 0.0) {
            return Err(ConfigError::NonPositiveCeiling {
                name: "response_time_ceiling_ms",
                value: e.response_time_ceiling_ms,
            });
        }
        if !(e.error_rate_ceiling > 0.0) {
            return Err(ConfigError::NonPositiveCeiling {
                name: "error_rate_ceiling",
                value: e.error_rate_ceiling,
            });
        }
        if let Some(capacity) = e.capacity_rps {
            if !(capacity > 0.0) {
                return Err(ConfigError::NonPositiveCeiling {
                    name: "capacity_rps",
                    value: capacity,
                });
            }
        }

        let w = &e.weights;
        let sum = w.response_time + w.error_rate + w.throughput;
        let in_range = [w.response_time, w.error_rate, w.throughput]
            .iter()
            .all(|x| (0.0..=1.0).contains(x));
        if !in_range || (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::InvalidWeights { sum });
        }

        let t = &e.thresholds;
        let monotonic =
            t.elevated > 0.0 && t.elevated < t.high && t.high < t.critical && t.critical <= 100.0;
        if !monotonic {
            return Err(ConfigError::NonMonotonicThresholds {
                elevated: t.elevated,
                high: t.high,
                critical: t.critical,
            });
        }

        if self.advisor.history_len < 2 {
            return Err(ConfigError::HistoryTooShort(self.advisor.history_len));
        }

        Ok(())
    }

    /// Read a TOML config file and validate it.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Self = toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
