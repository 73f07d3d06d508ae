//! Error types for loadgate configuration.

use thiserror::Error;

/// Result type alias for configuration loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating the gate configuration.
///
/// All of these are fatal at startup: the subsystem refuses to
/// initialize with a degenerate configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(String),

    #[error("failed to parse config file: {0}")]
    Parse(String),

    #[error("metrics window must have at least one bucket of non-zero width")]
    EmptyWindow,

    #[error("{name} must be positive, got {value}")]
    NonPositiveCeiling { name: &'static str, value: f64 },

    #[error("score weights must each lie in [0, 1] and sum to 1, got sum {sum}")]
    InvalidWeights { sum: f64 },

    #[error(
        "load level thresholds must strictly increase within (0, 100], \
         got elevated={elevated} high={high} critical={critical}"
    )]
    NonMonotonicThresholds {
        elevated: f64,
        high: f64,
        critical: f64,
    },

    #[error("advisor history must hold at least two snapshots, got {0}")]
    HistoryTooShort(usize),
}
