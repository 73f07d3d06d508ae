//! loadgate-core — shared domain types and configuration for loadgate.
//!
//! The value objects exchanged between the subsystems live here:
//! raw window statistics, load snapshots, degradation state, scaling
//! recommendations, and admission decisions. All of them are plain
//! serde-serializable data; none carry behavior beyond derived
//! accessors and classification.
//!
//! Configuration is serde-deserializable from TOML with per-field
//! defaults. Degenerate configuration (non-monotonic thresholds,
//! non-positive ceilings, weights that do not sum to 1) is rejected at
//! startup with a [`ConfigError`] rather than producing nonsensical
//! load levels at runtime.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    AdvisorConfig, DegradationConfig, EvaluatorConfig, GateConfig, LevelThresholds, ScoreWeights,
    WindowConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
