//! loadgate-advisor — capacity recommendations from load trends.
//!
//! Watches successive load snapshots and advises an external
//! orchestrator when to add or remove capacity. Purely advisory: the
//! gate itself never acts on these recommendations.
//!
//! ```text
//! SnapshotSource ──▶ ScalingAdvisor
//!                      ├── trend window of recent overall_load values
//!                      ├── least-squares slope + agreement confidence
//!                      ├── scale-up: degraded and not improving
//!                      └── scale-down: sustained normal, cooldown-gated
//! ```

pub mod advisor;

pub use advisor::ScalingAdvisor;
