//! loadgate-control — load evaluation and admission control.
//!
//! The two components on the decision side of the gate:
//!
//! ```text
//! LoadEvaluator (SnapshotSource)
//!   ├── reads WindowStats from the metrics recorder
//!   ├── weighted scoring → overall_load in [0, 100]
//!   └── threshold classification → LoadLevel
//!
//! DegradationController
//!   ├── should_reject() / admit() ← hot path, cached snapshot only
//!   ├── essential allowlist bypass at critical load
//!   ├── refresh loop (periodic + lazy, bounded staleness)
//!   └── fails open: evaluator errors keep the last good snapshot
//! ```
//!
//! Both are explicitly constructed, dependency-injected instances; there
//! are no module-level globals, so each test builds its own world.

pub mod controller;
pub mod evaluator;

pub use controller::{DegradationController, REASON_SYSTEM_OVERLOADED};
pub use evaluator::{GaugeFn, LoadEvaluator, SnapshotSource};
