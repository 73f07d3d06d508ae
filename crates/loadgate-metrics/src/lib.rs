//! loadgate-metrics — request sample recording for loadgate.
//!
//! Maintains a bounded, time-decayed aggregate of completed requests
//! (count, errors, response times) and renders Prometheus-compatible
//! text exposition for the `/metrics` endpoint.
//!
//! # Architecture
//!
//! ```text
//! MetricsRecorder
//!   ├── record() ← called per completed request, never fails
//!   ├── fixed ring of time buckets (12 × 5 s by default)
//!   └── stats() → WindowStats consumed by the load evaluator
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod prometheus;
pub mod window;

pub use prometheus::render_prometheus;
pub use window::MetricsRecorder;
