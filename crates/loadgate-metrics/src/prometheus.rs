//! Prometheus text exposition format.
//!
//! Renders the current load snapshot and admission counters into the
//! Prometheus text exposition format for scraping.

use loadgate_core::LoadSnapshot;

/// Render the current load state into Prometheus text format.
///
/// `admitted` and `rejected` are cumulative admission counters for the
/// process lifetime.
pub fn render_prometheus(snapshot: &LoadSnapshot, admitted: u64, rejected: u64) -> String {
    let mut out = String::new();

    out.push_str("# HELP loadgate_overall_load Combined load score (0-100).\n");
    out.push_str("# TYPE loadgate_overall_load gauge\n");
    out.push_str(&format!("loadgate_overall_load {:.2}\n", snapshot.overall_load));

    out.push_str("# HELP loadgate_load_level Current load level (0=normal 1=elevated 2=high 3=critical).\n");
    out.push_str("# TYPE loadgate_load_level gauge\n");
    out.push_str(&format!(
        "loadgate_load_level{{level=\"{}\"}} {}\n",
        snapshot.load_level,
        snapshot.load_level as u8
    ));

    out.push_str("# HELP loadgate_degradation_active Whether load shedding may reject requests.\n");
    out.push_str("# TYPE loadgate_degradation_active gauge\n");
    out.push_str(&format!(
        "loadgate_degradation_active {}\n",
        u8::from(snapshot.load_level.is_degraded())
    ));

    out.push_str("# HELP loadgate_request_rate Requests per second over the window.\n");
    out.push_str("# TYPE loadgate_request_rate gauge\n");
    out.push_str(&format!("loadgate_request_rate {:.2}\n", snapshot.request_rate));

    out.push_str("# HELP loadgate_avg_response_time_ms Mean response time in milliseconds.\n");
    out.push_str("# TYPE loadgate_avg_response_time_ms gauge\n");
    out.push_str(&format!(
        "loadgate_avg_response_time_ms {:.2}\n",
        snapshot.avg_response_time_ms
    ));

    out.push_str("# HELP loadgate_error_rate Error rate (0.0-1.0).\n");
    out.push_str("# TYPE loadgate_error_rate gauge\n");
    out.push_str(&format!("loadgate_error_rate {:.4}\n", snapshot.error_rate));

    out.push_str("# HELP loadgate_requests_admitted_total Requests admitted by the gate.\n");
    out.push_str("# TYPE loadgate_requests_admitted_total counter\n");
    out.push_str(&format!("loadgate_requests_admitted_total {admitted}\n"));

    out.push_str("# HELP loadgate_requests_rejected_total Requests rejected by the gate.\n");
    out.push_str("# TYPE loadgate_requests_rejected_total counter\n");
    out.push_str(&format!("loadgate_requests_rejected_total {rejected}\n"));

    out
}
