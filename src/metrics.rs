//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Monitor cycle throughput and failures
//! - Per-target backup health (running flag, document count delta)
//! - Edge-triggered event emission
//! - Alert delivery outcomes
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `savemyseat_` and follow Prometheus
//! conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration)
//!
//! # Usage
//!
//! ```rust,no_run
//! use savemyseat::metrics;
//! use std::time::Duration;
//!
//! // After a successful monitor cycle
//! metrics::record_monitor_cycle(Duration::from_millis(120));
//!
//! // When a target's observed drift changes
//! metrics::set_document_delta("docs", 42);
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Gauge for daemon lifecycle state.
pub fn set_monitor_state(state: &str) {
    // Encode state as numeric for alerting (0=created, 1=running, 2=stopped).
    let value = match state {
        "Created" => 0.0,
        "Running" => 1.0,
        "Stopped" => 2.0,
        _ => -1.0,
    };
    gauge!("savemyseat_monitor_state").set(value);
}

/// Gauge for how many targets the daemon is watching.
pub fn set_monitored_targets(count: usize) {
    gauge!("savemyseat_monitored_targets").set(count as f64);
}

/// Record a completed monitor cycle.
pub fn record_monitor_cycle(duration: Duration) {
    counter!("savemyseat_monitor_cycles_total").increment(1);
    histogram!("savemyseat_monitor_cycle_duration_seconds").record(duration.as_secs_f64());
}

/// Record a monitor cycle that failed before evaluation.
pub fn record_monitor_cycle_error() {
    counter!("savemyseat_monitor_cycle_errors_total").increment(1);
}

/// Record an emitted health event by kind (`triggered` / `resolved`).
pub fn record_monitor_event(kind: &str) {
    counter!("savemyseat_monitor_events_total", "event" => kind.to_string()).increment(1);
}

/// Gauge for a target's source-minus-destination document count.
pub fn set_document_delta(target: &str, delta: i64) {
    gauge!("savemyseat_document_count_delta", "target" => target.to_string()).set(delta as f64);
}

/// Gauge for whether a target's replication task is currently running.
pub fn set_backup_running(target: &str, running: bool) {
    let value = if running { 1.0 } else { 0.0 };
    gauge!("savemyseat_backup_running", "target" => target.to_string()).set(value);
}

/// Record an alert delivery attempt by outcome
/// (`delivered` / `failed` / `throttled` / `skipped`).
pub fn record_notification(outcome: &str) {
    counter!("savemyseat_notifications_total", "outcome" => outcome.to_string()).increment(1);
}
