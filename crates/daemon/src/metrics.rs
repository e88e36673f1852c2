//! Prometheus metrics recording.
//!
//! Gauges mirror the numbers the reporter writes into `repl_monitor`, so an
//! operator can watch lag without querying the primary. Recording is a no-op
//! unless a recorder is installed (config key `metrics_address`).

use metrics::{counter, gauge};
use replmgr_core::LagSample;

/// Records the lag figures of one successful monitoring tick.
pub fn record_lag_sample(sample: &LagSample) {
    let labels = [("standby", sample.standby_node.to_string())];
    gauge!("replmgr_receive_lag_bytes", &labels).set(sample.receive_lag_bytes as f64);
    gauge!("replmgr_apply_lag_bytes", &labels).set(sample.apply_lag_bytes as f64);
}

/// Counts a monitoring tick by outcome.
pub fn record_tick(ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("replmgr_ticks_total", "outcome" => outcome).increment(1);
}

/// Counts one primary reconnect attempt.
pub fn record_reconnect_attempt() {
    counter!("replmgr_primary_reconnects_total").increment(1);
}
