//! Metrics collection.
//!
//! # Metrics
//! - `config_reloads_total` (counter): watcher-triggered reloads by outcome
//! - `config_writes_total` (counter): disk writes by format
//! - `config_validation_failures_total` (counter): rejected payloads
//! - `config_active_subscriptions` (gauge): registered subscribers
//!
//! Without an installed recorder these calls are no-ops.

use metrics::{counter, gauge};

use crate::codec::Format;

pub fn record_reload(outcome: &'static str) {
    counter!("config_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_write(format: Format) {
    counter!("config_writes_total", "format" => format.to_string()).increment(1);
}

pub fn record_validation_failure() {
    counter!("config_validation_failures_total").increment(1);
}

pub fn record_subscriptions(count: usize) {
    gauge!("config_active_subscriptions").set(count as f64);
}
