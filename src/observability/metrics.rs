//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gate metrics (rejections, auth failures, blocks, sessions)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gate_connections_rejected_total` (counter): deny-listed connections by stage
//! - `gate_proxy_headers_total` (counter): PROXY header outcomes by kind
//! - `gate_auth_failures_total` (counter): tracked failed authentications
//! - `gate_sessions_blocked_total` (counter): sessions closed at the threshold
//! - `gate_deny_list_entries` (gauge): tracked addresses by tier
//! - `gate_active_sessions` (gauge): current session count
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels are static strings only; client addresses never become labels

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_rejected(stage: &'static str) {
    counter!("gate_connections_rejected_total", "stage" => stage).increment(1);
}

pub fn record_proxy_header(outcome: &'static str) {
    counter!("gate_proxy_headers_total", "outcome" => outcome).increment(1);
}

pub fn record_auth_failure() {
    counter!("gate_auth_failures_total").increment(1);
}

pub fn record_session_blocked() {
    counter!("gate_sessions_blocked_total").increment(1);
}

pub fn record_deny_list_size(hot: usize, overflow: usize) {
    gauge!("gate_deny_list_entries", "tier" => "hot").set(hot as f64);
    gauge!("gate_deny_list_entries", "tier" => "overflow").set(overflow as f64);
}

pub fn record_active_sessions(count: u64) {
    gauge!("gate_active_sessions").set(count as f64);
}
