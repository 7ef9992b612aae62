//! Gateway metrics
//!
//! Emitted through the `metrics` facade; whichever recorder the host process
//! installs picks them up, and without one the calls are no-ops.
//!
//! - `gateway_requests_total` (counter): labels `status`, `method`
//! - `gateway_token_refresh_total` (counter): label `outcome`
//! - `gateway_requests_replayed_total` (counter)
//! - `gateway_refresh_queue_depth` (gauge)

/// Record a response received from the server.
pub fn record_request(status: u16, method: &str) {
    metrics::counter!("gateway_requests_total", "status" => status.to_string(), "method" => method.to_string())
        .increment(1);
}

/// Record the end of a refresh cycle. `outcome` is `success` or `failure`.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("gateway_token_refresh_total", "outcome" => outcome).increment(1);
}

/// Record requests resubmitted with a refreshed token.
pub fn record_replayed(count: usize) {
    metrics::counter!("gateway_requests_replayed_total").increment(count as u64);
}

/// Current number of requests waiting on a refresh.
pub fn set_queue_depth(depth: usize) {
    metrics::gauge!("gateway_refresh_queue_depth").set(depth as f64);
}
