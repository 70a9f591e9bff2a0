//! Prometheus metrics for monitoring server health.
//!
//! This module provides metrics collection and export via a standalone
//! scrape endpoint. Metrics are exposed in Prometheus text format.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: Request counts, status codes
//! - **Account Metrics**: Signups, logins, verifications
//! - **Mail Metrics**: Outbound mail outcomes
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use gb_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("POST", "/login", 303);
//! metrics::login_attempts_total(true);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Sets up a Prometheus scrape endpoint on the specified address.
/// Metrics will be available at `http://<addr>/metrics`.
///
/// # Arguments
///
/// - `addr`: Address to bind the metrics server to (e.g., `0.0.0.0:9090`)
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

/// Record HTTP request.
///
/// Increments the total HTTP request counter with method, path, and status labels.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Increment signup attempts counter.
pub fn signup_attempts_total(success: bool) {
    metrics::counter!("signup_attempts_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Increment login attempts counter.
pub fn login_attempts_total(success: bool) {
    metrics::counter!("login_attempts_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Increment password reset requests counter.
pub fn password_reset_requests_total() {
    metrics::counter!("password_reset_requests_total").increment(1);
}

/// Increment completed password resets counter.
pub fn password_resets_completed_total() {
    metrics::counter!("password_resets_completed_total").increment(1);
}

/// Increment verified email addresses counter.
pub fn emails_verified_total() {
    metrics::counter!("emails_verified_total").increment(1);
}

/// Increment outbound mail counter.
pub fn mails_sent_total(success: bool) {
    metrics::counter!("mails_sent_total",
        "success" => success.to_string()
    )
    .increment(1);
}
