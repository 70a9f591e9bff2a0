//! Structured logging configuration.
//!
//! This module provides structured logging with request correlation and
//! security event tracking.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging
///
/// Features:
/// - Request ID correlation
/// - Security event tracking
/// - Configurable log levels via RUST_LOG env var
///
/// # Example
///
/// ```no_run
/// use gb_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    // Console layer for development
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log security event with structured data
///
/// # Arguments
///
/// * `event_type` - Type of security event
/// * `account_id` - Optional account ID
/// * `message` - Event message
///
/// # Example
///
/// ```
/// use gb_server::logging::log_security_event;
///
/// log_security_event("failed_login", None, "Invalid credentials");
/// ```
pub fn log_security_event(event_type: &str, account_id: Option<i64>, message: &str) {
    tracing::warn!(
        event_type = event_type,
        account_id = account_id,
        "SECURITY: {}",
        message
    );
}
