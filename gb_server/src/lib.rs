//! HTTP server for the greetbook web application.
//!
//! Wires the [`greetbook`] account library to an Axum HTTP surface:
//! configuration from the environment, structured logging, Prometheus
//! metrics, and the JSON account endpoints.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
