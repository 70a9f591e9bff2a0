//! Request ID middleware for tracing and debugging.
//!
//! This module provides request ID generation and propagation for better
//! debugging and log correlation.

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Header name for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Generate or extract request ID from headers
fn get_or_generate_request_id(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Middleware to add request ID to all requests and responses
///
/// This middleware:
/// 1. Extracts existing request ID from header or generates a new one
/// 2. Adds request ID to response headers
/// 3. Records the request in the HTTP metrics
pub async fn request_id_middleware(
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let request_id = get_or_generate_request_id(request.headers());
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %request.uri(),
        "Request started"
    );

    let response = next.run(request).await;

    let (mut parts, body) = response.into_parts();
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, header_value);
    }

    crate::metrics::http_requests_total(&method, &path, parts.status.as_u16());

    tracing::info!(
        request_id = %request_id,
        status = %parts.status,
        "Request completed"
    );

    Ok(Response::from_parts(parts, body))
}

/// Request ID wrapper for extracting from request extensions
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

impl RequestId {
    /// Get the request ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Axum extractor for request ID
impl<S> axum::extract::FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestId>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Request ID not found in extensions",
        ))
    }
}
