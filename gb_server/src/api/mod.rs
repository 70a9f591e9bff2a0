//! HTTP API for the greetbook server.
//!
//! This module provides the JSON endpoints for the account lifecycle:
//! signup, email verification, login/logout, password change, and the
//! mailed password reset flow.
//!
//! # Architecture
//!
//! The API is built with:
//! - **Axum**: Async web framework
//! - **Tower**: Middleware for CORS and request IDs
//! - **Database-backed sessions**: Cookie holds an opaque key, state
//!   lives in PostgreSQL
//!
//! # Modules
//!
//! - [`accounts`]: Account lifecycle handlers
//! - [`session`]: Cookie session middleware
//! - [`guard`]: Redirect guard for entry pages
//! - [`request_id`]: Request ID propagation
//!
//! # Endpoints Overview
//!
//! ```text
//! GET  /health                                  - Health check
//! POST /signup                                  - Create account, mail verification link
//! GET  /verify/{uid}/{token}                    - Follow verification link
//! POST /login                                   - Authenticate, rotate session
//! POST /logout                                  - Drop session
//! POST /password-change                         - Change password (auth required)
//! POST /password-reset                          - Request reset link by email
//! GET  /password-reset/done                     - Post-request landing page
//! GET  /password-reset/confirm/{uid}/{token}    - Follow reset link
//! POST /password-reset/confirm/{uid}/{token}    - Submit new password
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use gb_server::api::{AppState, create_router};
//! use std::sync::Arc;
//! # use greetbook::accounts::{AccountManager, SessionStore};
//! # use sqlx::PgPool;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let accounts: AccountManager = unimplemented!();
//! # let sessions: SessionStore = unimplemented!();
//! # let pool: PgPool = unimplemented!();
//!
//! let state = AppState {
//!     accounts: Arc::new(accounts),
//!     sessions: Arc::new(sessions),
//!     pool: Arc::new(pool),
//!     login_redirect_url: "/".to_string(),
//! };
//!
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//!
//! - Mailed links carry state-bound, expiring tokens; the token is
//!   swapped out of the URL on first use
//! - Login failures share one message regardless of the cause
//! - Reset requests answer identically for known and unknown addresses
//! - Session keys rotate at login
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production,
//! configure appropriate origins, methods, and headers.

pub mod accounts;
pub mod guard;
pub mod request_id;
pub mod session;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use greetbook::accounts::{AccountManager, SessionStore};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Signup page path
pub const SIGNUP_PATH: &str = "/signup";
/// Login page path
pub const LOGIN_PATH: &str = "/login";
/// Logout path
pub const LOGOUT_PATH: &str = "/logout";
/// Password reset request path
pub const PASSWORD_RESET_PATH: &str = "/password-reset";
/// Landing page after a reset request
pub const PASSWORD_RESET_DONE_PATH: &str = "/password-reset/done";
/// Password change path (authenticated)
pub const PASSWORD_CHANGE_PATH: &str = "/password-change";

/// Entry pages that bounce already-authenticated visitors. The
/// configured post-login target must not point at any of these.
pub const ENTRY_PAGES: &[&str] = &[SIGNUP_PATH, LOGIN_PATH, PASSWORD_RESET_PATH];

/// Application state shared across all HTTP handlers.
///
/// This state is cloned for each request (cheap due to Arc wrappers)
/// and provides access to the core system managers.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountManager>,
    pub sessions: Arc<SessionStore>,
    pub pool: Arc<PgPool>,
    /// Where authenticated visitors land after login
    pub login_redirect_url: String,
}

/// Create the complete API router with all endpoints and middleware.
///
/// Every account route runs behind the session middleware, which
/// resolves or creates the request's database-backed session. The
/// health check stays outside it so monitoring probes do not mint
/// session rows.
pub fn create_router(state: AppState) -> Router {
    let account_routes = Router::new()
        .route(SIGNUP_PATH, post(accounts::signup))
        .route(LOGIN_PATH, post(accounts::login))
        .route(LOGOUT_PATH, post(accounts::logout))
        .route(PASSWORD_CHANGE_PATH, post(accounts::change_password))
        .route(PASSWORD_RESET_PATH, post(accounts::request_password_reset))
        .route(PASSWORD_RESET_DONE_PATH, get(accounts::password_reset_done))
        .route(
            "/password-reset/confirm/{uid}/{token}",
            get(accounts::reset_confirm_page).post(accounts::reset_confirm_submit),
        )
        .route("/verify/{uid}/{token}", get(accounts::verify_email))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            session::session_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(account_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` if the database answers a trivial query, or
/// `503 Service Unavailable` otherwise.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8000/health
/// # {"status":"healthy","database":true,"version":"1.0.0","timestamp":"2026-08-29T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = sqlx::query("SELECT 1")
        .fetch_one(&*state.pool)
        .await
        .is_ok();

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
