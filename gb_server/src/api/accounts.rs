//! Account API handlers.
//!
//! This module provides the HTTP endpoints for the account lifecycle:
//! - Signup with mailed email verification link
//! - Login / logout with session rotation
//! - Password change for authenticated accounts
//! - Password reset over mailed, single-use links
//!
//! All endpoints return JSON; flow steps that move the browser along
//! (signup done, login, logout) answer `303 See Other` with a
//! `Location` header so the JSON body and the redirect agree.
//!
//! # Examples
//!
//! Sign up:
//! ```bash
//! curl -X POST http://localhost:8000/signup \
//!   -H "Content-Type: application/json" \
//!   -d '{"username": "alice", "email": "alice@example.com", "date_of_birth": "1990-05-01", "password": "Str0ngP@ss!", "password2": "Str0ngP@ss!"}'
//! ```
//!
//! Login:
//! ```bash
//! curl -X POST http://localhost:8000/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "alice@example.com", "password": "Str0ngP@ss!"}'
//! ```

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{
        StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use greetbook::accounts::{
    Account, AccountError, LoginRequest, PasswordChangeRequest, RESET_URL_TOKEN,
    SetPasswordRequest, SignupRequest, VERIFY_URL_TOKEN,
};
use serde::Deserialize;
use serde_json::json;

use super::{
    AppState, LOGIN_PATH, PASSWORD_RESET_DONE_PATH, PASSWORD_RESET_PATH, SIGNUP_PATH, guard,
    session::{self, CurrentSession},
};
use crate::{logging, metrics};

#[derive(Debug, Deserialize)]
pub struct SignupPayload {
    pub username: String,
    pub email: String,
    pub date_of_birth: NaiveDate,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub password: String,
    pub password2: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetPayload {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordPayload {
    pub new_password1: String,
    pub new_password2: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangePayload {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

/// Which form field an error belongs to, mirroring the shape a form
/// renderer expects. Non-field errors land under `__all__`.
fn error_field(err: &AccountError) -> &'static str {
    match err {
        AccountError::UsernameTaken | AccountError::InvalidUsername(_) => "username",
        AccountError::EmailTaken => "email",
        AccountError::Underage => "date_of_birth",
        AccountError::WeakPassword(_) => "password",
        AccountError::PasswordMismatch => "password2",
        _ => "__all__",
    }
}

/// Render an account error as an HTTP response.
///
/// Validation errors come back as `400` with a per-field error map;
/// anything server-side is a sanitized `500`.
fn account_error_response(err: AccountError) -> Response {
    if err.is_validation() {
        let status = if matches!(err, AccountError::InvalidCredentials) {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::BAD_REQUEST
        };
        return (
            status,
            Json(json!({
                "ok": false,
                "errors": { error_field(&err): err.client_message() },
            })),
        )
            .into_response();
    }

    tracing::error!("Account operation failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "ok": false, "error": err.client_message() })),
    )
        .into_response()
}

/// `303 See Other` with both a `Location` header and a JSON body.
fn see_other(location: &str, body: serde_json::Value) -> Response {
    (
        StatusCode::SEE_OTHER,
        [(LOCATION, location.to_string())],
        Json(body),
    )
        .into_response()
}

/// The one response for every bad, expired, or replayed link.
fn invalid_link() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "validlink": false,
            "message": AccountError::InvalidOrExpiredToken.client_message(),
        })),
    )
        .into_response()
}

/// Resolve the account behind an opaque `uid` path segment. Inactive
/// accounts are treated as absent.
async fn account_for_uid(state: &AppState, uid: &str) -> Result<Option<Account>, Response> {
    match state.accounts.find_by_uid(uid).await {
        Ok(Some(account)) if account.is_active => Ok(Some(account)),
        Ok(_) => Ok(None),
        Err(err) => Err(account_error_response(err)),
    }
}

/// Bounce an already-authenticated visitor off an entry page, or fail
/// loudly on a redirect loop.
fn entry_page_guard(current: &CurrentSession, state: &AppState, page_path: &str) -> Option<Response> {
    match guard::authenticated_redirect(&current.session, &state.login_redirect_url, page_path) {
        Ok(None) => None,
        Ok(Some(redirect)) => Some(redirect.into_response()),
        Err(err) => {
            tracing::error!("{}", err);
            Some(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

/// Register a new account and mail its verification link.
///
/// On success answers `303 See Other` pointing at the login page. The
/// account starts unverified; verification happens out of band via the
/// mailed link, and a mail delivery failure does not fail the signup.
///
/// # Errors
///
/// - `400 Bad Request`: per-field validation errors (taken username or
///   email, weak password, underage, mismatched confirmation)
/// - `500 Internal Server Error`: database or hashing failure
pub async fn signup(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Json(payload): Json<SignupPayload>,
) -> Response {
    if let Some(response) = entry_page_guard(&current, &state, SIGNUP_PATH) {
        return response;
    }

    let request = SignupRequest {
        username: payload.username,
        email: payload.email,
        date_of_birth: payload.date_of_birth,
        first_name: payload.first_name,
        middle_name: payload.middle_name,
        last_name: payload.last_name,
        password: payload.password,
        password2: payload.password2,
    };

    match state.accounts.signup(request).await {
        Ok(outcome) => {
            metrics::signup_attempts_total(true);
            metrics::mails_sent_total(outcome.email_sent);

            let message = if outcome.email_sent {
                "Your account has been created. Check your email for the verification link, \
                 then log in."
            } else {
                "Your account has been created, but the verification email could not be sent. \
                 You can request a new one after logging in."
            };

            see_other(
                LOGIN_PATH,
                json!({ "ok": true, "message": message, "email_sent": outcome.email_sent }),
            )
        }
        Err(err) => {
            metrics::signup_attempts_total(false);
            account_error_response(err)
        }
    }
}

/// Authenticate and attach the account to a fresh session.
///
/// The session key is rotated on login: the anonymous session row is
/// dropped and a new authenticated one issued, with the cookie updated
/// in the same response. Answers `303 See Other` to the configured
/// post-login target.
///
/// # Errors
///
/// - `401 Unauthorized`: one message for unknown email, wrong password,
///   and deactivated accounts alike
pub async fn login(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Json(payload): Json<LoginPayload>,
) -> Response {
    if let Some(response) = entry_page_guard(&current, &state, LOGIN_PATH) {
        return response;
    }

    let request = LoginRequest {
        email: payload.email,
        password: payload.password,
    };

    match state.accounts.login(request).await {
        Ok(account) => {
            let session = match state.sessions.promote(current.session.token, account.id).await {
                Ok(session) => session,
                Err(err) => return account_error_response(err),
            };

            metrics::login_attempts_total(true);
            tracing::info!(account_id = account.id, "Login succeeded");

            (
                StatusCode::SEE_OTHER,
                [
                    (LOCATION, state.login_redirect_url.to_string()),
                    (SET_COOKIE, session::session_cookie(session.token)),
                ],
                Json(json!({ "ok": true, "redirect": &*state.login_redirect_url })),
            )
                .into_response()
        }
        Err(err) => {
            if matches!(err, AccountError::InvalidCredentials) {
                metrics::login_attempts_total(false);
                logging::log_security_event("failed_login", None, "Login rejected");
            }
            account_error_response(err)
        }
    }
}

/// Drop the current session and expire its cookie.
///
/// Always answers `303 See Other` to the login page, for anonymous
/// visitors too.
pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> Response {
    if let Err(err) = state.sessions.delete(current.session.token).await {
        return account_error_response(err);
    }

    (
        StatusCode::SEE_OTHER,
        [
            (LOCATION, LOGIN_PATH.to_string()),
            (SET_COOKIE, session::clear_session_cookie()),
        ],
        Json(json!({ "ok": true, "message": "You have been logged out." })),
    )
        .into_response()
}

/// Start the password reset flow.
///
/// Mails a reset link to every active account matching the email, then
/// answers `303 See Other` to the done page. The response is identical
/// whether or not any account matched, so it cannot be used to probe
/// which addresses are registered.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Json(payload): Json<PasswordResetPayload>,
) -> Response {
    if let Some(response) = entry_page_guard(&current, &state, PASSWORD_RESET_PATH) {
        return response;
    }

    if let Err(err) = state.accounts.request_password_reset(&payload.email).await {
        return account_error_response(err);
    }

    metrics::password_reset_requests_total();
    see_other(PASSWORD_RESET_DONE_PATH, json!({ "ok": true }))
}

/// Landing page after a reset request.
pub async fn password_reset_done() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "message": "If an account exists with the email you entered, we've emailed \
                        password reset instructions.",
        })),
    )
        .into_response()
}

/// First hit on a mailed password reset link.
///
/// The real token is checked once, stashed in the session, and swapped
/// out of the URL for a fixed placeholder with a redirect. The page the
/// browser ends up on never had the secret in its address, so referer
/// headers and browser history cannot leak a live token.
pub async fn reset_confirm_page(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path((uid, token)): Path<(String, String)>,
) -> Response {
    let account = match account_for_uid(&state, &uid).await {
        Ok(Some(account)) => account,
        Ok(None) => return invalid_link(),
        Err(response) => return response,
    };

    if token == RESET_URL_TOKEN {
        // Second hit, after the laundering redirect: the token must be
        // in the session and still valid.
        let stashed = current.session.reset_token.as_deref();
        return match stashed {
            Some(stashed) if state.accounts.verify_reset_token(&account, stashed) => (
                StatusCode::OK,
                Json(json!({ "validlink": true, "uid": uid })),
            )
                .into_response(),
            _ => invalid_link(),
        };
    }

    if state.accounts.verify_reset_token(&account, &token) {
        if let Err(err) = state
            .sessions
            .stash_reset_token(current.session.token, Some(&token))
            .await
        {
            return account_error_response(err);
        }
        return see_other(
            &format!("/password-reset/confirm/{uid}/{RESET_URL_TOKEN}"),
            json!({ "ok": true }),
        );
    }

    invalid_link()
}

/// Set the new password at the end of the reset flow.
///
/// Only accepted on the placeholder URL with a valid stashed token; the
/// hash change invalidates that token and every other outstanding reset
/// link, so the flow is single-use.
pub async fn reset_confirm_submit(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path((uid, token)): Path<(String, String)>,
    Json(payload): Json<SetPasswordPayload>,
) -> Response {
    let account = match account_for_uid(&state, &uid).await {
        Ok(Some(account)) => account,
        Ok(None) => return invalid_link(),
        Err(response) => return response,
    };

    if token != RESET_URL_TOKEN {
        return invalid_link();
    }

    let valid = current
        .session
        .reset_token
        .as_deref()
        .is_some_and(|stashed| state.accounts.verify_reset_token(&account, stashed));
    if !valid {
        return invalid_link();
    }

    let request = SetPasswordRequest {
        new_password1: payload.new_password1,
        new_password2: payload.new_password2,
    };

    match state.accounts.set_password(&account, request).await {
        Ok(()) => {
            if let Err(err) = state
                .sessions
                .stash_reset_token(current.session.token, None)
                .await
            {
                return account_error_response(err);
            }

            metrics::password_resets_completed_total();
            tracing::info!(account_id = account.id, "Password reset completed");

            see_other(
                LOGIN_PATH,
                json!({
                    "ok": true,
                    "message": "Your password has been reset. Log in with your new password.",
                }),
            )
        }
        Err(err) => account_error_response(err),
    }
}

/// Follow a mailed email verification link.
///
/// Uses the same token laundering as the reset flow: the first hit
/// stashes the token and redirects to a placeholder URL, the second hit
/// checks the stash and flips the verified flag.
pub async fn verify_email(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path((uid, token)): Path<(String, String)>,
) -> Response {
    let account = match account_for_uid(&state, &uid).await {
        Ok(Some(account)) => account,
        Ok(None) => return invalid_link(),
        Err(response) => return response,
    };

    if token == VERIFY_URL_TOKEN {
        let valid = current
            .session
            .verification_token
            .as_deref()
            .is_some_and(|stashed| state.accounts.verify_email_token(&account, stashed));
        if !valid {
            return invalid_link();
        }

        let flipped = match state.accounts.mark_verified(&account).await {
            Ok(flipped) => flipped,
            Err(err) => return account_error_response(err),
        };
        if let Err(err) = state
            .sessions
            .stash_verification_token(current.session.token, None)
            .await
        {
            return account_error_response(err);
        }

        if flipped {
            metrics::emails_verified_total();
            tracing::info!(account_id = account.id, "Email address verified");
        }

        return (
            StatusCode::OK,
            Json(json!({
                "verified": true,
                "message": "Your email address has been verified. You can now log in.",
            })),
        )
            .into_response();
    }

    if state.accounts.verify_email_token(&account, &token) {
        if let Err(err) = state
            .sessions
            .stash_verification_token(current.session.token, Some(&token))
            .await
        {
            return account_error_response(err);
        }
        return see_other(&format!("/verify/{uid}/{VERIFY_URL_TOKEN}"), json!({ "ok": true }));
    }

    invalid_link()
}

/// Change the password of the logged-in account.
///
/// Requires an authenticated session and the current password. A wrong
/// current password is a field error, not a logout.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Json(payload): Json<PasswordChangePayload>,
) -> Response {
    let Some(account_id) = current.session.account_id else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "ok": false, "error": "Authentication required" })),
        )
            .into_response();
    };

    let account = match state.accounts.find_by_id(account_id).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "ok": false, "error": "Authentication required" })),
            )
                .into_response();
        }
        Err(err) => return account_error_response(err),
    };

    let request = PasswordChangeRequest {
        old_password: payload.old_password,
        new_password1: payload.new_password1,
        new_password2: payload.new_password2,
    };

    match state.accounts.change_password(&account, request).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "ok": true, "message": "Your password was changed." })),
        )
            .into_response(),
        Err(AccountError::InvalidCredentials) => {
            logging::log_security_event(
                "failed_password_change",
                Some(account_id),
                "Wrong current password",
            );
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "ok": false,
                    "errors": { "old_password": "Your old password was entered incorrectly." },
                })),
            )
                .into_response()
        }
        Err(err) => account_error_response(err),
    }
}
