//! Cookie-backed session middleware.
//!
//! Every request gets a database-backed session, created on the fly for
//! first-time visitors. The session row carries the authenticated
//! account id (if any) plus the stashed confirmation tokens used by the
//! email link flows, so handlers read it from request extensions rather
//! than re-parsing cookies.

use axum::{
    extract::{Request, State},
    http::{
        HeaderMap, StatusCode,
        header::{COOKIE, HeaderValue, SET_COOKIE},
    },
    middleware::Next,
    response::Response,
};
use greetbook::accounts::Session;
use uuid::Uuid;

use super::AppState;

/// Name of the browser session cookie
pub const SESSION_COOKIE: &str = "gb_session";

/// The session attached to the current request, available to handlers
/// via `Extension<CurrentSession>`.
#[derive(Clone)]
pub struct CurrentSession {
    pub session: Session,
    /// Whether the session was created during this request
    pub is_new: bool,
}

/// Pull a named cookie out of the `Cookie` header.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .map(str::trim)
        .find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then_some(value)
        })
}

/// `Set-Cookie` value binding the browser to a session.
pub fn session_cookie(token: Uuid) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

/// `Set-Cookie` value that expires the session cookie immediately.
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Middleware that resolves or creates the request's session.
///
/// A cookie pointing at a missing or expired row is treated the same as
/// no cookie at all: a fresh anonymous session is created. The cookie
/// for a fresh session is set on the response unless a handler already
/// set one (login and logout manage the cookie themselves).
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let existing = cookie_value(request.headers(), SESSION_COOKIE)
        .and_then(|value| Uuid::parse_str(value).ok());

    let resolved = match existing {
        Some(token) => state.sessions.get(token).await.map_err(|e| {
            tracing::error!("Session lookup failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?,
        None => None,
    };

    let (session, is_new) = match resolved {
        Some(session) => (session, false),
        None => {
            let session = state.sessions.create(None).await.map_err(|e| {
                tracing::error!("Session creation failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
            (session, true)
        }
    };

    let token = session.token;
    request
        .extensions_mut()
        .insert(CurrentSession { session, is_new });

    let mut response = next.run(request).await;

    if is_new && !response.headers().contains_key(SET_COOKIE) {
        if let Ok(value) = HeaderValue::from_str(&session_cookie(token)) {
            response.headers_mut().insert(SET_COOKIE, value);
        }
    }

    Ok(response)
}
