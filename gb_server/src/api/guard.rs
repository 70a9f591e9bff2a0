//! Redirect guard for entry pages.
//!
//! The signup, login, and password-reset pages are pointless for a
//! visitor who is already logged in, so they bounce authenticated
//! sessions to the configured post-login target. A target that points
//! back at the entry page itself would redirect forever; that is a
//! deployment mistake and is reported as an error rather than looped.

use axum::response::Redirect;
use greetbook::accounts::Session;
use thiserror::Error;

/// The post-login redirect target equals the page it guards.
#[derive(Debug, Error)]
#[error(
    "Redirection loop for authenticated user detected: target {target:?} equals \
     the page path. Check that LOGIN_REDIRECT_URL does not point to an entry page."
)]
pub struct RedirectLoop {
    pub target: String,
}

/// Decide whether the current visitor should be bounced off an entry
/// page.
///
/// Returns `Ok(None)` for anonymous sessions (the page renders
/// normally), `Ok(Some(redirect))` for authenticated sessions, and
/// `Err(RedirectLoop)` when the target would land right back here.
pub fn authenticated_redirect(
    session: &Session,
    target: &str,
    page_path: &str,
) -> Result<Option<Redirect>, RedirectLoop> {
    if !session.is_authenticated() {
        return Ok(None);
    }

    if target == page_path {
        return Err(RedirectLoop {
            target: target.to_string(),
        });
    }

    Ok(Some(Redirect::to(target)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn session(account_id: Option<i64>) -> Session {
        Session {
            token: Uuid::new_v4(),
            account_id,
            reset_token: None,
            verification_token: None,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(2),
        }
    }

    #[test]
    fn test_anonymous_visitor_is_not_redirected() {
        let result = authenticated_redirect(&session(None), "/", "/login").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_authenticated_visitor_is_redirected() {
        let result = authenticated_redirect(&session(Some(1)), "/", "/login").unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn test_target_equal_to_page_is_a_loop() {
        let err = authenticated_redirect(&session(Some(1)), "/login", "/login").unwrap_err();
        assert!(err.to_string().contains("/login"));
    }

    #[test]
    fn test_loop_is_only_detected_for_authenticated_sessions() {
        // An anonymous visitor on a misconfigured page still gets the
        // page; the loop only exists once a redirect would be issued.
        let result = authenticated_redirect(&session(None), "/login", "/login").unwrap();
        assert!(result.is_none());
    }
}
