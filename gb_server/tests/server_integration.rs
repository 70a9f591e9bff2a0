//! Integration tests for the HTTP account flows.
//!
//! These run against a real PostgreSQL instance and are ignored by
//! default; set `DATABASE_URL` and run with `cargo test -- --ignored`.

use axum::Router;
use axum::body::Body;
use axum::http::{
    Request, StatusCode,
    header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
};
use greetbook::accounts::{AccountConfig, AccountManager, SessionStore};
use greetbook::db::{Database, DatabaseConfig, ensure_schema};
use greetbook::mail::{MailContext, MemoryMailer};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use serial_test::serial;
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method

/// Helper to create test database pool
async fn setup_test_db() -> Arc<sqlx::PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost/greetbook_test".to_string());

    let config = DatabaseConfig {
        database_url,
        max_connections: 10,
        min_connections: 1,
        connection_timeout_secs: 5,
        idle_timeout_secs: 300,
        max_lifetime_secs: 1800,
    };

    let db = Database::new(&config)
        .await
        .expect("Failed to create test database");
    ensure_schema(db.pool()).await.expect("Schema setup failed");

    Arc::new(db.pool().clone())
}

/// Helper to create a test router with managers and a capturing mailer
async fn create_test_server() -> (Router, Arc<AccountManager>, Arc<MemoryMailer>) {
    let pool = setup_test_db().await;
    let mailer = Arc::new(MemoryMailer::default());

    let accounts = Arc::new(AccountManager::new(
        pool.clone(),
        AccountConfig {
            secret_key: "integration-test-secret-key-0123456789".to_string(),
            password_pepper: "integration_pepper".to_string(),
            reset_token_expiry_secs: 3 * 24 * 3600,
            verification_token_expiry_secs: 3 * 24 * 3600,
            site: MailContext {
                site_name: "Greetbook".to_string(),
                domain: "testserver".to_string(),
                use_https: false,
            },
        },
        mailer.clone(),
    ));

    let sessions = Arc::new(SessionStore::new(pool.clone(), 3600));

    let state = gb_server::api::AppState {
        accounts: accounts.clone(),
        sessions,
        pool,
        login_redirect_url: "/".to_string(),
    };

    (gb_server::api::create_router(state), accounts, mailer)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn json_request_with_cookie(method: &str, uri: &str, cookie: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .header(COOKIE, cookie)
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Extract the `name=value` pair of the session cookie from a response.
fn session_cookie(response: &axum::response::Response) -> String {
    let raw = response
        .headers()
        .get(SET_COOKIE)
        .expect("response sets a session cookie")
        .to_str()
        .unwrap();
    raw.split(';').next().unwrap().to_string()
}

fn location(response: &axum::response::Response) -> &str {
    response
        .headers()
        .get(LOCATION)
        .expect("response has a Location header")
        .to_str()
        .unwrap()
}

fn signup_body(username: &str, email: &str) -> Value {
    json!({
        "username": username,
        "email": email,
        "date_of_birth": "1990-05-01",
        "password": "Str0ngP@ss!",
        "password2": "Str0ngP@ss!",
    })
}

/// Pull the request path out of the link in a mail body.
fn link_path(body: &str) -> String {
    let link = body
        .lines()
        .find(|l| l.starts_with("http"))
        .expect("mail contains a link");
    let after_scheme = link.split_once("://").expect("absolute link").1;
    let path_start = after_scheme.find('/').expect("link has a path");
    after_scheme[path_start..].to_string()
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn test_health_check_endpoint() {
    let (app, _, _) = create_test_server().await;

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["database"], true);
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn test_signup_login_and_password_change() {
    let (app, accounts, _) = create_test_server().await;
    accounts.delete_by_username("http_bob").await.unwrap();

    // Signup lands on the login page.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/signup",
            signup_body("http_bob", "http_bob@example.com"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    // Wrong password: one undifferentiated 401.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            json!({ "email": "http_bob@example.com", "password": "wrong" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Right password: redirect plus a fresh session cookie.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            json!({ "email": "http_bob@example.com", "password": "Str0ngP@ss!" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let cookie = session_cookie(&response);

    // The authenticated session can change its password.
    let response = app
        .clone()
        .oneshot(json_request_with_cookie(
            "POST",
            "/password-change",
            &cookie,
            json!({
                "old_password": "Str0ngP@ss!",
                "new_password1": "N3wS3cret!x",
                "new_password2": "N3wS3cret!x",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Without a session it cannot.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/password-change",
            json!({
                "old_password": "N3wS3cret!x",
                "new_password1": "An0ther1!x",
                "new_password2": "An0ther1!x",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    accounts.delete_by_username("http_bob").await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn test_entry_pages_bounce_authenticated_visitors() {
    let (app, accounts, _) = create_test_server().await;
    accounts.delete_by_username("http_carol").await.unwrap();

    app.clone()
        .oneshot(json_request(
            "POST",
            "/signup",
            signup_body("http_carol", "http_carol@example.com"),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            json!({ "email": "http_carol@example.com", "password": "Str0ngP@ss!" }),
        ))
        .await
        .unwrap();
    let cookie = session_cookie(&response);

    // Logged in, the signup and login pages redirect to the target.
    for uri in ["/signup", "/login"] {
        let response = app
            .clone()
            .oneshot(json_request_with_cookie(
                "POST",
                uri,
                &cookie,
                signup_body("ignored", "ignored@example.com"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(location(&response), "/", "{uri}");
    }

    // Logout expires the cookie and returns to the login page.
    let response = app
        .clone()
        .oneshot(json_request_with_cookie("POST", "/logout", &cookie, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    assert!(
        response
            .headers()
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("Max-Age=0")
    );

    accounts.delete_by_username("http_carol").await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn test_verification_link_is_laundered() {
    let (app, accounts, mailer) = create_test_server().await;
    accounts.delete_by_username("http_dave").await.unwrap();

    app.clone()
        .oneshot(json_request(
            "POST",
            "/signup",
            signup_body("http_dave", "http_dave@example.com"),
        ))
        .await
        .unwrap();

    let path = link_path(&mailer.sent()[0].body);

    // First hit: token checked, stashed, and swapped out of the URL.
    let response = app
        .clone()
        .oneshot(Request::builder().uri(&path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let laundered = location(&response).to_string();
    assert!(laundered.ends_with("/set-token"));
    let cookie = session_cookie(&response);

    // Second hit with the same session: verification completes.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(&laundered)
                .header(COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["verified"], true);

    // The placeholder URL without the session stash is a dead link.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(&laundered)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["validlink"], false);

    accounts.delete_by_username("http_dave").await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn test_password_reset_flow_over_http() {
    let (app, accounts, mailer) = create_test_server().await;
    accounts.delete_by_username("http_erin").await.unwrap();

    app.clone()
        .oneshot(json_request(
            "POST",
            "/signup",
            signup_body("http_erin", "http_erin@example.com"),
        ))
        .await
        .unwrap();
    mailer.clear();

    // Unknown and known addresses get the same redirect.
    for email in ["nobody@example.com", "http_erin@example.com"] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/password-reset",
                json!({ "email": email }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/password-reset/done");
    }
    assert_eq!(mailer.sent().len(), 1);

    let path = link_path(&mailer.sent()[0].body);

    // Follow the mailed link; the token moves into the session.
    let response = app
        .clone()
        .oneshot(Request::builder().uri(&path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let laundered = location(&response).to_string();
    assert!(laundered.ends_with("/set-password"));
    let cookie = session_cookie(&response);

    // The laundered page reports a valid link.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(&laundered)
                .header(COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["validlink"], true);

    // Submit the new password.
    let response = app
        .clone()
        .oneshot(json_request_with_cookie(
            "POST",
            &laundered,
            &cookie,
            json!({ "new_password1": "N3wS3cret!x", "new_password2": "N3wS3cret!x" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    // The link is spent: following the mailed URL again fails.
    let response = app
        .clone()
        .oneshot(Request::builder().uri(&path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["validlink"], false);

    // And the new password works.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/login",
            json!({ "email": "http_erin@example.com", "password": "N3wS3cret!x" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    accounts.delete_by_username("http_erin").await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires PostgreSQL (set DATABASE_URL)"]
async fn test_mangled_link_is_a_generic_failure() {
    let (app, _, _) = create_test_server().await;

    for uri in [
        "/password-reset/confirm/not-a-uid/whatever",
        "/verify/not-a-uid/whatever",
        "/password-reset/confirm/MQ/forged-token",
    ] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["validlink"], false, "{uri}");
    }
}
