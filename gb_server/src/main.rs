//! Account server with signup, email verification, login, and
//! password reset flows over database-backed browser sessions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use ctrlc::set_handler;
use greetbook::accounts::{AccountConfig, AccountManager, SessionStore};
use greetbook::db::{Database, ensure_schema};
use greetbook::mail::SmtpMailer;
use log::info;
use pico_args::Arguments;

use gb_server::{api, config::ServerConfig, logging, metrics};

const HELP: &str = "\
Run the greetbook account server

USAGE:
  gb_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8000]
  --db-url     URL         Database connection string  [default: env DATABASE_URL or postgres://postgres@localhost/greetbook]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8000)
  DATABASE_URL             PostgreSQL connection string
  SECRET_KEY               Token signing secret (required)
  PASSWORD_PEPPER          Password hashing pepper (required)
  LOGIN_REDIRECT_URL       Post-login redirect target  [default: /]
  SMTP_HOST, SMTP_PORT     Outbound mail relay
  METRICS_BIND             Prometheus exporter address (optional)
  (See .env file for all configuration options)
";

/// How often expired session rows are swept out.
const SESSION_PURGE_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let database_url_override: Option<String> = pargs.opt_value_from_str("--db-url")?;

    // Catching signals for exit.
    set_handler(|| std::process::exit(0))?;

    logging::init();

    let config = ServerConfig::from_env(bind_override, database_url_override)?;
    config.validate()?;

    info!("Starting greetbook server at {}", config.bind);

    info!("Connecting to database: {}", config.database.database_url);
    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    ensure_schema(db.pool()).await?;
    info!("Database connected successfully");

    let pool = Arc::new(db.pool().clone());

    let mailer = Arc::new(
        SmtpMailer::new(&config.mail.smtp)
            .map_err(|e| anyhow::anyhow!("Failed to build SMTP transport: {}", e))?,
    );

    let accounts = Arc::new(AccountManager::new(
        pool.clone(),
        AccountConfig {
            secret_key: config.security.secret_key.clone(),
            password_pepper: config.security.password_pepper.clone(),
            reset_token_expiry_secs: config.security.reset_token_expiry_secs,
            verification_token_expiry_secs: config.security.verification_token_expiry_secs,
            site: config.mail.site.clone(),
        },
        mailer,
    ));

    let sessions = Arc::new(SessionStore::new(
        pool.clone(),
        config.web.session_ttl_secs as i64,
    ));

    // Sweep expired sessions in the background.
    let purge_store = sessions.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(SESSION_PURGE_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match purge_store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => info!("Purged {} expired session(s)", purged),
                Err(e) => log::error!("Session purge failed: {}", e),
            }
        }
    });

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind).map_err(|e| anyhow::anyhow!(e))?;
        info!("Prometheus metrics exported at http://{}/metrics", metrics_bind);
    }

    let api_state = api::AppState {
        accounts,
        sessions,
        pool,
        login_redirect_url: config.web.login_redirect_url.clone(),
    };

    let app = api::create_router(api_state);

    info!("Starting HTTP server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
