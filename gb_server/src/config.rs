//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use greetbook::db::DatabaseConfig;
use greetbook::mail::{MailContext, SmtpConfig};
use std::net::SocketAddr;

use crate::api;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Redirect and session configuration
    pub web: WebConfig,
    /// Outbound mail configuration
    pub mail: MailSettings,
    /// Optional Prometheus exporter bind address
    pub metrics_bind: Option<SocketAddr>,
}

/// Security-related configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Signing key for account-state-bound tokens (required)
    pub secret_key: String,
    /// Password hashing pepper (required)
    pub password_pepper: String,
    /// Password reset link lifetime in seconds
    pub reset_token_expiry_secs: i64,
    /// Email verification link lifetime in seconds
    pub verification_token_expiry_secs: i64,
}

/// Redirect targets and session lifetime
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Where an authenticated user lands after login, and where the
    /// entry pages bounce already-authenticated visitors to
    pub login_redirect_url: String,
    /// Browser session lifetime in seconds
    pub session_ttl_secs: u64,
}

/// SMTP relay and site identity for outbound mail
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub smtp: SmtpConfig,
    pub site: MailContext,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        // Bind address
        let bind = bind_override
            .or_else(|| {
                std::env::var("SERVER_BIND")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or_else(|| {
                "127.0.0.1:8000"
                    .parse()
                    .expect("Default bind address is valid")
            });

        // Database configuration
        let database_url = database_url_override
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or_else(|| "postgres://postgres@localhost/greetbook".to_string());

        let database = DatabaseConfig {
            database_url,
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", 20),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", 5),
            connection_timeout_secs: parse_env_or("DB_CONNECTION_TIMEOUT_SECS", 10),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT_SECS", 600),
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME_SECS", 1800),
        };

        // Security configuration (REQUIRED)
        let secret_key = std::env::var("SECRET_KEY").map_err(|_| ConfigError::MissingRequired {
            var: "SECRET_KEY".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;

        let password_pepper =
            std::env::var("PASSWORD_PEPPER").map_err(|_| ConfigError::MissingRequired {
                var: "PASSWORD_PEPPER".to_string(),
                hint: "Generate with: openssl rand -hex 16".to_string(),
            })?;

        if secret_key.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "SECRET_KEY".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if password_pepper.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: "Must be at least 16 characters (64-bit security)".to_string(),
            });
        }

        let security = SecurityConfig {
            secret_key,
            password_pepper,
            // Three days, matching the lifetime printed in the mails.
            reset_token_expiry_secs: parse_env_or("RESET_TOKEN_EXPIRY_SECS", 3 * 24 * 3600),
            verification_token_expiry_secs: parse_env_or(
                "VERIFICATION_TOKEN_EXPIRY_SECS",
                3 * 24 * 3600,
            ),
        };

        let web = WebConfig {
            login_redirect_url: std::env::var("LOGIN_REDIRECT_URL")
                .unwrap_or_else(|_| "/".to_string()),
            session_ttl_secs: parse_env_or("SESSION_TTL_SECS", 14 * 24 * 3600),
        };

        let mail = MailSettings {
            smtp: SmtpConfig {
                host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: parse_env_or("SMTP_PORT", 587),
                username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
                password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
                from: std::env::var("DEFAULT_FROM_EMAIL")
                    .unwrap_or_else(|_| "Greetbook <no-reply@localhost>".to_string()),
            },
            site: MailContext {
                site_name: std::env::var("SITE_NAME").unwrap_or_else(|_| "Greetbook".to_string()),
                domain: std::env::var("SITE_DOMAIN").unwrap_or_else(|_| "localhost:8000".to_string()),
                use_https: parse_env_or("USE_HTTPS", false),
            },
        };

        let metrics_bind = std::env::var("METRICS_BIND")
            .ok()
            .map(|s| {
                s.parse().map_err(|_| ConfigError::Invalid {
                    var: "METRICS_BIND".to_string(),
                    reason: "Must be an IP:PORT address".to_string(),
                })
            })
            .transpose()?;

        Ok(ServerConfig {
            bind,
            database,
            security,
            web,
            mail,
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    ///
    /// Returns an error if the post-login redirect target would bounce
    /// an authenticated user straight back to one of the entry pages,
    /// which would loop forever.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let target = self.web.login_redirect_url.as_str();

        if !target.starts_with('/') {
            return Err(ConfigError::Invalid {
                var: "LOGIN_REDIRECT_URL".to_string(),
                reason: "Must be an absolute path starting with '/'".to_string(),
            });
        }

        for entry_page in api::ENTRY_PAGES {
            if target == *entry_page {
                return Err(ConfigError::RedirectLoop {
                    target: target.to_string(),
                    page: entry_page.to_string(),
                });
            }
        }

        if self.web.session_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "SESSION_TTL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.security.reset_token_expiry_secs <= 0 {
            return Err(ConfigError::Invalid {
                var: "RESET_TOKEN_EXPIRY_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.security.verification_token_expiry_secs <= 0 {
            return Err(ConfigError::Invalid {
                var: "VERIFICATION_TOKEN_EXPIRY_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },

    #[error(
        "LOGIN_REDIRECT_URL ({target}) points at the {page} page; authenticated \
         visitors would be redirected in a loop"
    )]
    RedirectLoop { target: String, page: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
