//! Account lifecycle module: signup, login, email verification, and
//! password reset.
//!
//! This module implements the flows with:
//! - Argon2id password hashing with a server-side pepper
//! - Stateless HMAC-derived tokens bound to account state, so that a
//!   password change or successful verification invalidates all
//!   outstanding tokens for that purpose
//! - Unicode case-insensitive (NFKC + casefold) uniqueness checks for
//!   usernames and email addresses
//! - Database-backed sessions for the browser cookie and for the
//!   token-laundering step of the confirmation flows
//!
//! ## Example
//!
//! ```no_run
//! use greetbook::accounts::{AccountConfig, AccountManager, SignupRequest};
//! use greetbook::db::Database;
//! use greetbook::mail::{MailContext, MemoryMailer};
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&Default::default()).await?;
//!     let config = AccountConfig {
//!         secret_key: "a-long-random-secret-key-from-config".into(),
//!         password_pepper: "pepper".into(),
//!         reset_token_expiry_secs: 3 * 24 * 3600,
//!         verification_token_expiry_secs: 3 * 24 * 3600,
//!         site: MailContext {
//!             site_name: "greetbook".into(),
//!             domain: "example.com".into(),
//!             use_https: true,
//!         },
//!     };
//!     let accounts = AccountManager::new(
//!         Arc::new(db.pool().clone()),
//!         config,
//!         Arc::new(MemoryMailer::default()),
//!     );
//!
//!     let request = SignupRequest {
//!         username: "bob".into(),
//!         email: "bob@example.com".into(),
//!         date_of_birth: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
//!         first_name: None,
//!         middle_name: None,
//!         last_name: None,
//!         password: "Str0ngP@ss!".into(),
//!         password2: "Str0ngP@ss!".into(),
//!     };
//!     let outcome = accounts.signup(request).await?;
//!     println!("created account {}", outcome.account.username);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod sessions;
pub mod tokens;
pub mod validators;

pub use errors::{AccountError, AccountResult};
pub use manager::{AccountConfig, AccountManager};
pub use models::{
    Account, AccountId, LoginRequest, PasswordChangeRequest, SetPasswordRequest, SignupOutcome,
    SignupRequest,
};
pub use sessions::{Session, SessionStore};
pub use tokens::{
    RESET_URL_TOKEN, StatefulTokenGenerator, VERIFY_URL_TOKEN, decode_uid, encode_uid,
};
