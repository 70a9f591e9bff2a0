//! # Greetbook
//!
//! Account lifecycle library for the greetbook web application.
//!
//! This library implements the security-relevant core of a conventional
//! server-rendered application: user signup with email verification,
//! login/logout, password change, and the password-reset workflow. The
//! HTTP surface lives in the `gb_server` crate; this crate owns the
//! domain logic and persistence.
//!
//! ## Core Modules
//!
//! - [`accounts`]: account model, validation, stateless state-bound
//!   tokens, session store, and the [`accounts::AccountManager`] flows
//! - [`db`]: PostgreSQL connection pooling and schema setup
//! - [`mail`]: outbound email transport and message templates
//!
//! ## Design
//!
//! Verification and reset tokens are derived, not stored: each token is
//! an HMAC over the account's mutable state (password hash, verification
//! flag, last login) plus an issuance timestamp. Completing the action a
//! token authorizes changes that state, which invalidates the token for
//! replay without any token table.

pub mod accounts;
pub mod db;
pub mod mail;

pub use accounts::{Account, AccountError, AccountManager, AccountResult};
pub use db::{Database, DatabaseConfig};
pub use mail::{Mailer, MemoryMailer, SmtpMailer};
