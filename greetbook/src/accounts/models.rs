//! Account data models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Account ID type
pub type AccountId = i64;

/// Account model.
///
/// Username and email are each unique under NFKC-casefold comparison.
/// The password hash travels with the account because the stateless
/// token generator folds it into the state fingerprint; it is skipped
/// during serialization and redacted from debug output.
#[derive(Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub date_of_birth: NaiveDate,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_verified: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl Account {
    /// Return the first name plus the last name, with a space in between.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Whether the account holds a password it can authenticate with.
    pub fn has_usable_password(&self) -> bool {
        !self.password_hash.is_empty()
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("is_active", &self.is_active)
            .field("is_verified", &self.is_verified)
            .field("date_joined", &self.date_joined)
            .field("last_login", &self.last_login)
            .finish_non_exhaustive()
    }
}

/// Signup request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub date_of_birth: NaiveDate,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub password: String,
    pub password2: String,
}

/// Outcome of a successful signup.
///
/// `email_sent` is false when the verification mail could not be
/// delivered; the account is created either way.
#[derive(Debug, Clone)]
pub struct SignupOutcome {
    pub account: Account,
    pub email_sent: bool,
}

/// Login request; email is the login identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Authenticated password change request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordChangeRequest {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

/// New password submission at the end of the reset flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPasswordRequest {
    pub new_password1: String,
    pub new_password2: String,
}
