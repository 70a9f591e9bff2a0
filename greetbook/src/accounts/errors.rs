//! Account error types.

use thiserror::Error;

/// Account lifecycle errors
#[derive(Debug, Error)]
pub enum AccountError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Login failed; deliberately does not say whether the account
    /// exists or the password was wrong
    #[error("Please enter a correct email address and password")]
    InvalidCredentials,

    /// Password and confirmation did not match
    #[error("The two password fields did not match")]
    PasswordMismatch,

    /// Username already exists (case-insensitive)
    #[error("A user with that username already exists")]
    UsernameTaken,

    /// Email already registered (case-insensitive)
    #[error("A user with that email address is already registered")]
    EmailTaken,

    /// Invalid username format
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// Date of birth implies an age below 18
    #[error("You must be at least 18 years old")]
    Underage,

    /// Password failed the strength policy
    #[error("Password too weak: {0}")]
    WeakPassword(String),

    /// Verification or reset link is invalid. One message for expired,
    /// wrong, and already-used tokens so the response is not an oracle.
    #[error("The link is invalid or has expired")]
    InvalidOrExpiredToken,
}

impl AccountError {
    /// Get a client-safe error message that doesn't leak sensitive
    /// information. Database errors are sanitized to avoid exposing SQL
    /// details or schema structure.
    pub fn client_message(&self) -> String {
        match self {
            AccountError::Database(_) | AccountError::HashingFailed => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Whether this error is user-fixable form input, as opposed to a
    /// server-side failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AccountError::InvalidCredentials
                | AccountError::PasswordMismatch
                | AccountError::UsernameTaken
                | AccountError::EmailTaken
                | AccountError::InvalidUsername(_)
                | AccountError::Underage
                | AccountError::WeakPassword(_)
        )
    }
}

/// Result type for account operations
pub type AccountResult<T> = Result<T, AccountError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_errors_are_sanitized() {
        let err = AccountError::Database(sqlx::Error::PoolClosed);
        assert_eq!(err.client_message(), "Internal server error");
        assert!(!err.is_validation());
    }

    #[test]
    fn validation_errors_pass_through() {
        let err = AccountError::WeakPassword("too short".to_string());
        assert!(err.client_message().contains("too short"));
        assert!(err.is_validation());
    }

    #[test]
    fn token_failure_message_is_generic() {
        // Expired, wrong, and replayed tokens all render the same text.
        let err = AccountError::InvalidOrExpiredToken;
        assert_eq!(err.client_message(), "The link is invalid or has expired");
    }
}
