//! Stateless, state-bound tokens for password reset and email
//! verification, plus the opaque account id used in confirmation links.
//!
//! A token is `base36(issued_at)-mac` where the MAC is an HMAC-SHA256
//! over the account's primary key, its mutable state (password hash,
//! verification flag, last login) and the issuance timestamp. Verifying
//! recomputes the MAC from the account's *current* state, so completing
//! the guarded action invalidates the token without a token table. Two
//! generators with distinct key salts keep reset and verification
//! tokens from being interchangeable.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::models::{Account, AccountId};

type HmacSha256 = Hmac<Sha256>;

/// Reserved path segment substituted for a real reset token after its
/// first successful check, so the token never reaches referrer headers.
pub const RESET_URL_TOKEN: &str = "set-password";

/// Reserved path segment for the email-verification laundering step.
pub const VERIFY_URL_TOKEN: &str = "set-token";

// Longest base36 rendering of an i64 timestamp; longer inputs are
// rejected before parsing to rule out overflow.
const MAX_TIMESTAMP_B36_LEN: usize = 13;

/// Token generator bound to a secret key and a purpose-specific salt.
#[derive(Clone)]
pub struct StatefulTokenGenerator {
    secret: String,
    key_salt: &'static str,
    expiry_secs: i64,
}

impl StatefulTokenGenerator {
    /// Generator for password-reset tokens.
    pub fn password_reset(secret: &str, expiry_secs: i64) -> Self {
        Self {
            secret: secret.to_string(),
            key_salt: "greetbook.accounts.tokens.PasswordReset",
            expiry_secs,
        }
    }

    /// Generator for email-verification tokens.
    pub fn email_verification(secret: &str, expiry_secs: i64) -> Self {
        Self {
            secret: secret.to_string(),
            key_salt: "greetbook.accounts.tokens.EmailVerification",
            expiry_secs,
        }
    }

    /// Issue a token bound to the account's current state.
    pub fn issue(&self, account: &Account) -> String {
        self.issue_at(account, Utc::now())
    }

    /// Issue a token as of an explicit instant.
    pub fn issue_at(&self, account: &Account, now: DateTime<Utc>) -> String {
        self.make_token_with_timestamp(account, now.timestamp())
    }

    /// Check a token against the account's current state.
    ///
    /// Returns false when the token is malformed, expired, forged, or
    /// when the bound state (password hash, verification flag, last
    /// login) has changed since issuance.
    pub fn verify(&self, account: &Account, token: &str) -> bool {
        self.verify_at(account, token, Utc::now())
    }

    /// Check a token as of an explicit instant.
    pub fn verify_at(&self, account: &Account, token: &str, now: DateTime<Utc>) -> bool {
        let Some((ts_b36, _)) = token.split_once('-') else {
            return false;
        };
        let Some(issued_at) = base36_decode(ts_b36) else {
            return false;
        };

        let expected = self.make_token_with_timestamp(account, issued_at);
        let matches: bool = expected.as_bytes().ct_eq(token.as_bytes()).into();

        let age = now.timestamp() - issued_at;
        matches && age >= 0 && age <= self.expiry_secs
    }

    fn make_token_with_timestamp(&self, account: &Account, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(
            format!("{}{}", self.key_salt, self.secret).as_bytes(),
        )
        .expect("HMAC accepts keys of any length");
        mac.update(self.state_fingerprint(account, timestamp).as_bytes());

        let digest = hex::encode(mac.finalize().into_bytes());
        // Keep every other hex character; 128 bits of MAC is plenty for
        // a link token and the string stays short.
        let short: String = digest.chars().step_by(2).collect();

        format!("{}-{}", base36_encode(timestamp), short)
    }

    /// The account state a token is bound to. Changing the password,
    /// becoming verified, or logging in all produce a new fingerprint.
    fn state_fingerprint(&self, account: &Account, timestamp: i64) -> String {
        let login_timestamp = account
            .last_login
            .map(|dt| dt.timestamp().to_string())
            .unwrap_or_default();
        format!(
            "{}{}{}{}{}{}",
            account.id,
            account.password_hash,
            account.is_verified,
            login_timestamp,
            timestamp,
            account.email,
        )
    }
}

/// Encode an account id as the opaque URL-safe segment used in
/// confirmation links.
pub fn encode_uid(id: AccountId) -> String {
    URL_SAFE_NO_PAD.encode(id.to_string())
}

/// Decode an opaque link segment back to an account id. Returns None
/// for anything malformed; callers must not reveal which failure it was.
pub fn decode_uid(uid: &str) -> Option<AccountId> {
    let bytes = URL_SAFE_NO_PAD.decode(uid).ok()?;
    let text = std::str::from_utf8(&bytes).ok()?;
    let id: AccountId = text.parse().ok()?;
    (id > 0).then_some(id)
}

fn base36_encode(mut value: i64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value <= 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn base36_decode(s: &str) -> Option<i64> {
    if s.is_empty() || s.len() > MAX_TIMESTAMP_B36_LEN {
        return None;
    }
    i64::from_str_radix(s, 36).ok()
}
