//! Account manager implementation: the signup, login, password-change,
//! password-reset, and email-verification flows.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use std::sync::Arc;

use crate::mail::{MailContext, MailResult, Mailer, templates};

use super::errors::{AccountError, AccountResult};
use super::models::{
    Account, AccountId, LoginRequest, PasswordChangeRequest, SetPasswordRequest, SignupOutcome,
    SignupRequest,
};
use super::tokens::{StatefulTokenGenerator, decode_uid, encode_uid};
use super::validators;

const ACCOUNT_COLUMNS: &str = "id, username, email, password_hash, date_of_birth, \
     first_name, middle_name, last_name, is_active, is_staff, is_superuser, is_verified, \
     date_joined, last_login";

/// Configuration value object passed to the flows at construction time.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Secret key for token derivation
    pub secret_key: String,
    /// Server-side pepper for password hashing
    pub password_pepper: String,
    /// Password-reset token lifetime in seconds
    pub reset_token_expiry_secs: i64,
    /// Email-verification token lifetime in seconds
    pub verification_token_expiry_secs: i64,
    /// Site identity rendered into outbound mail links
    pub site: MailContext,
}

/// Account manager
#[derive(Clone)]
pub struct AccountManager {
    pool: Arc<PgPool>,
    pepper: String,
    reset_tokens: StatefulTokenGenerator,
    verification_tokens: StatefulTokenGenerator,
    mailer: Arc<dyn Mailer>,
    site: MailContext,
}

impl AccountManager {
    /// Create a new account manager.
    pub fn new(pool: Arc<PgPool>, config: AccountConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            pool,
            pepper: config.password_pepper,
            reset_tokens: StatefulTokenGenerator::password_reset(
                &config.secret_key,
                config.reset_token_expiry_secs,
            ),
            verification_tokens: StatefulTokenGenerator::email_verification(
                &config.secret_key,
                config.verification_token_expiry_secs,
            ),
            mailer,
            site: config.site,
        }
    }

    /// Register a new account and send the verification mail.
    ///
    /// The mail is best-effort: a delivery failure is logged and
    /// reported through `SignupOutcome::email_sent`, the account stays.
    ///
    /// # Errors
    ///
    /// * `AccountError::PasswordMismatch` - Password and confirmation differ
    /// * `AccountError::InvalidUsername` - Username format invalid
    /// * `AccountError::UsernameTaken` / `EmailTaken` - Casefold collision
    /// * `AccountError::Underage` - Date of birth implies age < 18
    /// * `AccountError::WeakPassword` - Password failed the policy
    pub async fn signup(&self, request: SignupRequest) -> AccountResult<SignupOutcome> {
        if request.password != request.password2 {
            return Err(AccountError::PasswordMismatch);
        }

        validators::validate_username(&request.username)?;

        let email = validators::normalize_email(&request.email);
        let username_cf = validators::casefold(&request.username);
        let email_cf = validators::casefold(&email);

        // Best-effort pre-check; the unique indexes on the casefolded
        // columns are the authoritative guard under concurrency.
        let username_exists = sqlx::query("SELECT id FROM accounts WHERE username_cf = $1")
            .bind(&username_cf)
            .fetch_optional(self.pool.as_ref())
            .await?;
        if username_exists.is_some() {
            return Err(AccountError::UsernameTaken);
        }

        let email_exists = sqlx::query("SELECT id FROM accounts WHERE email_cf = $1")
            .bind(&email_cf)
            .fetch_optional(self.pool.as_ref())
            .await?;
        if email_exists.is_some() {
            return Err(AccountError::EmailTaken);
        }

        validators::validate_age(request.date_of_birth, Utc::now().date_naive())?;
        validators::validate_password(&request.password, &request.username, &email)?;

        let password_hash = self.hash_password(&request.password)?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO accounts
                (username, username_cf, email, email_cf, password_hash, date_of_birth,
                 first_name, middle_name, last_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(&request.username)
        .bind(&username_cf)
        .bind(&email)
        .bind(&email_cf)
        .bind(&password_hash)
        .bind(request.date_of_birth)
        .bind(request.first_name.unwrap_or_default())
        .bind(request.middle_name.unwrap_or_default())
        .bind(request.last_name.unwrap_or_default())
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(map_unique_violation)?;

        let account = account_from_row(&row);

        let email_sent = match self.send_verification_email(&account).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "Verification mail for account {} could not be sent: {e}",
                    account.id
                );
                false
            }
        };

        Ok(SignupOutcome {
            account,
            email_sent,
        })
    }

    /// Authenticate by email and password and record the login.
    ///
    /// # Errors
    ///
    /// * `AccountError::InvalidCredentials` - Unknown email, inactive
    ///   account, or wrong password; callers get one undifferentiated
    ///   error for all three
    pub async fn login(&self, request: LoginRequest) -> AccountResult<Account> {
        let email_cf = validators::casefold(&validators::normalize_email(&request.email));

        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email_cf = $1"
        ))
        .bind(&email_cf)
        .fetch_optional(self.pool.as_ref())
        .await?
        .ok_or(AccountError::InvalidCredentials)?;

        let mut account = account_from_row(&row);

        if !account.is_active || !account.has_usable_password() {
            return Err(AccountError::InvalidCredentials);
        }

        self.verify_password(&request.password, &account.password_hash)
            .map_err(|_| AccountError::InvalidCredentials)?;

        let now = Utc::now();
        sqlx::query("UPDATE accounts SET last_login = $2 WHERE id = $1")
            .bind(account.id)
            .bind(now)
            .execute(self.pool.as_ref())
            .await?;
        account.last_login = Some(now);

        Ok(account)
    }

    /// Change the password of an authenticated account.
    pub async fn change_password(
        &self,
        account: &Account,
        request: PasswordChangeRequest,
    ) -> AccountResult<()> {
        self.verify_password(&request.old_password, &account.password_hash)
            .map_err(|_| AccountError::InvalidCredentials)?;

        self.set_password(
            account,
            SetPasswordRequest {
                new_password1: request.new_password1,
                new_password2: request.new_password2,
            },
        )
        .await
    }

    /// Set a new password after re-running the policy. Used at the end
    /// of the reset flow and by `change_password`; the hash change
    /// invalidates all outstanding reset tokens.
    pub async fn set_password(
        &self,
        account: &Account,
        request: SetPasswordRequest,
    ) -> AccountResult<()> {
        if request.new_password1 != request.new_password2 {
            return Err(AccountError::PasswordMismatch);
        }
        validators::validate_password(&request.new_password1, &account.username, &account.email)?;

        let password_hash = self.hash_password(&request.new_password1)?;
        sqlx::query("UPDATE accounts SET password_hash = $2 WHERE id = $1")
            .bind(account.id)
            .bind(&password_hash)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    /// Issue reset tokens and mail reset links to every active account
    /// with a usable password matching the email.
    ///
    /// Always returns Ok for well-formed requests, whether or not any
    /// account matched, so the response does not leak account
    /// existence. Delivery failures are logged and swallowed for the
    /// same reason.
    pub async fn request_password_reset(&self, email: &str) -> AccountResult<()> {
        let email_cf = validators::casefold(&validators::normalize_email(email));

        let rows = sqlx::query(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS} FROM accounts
            WHERE email_cf = $1 AND is_active AND password_hash <> ''
            "#
        ))
        .bind(&email_cf)
        .fetch_all(self.pool.as_ref())
        .await?;

        for row in &rows {
            let account = account_from_row(row);
            let uid = encode_uid(account.id);
            let token = self.reset_tokens.issue(&account);
            let (subject, body) =
                templates::password_reset_email(&self.site, &account, &uid, &token);

            if let Err(e) = self.mailer.send(&account.email, &subject, &body).await {
                log::warn!(
                    "Reset mail for account {} could not be sent: {e}",
                    account.id
                );
            }
        }

        Ok(())
    }

    /// Send (or re-send) the verification mail for an account.
    pub async fn send_verification_email(&self, account: &Account) -> MailResult<()> {
        let uid = encode_uid(account.id);
        let token = self.verification_tokens.issue(account);
        let (subject, body) = templates::verification_email(&self.site, account, &uid, &token);
        self.mailer.send(&account.email, &subject, &body).await
    }

    /// Check a password-reset token against the account's current state.
    pub fn verify_reset_token(&self, account: &Account, token: &str) -> bool {
        self.reset_tokens.verify(account, token)
    }

    /// Check an email-verification token against the account's current
    /// state.
    pub fn verify_email_token(&self, account: &Account, token: &str) -> bool {
        self.verification_tokens.verify(account, token)
    }

    /// Issue a fresh reset token; exposed for the test suites and for
    /// building confirmation links outside of mail delivery.
    pub fn issue_reset_token(&self, account: &Account) -> String {
        self.reset_tokens.issue(account)
    }

    /// Issue a fresh verification token.
    pub fn issue_verification_token(&self, account: &Account) -> String {
        self.verification_tokens.issue(account)
    }

    /// Flip `is_verified` false -> true. Returns false when the account
    /// was already verified; the flag never transitions back.
    pub async fn mark_verified(&self, account: &Account) -> AccountResult<bool> {
        let result =
            sqlx::query("UPDATE accounts SET is_verified = TRUE WHERE id = $1 AND NOT is_verified")
                .bind(account.id)
                .execute(self.pool.as_ref())
                .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Find an account by primary key.
    pub async fn find_by_id(&self, id: AccountId) -> AccountResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(|r| account_from_row(&r)))
    }

    /// Resolve the opaque link segment to an account. A malformed uid
    /// and a missing account both come back as None; callers render one
    /// generic invalid-link result either way.
    pub async fn find_by_uid(&self, uid: &str) -> AccountResult<Option<Account>> {
        match decode_uid(uid) {
            Some(id) => self.find_by_id(id).await,
            None => Ok(None),
        }
    }

    /// Delete an account by username; test support.
    pub async fn delete_by_username(&self, username: &str) -> AccountResult<()> {
        sqlx::query("DELETE FROM accounts WHERE username_cf = $1")
            .bind(validators::casefold(username))
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    /// Hash password with Argon2id + pepper
    fn hash_password(&self, password: &str) -> AccountResult<String> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        Ok(argon2
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AccountError::HashingFailed)?
            .to_string())
    }

    /// Verify password against hash
    fn verify_password(&self, password: &str, hash: &str) -> AccountResult<()> {
        let peppered = format!("{}{}", password, self.pepper);
        let parsed_hash =
            PasswordHash::new(hash).map_err(|_| AccountError::InvalidCredentials)?;
        let argon2 = Argon2::default();

        argon2
            .verify_password(peppered.as_bytes(), &parsed_hash)
            .map_err(|_| AccountError::InvalidCredentials)
    }
}

fn account_from_row(row: &PgRow) -> Account {
    Account {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        date_of_birth: row.get("date_of_birth"),
        first_name: row.get("first_name"),
        middle_name: row.get("middle_name"),
        last_name: row.get("last_name"),
        is_active: row.get("is_active"),
        is_staff: row.get("is_staff"),
        is_superuser: row.get("is_superuser"),
        is_verified: row.get("is_verified"),
        date_joined: row.get("date_joined"),
        last_login: row.get("last_login"),
    }
}

/// Translate a storage-level unique-constraint conflict (the loser of a
/// concurrent signup race) into the matching validation error.
fn map_unique_violation(err: sqlx::Error) -> AccountError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return match db_err.constraint() {
                Some(name) if name.contains("email") => AccountError::EmailTaken,
                _ => AccountError::UsernameTaken,
            };
        }
    }
    AccountError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::MemoryMailer;
    use chrono::NaiveDate;

    // A lazy pool never connects unless a query runs; good enough for
    // exercising the pure parts of the manager.
    fn manager() -> AccountManager {
        let pool = PgPool::connect_lazy("postgres://postgres@localhost/greetbook_test")
            .expect("lazy pool");
        AccountManager::new(
            Arc::new(pool),
            AccountConfig {
                secret_key: "a-test-secret-key-that-is-long-enough".to_string(),
                password_pepper: "test_pepper".to_string(),
                reset_token_expiry_secs: 3 * 24 * 3600,
                verification_token_expiry_secs: 3 * 24 * 3600,
                site: MailContext {
                    site_name: "greetbook".to_string(),
                    domain: "localhost".to_string(),
                    use_https: false,
                },
            },
            Arc::new(MemoryMailer::default()),
        )
    }

    fn account(manager: &AccountManager) -> Account {
        Account {
            id: 1,
            username: "bob".to_string(),
            email: "bob@example.com".to_string(),
            password_hash: manager.hash_password("Str0ngP@ss!").unwrap(),
            date_of_birth: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            first_name: String::new(),
            middle_name: String::new(),
            last_name: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            is_verified: false,
            date_joined: Utc::now(),
            last_login: None,
        }
    }

    #[tokio::test]
    async fn password_hash_is_not_the_plaintext() {
        let manager = manager();
        let hash = manager.hash_password("Str0ngP@ss!").unwrap();
        assert_ne!(hash, "Str0ngP@ss!");
        assert!(hash.starts_with("$argon2"));
    }

    #[tokio::test]
    async fn password_verification_round_trip() {
        let manager = manager();
        let hash = manager.hash_password("Str0ngP@ss!").unwrap();
        assert!(manager.verify_password("Str0ngP@ss!", &hash).is_ok());
        assert!(manager.verify_password("wrong", &hash).is_err());
    }

    #[tokio::test]
    async fn verification_fails_without_the_pepper() {
        let manager = manager();
        let hash = manager.hash_password("Str0ngP@ss!").unwrap();

        // A hash produced elsewhere without the pepper must not verify.
        let unpeppered = Argon2::default()
            .hash_password(b"Str0ngP@ss!", &SaltString::generate(&mut OsRng))
            .unwrap()
            .to_string();
        assert!(manager.verify_password("Str0ngP@ss!", &unpeppered).is_err());
        assert_ne!(hash, unpeppered);
    }

    #[tokio::test]
    async fn reset_and_verification_tokens_are_distinct() {
        let manager = manager();
        let account = account(&manager);

        let reset = manager.issue_reset_token(&account);
        let verify = manager.issue_verification_token(&account);

        assert!(manager.verify_reset_token(&account, &reset));
        assert!(manager.verify_email_token(&account, &verify));
        assert!(!manager.verify_reset_token(&account, &verify));
        assert!(!manager.verify_email_token(&account, &reset));
    }

    #[test]
    fn unique_violation_mapping_prefers_email_constraint() {
        // Non-database errors pass through untouched.
        let err = map_unique_violation(sqlx::Error::PoolClosed);
        assert!(matches!(err, AccountError::Database(_)));
    }
}
