//! Subject and body templates for verification and reset mails.

use crate::accounts::models::Account;

/// Site context rendered into outbound mail
#[derive(Debug, Clone)]
pub struct MailContext {
    pub site_name: String,
    pub domain: String,
    pub use_https: bool,
}

impl MailContext {
    pub fn protocol(&self) -> &'static str {
        if self.use_https { "https" } else { "http" }
    }
}

/// Build the email-verification message: `(subject, body)`.
pub fn verification_email(
    ctx: &MailContext,
    account: &Account,
    uid: &str,
    token: &str,
) -> (String, String) {
    let subject = collapse_subject(&format!("Verify your email on {}", ctx.site_name));
    let link = format!(
        "{}://{}/verify/{}/{}",
        ctx.protocol(),
        ctx.domain,
        uid,
        token
    );
    let body = format!(
        "You're receiving this email because you registered an account on {site}.\n\
         \n\
         Please verify your email address by following this link:\n\
         \n\
         {link}\n\
         \n\
         Your username, in case you've forgotten: {username}\n\
         \n\
         Thanks for using our site!\n\
         The {site} team",
        site = ctx.site_name,
        link = link,
        username = account.username,
    );
    (subject, body)
}

/// Build the password-reset message: `(subject, body)`.
pub fn password_reset_email(
    ctx: &MailContext,
    account: &Account,
    uid: &str,
    token: &str,
) -> (String, String) {
    let subject = collapse_subject(&format!("Password reset on {}", ctx.site_name));
    let link = format!(
        "{}://{}/password-reset/confirm/{}/{}",
        ctx.protocol(),
        ctx.domain,
        uid,
        token
    );
    let body = format!(
        "You're receiving this email because you requested a password reset \
         for your account on {site}.\n\
         \n\
         Please go to the following page and choose a new password:\n\
         \n\
         {link}\n\
         \n\
         Your username, in case you've forgotten: {username}\n\
         \n\
         If you didn't request this, you can safely ignore this email.\n\
         The {site} team",
        site = ctx.site_name,
        link = link,
        username = account.username,
    );
    (subject, body)
}

// Subjects must not contain newlines.
fn collapse_subject(subject: &str) -> String {
    subject.lines().collect::<Vec<_>>().join("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn context() -> MailContext {
        MailContext {
            site_name: "greetbook".to_string(),
            domain: "greetbook.example.com".to_string(),
            use_https: true,
        }
    }

    fn account() -> Account {
        Account {
            id: 7,
            username: "bob".to_string(),
            email: "bob@example.com".to_string(),
            password_hash: "hash".to_string(),
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

    #[test]
    fn verification_mail_contains_link_and_username() {
        let (subject, body) = verification_email(&context(), &account(), "Nw", "abc-def");
        assert!(subject.contains("greetbook"));
        assert!(body.contains("https://greetbook.example.com/verify/Nw/abc-def"));
        assert!(body.contains("bob"));
    }

    #[test]
    fn reset_mail_uses_http_when_configured() {
        let mut ctx = context();
        ctx.use_https = false;
        let (_, body) = password_reset_email(&ctx, &account(), "Nw", "abc-def");
        assert!(body.contains("http://greetbook.example.com/password-reset/confirm/Nw/abc-def"));
    }

    #[test]
    fn subjects_never_contain_newlines() {
        let mut ctx = context();
        ctx.site_name = "evil\nsite".to_string();
        let (subject, _) = verification_email(&ctx, &account(), "Nw", "t");
        assert!(!subject.contains('\n'));
    }
}
