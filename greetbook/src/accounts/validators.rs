//! Input validation: username format, age, password policy, and the
//! Unicode casefold used for uniqueness comparisons.

use chrono::{Months, NaiveDate};
use unicode_normalization::UnicodeNormalization;

use super::errors::{AccountError, AccountResult};

/// Maximum username length in characters
pub const MAX_USERNAME_CHARS: usize = 30;

/// Minimum password length in characters
pub const MIN_PASSWORD_CHARS: usize = 8;

/// Passwords rejected outright. A small slice of the usual leaked-list
/// suspects; the check runs against the casefolded candidate.
const COMMON_PASSWORDS: &[&str] = &[
    "123456",
    "123456789",
    "12345678",
    "1234567890",
    "password",
    "password1",
    "password123",
    "qwerty",
    "qwerty123",
    "abc123",
    "111111",
    "123123",
    "iloveyou",
    "admin",
    "welcome",
    "welcome1",
    "monkey",
    "dragon",
    "letmein",
    "sunshine",
    "princess",
    "football",
    "baseball",
    "charlie",
    "shadow",
    "superman",
    "michael",
    "trustno1",
    "batman",
    "master",
];

/// NFKC-normalized Unicode casefold.
///
/// This is the key used for username/email uniqueness: `"Alice"`,
/// `"ALICE"`, and compatibility forms like `"ﬁ"` vs `"fi"` all collide.
pub fn casefold(s: &str) -> String {
    let normalized: String = s.nfkc().collect();
    let folded = caseless::default_case_fold_str(&normalized);
    folded.nfkc().collect()
}

/// Normalize an email address by lowercasing its domain part. The local
/// part is kept verbatim; uniqueness is enforced on the casefolded key.
pub fn normalize_email(email: &str) -> String {
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Validate username format: at most 30 characters, letters, digits and
/// `@`/`.`/`+`/`-`/`_` only.
pub fn validate_username(username: &str) -> AccountResult<()> {
    if username.is_empty() {
        return Err(AccountError::InvalidUsername(
            "Username must not be empty".to_string(),
        ));
    }

    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(AccountError::InvalidUsername(format!(
            "Username contains {MAX_USERNAME_CHARS} characters or fewer"
        )));
    }

    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err(AccountError::InvalidUsername(
            "Username may contain only letters, digits and @/./+/-/_".to_string(),
        ));
    }

    Ok(())
}

/// Validate that the date of birth represents an age of at least 18
/// years on `today`. A birthday exactly 18 years ago is accepted.
pub fn validate_age(date_of_birth: NaiveDate, today: NaiveDate) -> AccountResult<()> {
    // Feb 29 birthdays clamp to Feb 28 in non-leap years.
    let adult_on = date_of_birth
        .checked_add_months(Months::new(12 * 18))
        .ok_or(AccountError::Underage)?;

    if adult_on > today {
        return Err(AccountError::Underage);
    }

    Ok(())
}

/// Validate password strength: non-empty and of minimum length, not a
/// trivially common password, not purely numeric, and not too similar
/// to the username or email.
pub fn validate_password(password: &str, username: &str, email: &str) -> AccountResult<()> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AccountError::WeakPassword(format!(
            "Password must contain at least {MIN_PASSWORD_CHARS} characters"
        )));
    }

    let folded = casefold(password);
    if COMMON_PASSWORDS.contains(&folded.as_str()) {
        return Err(AccountError::WeakPassword(
            "Password is too common".to_string(),
        ));
    }

    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(AccountError::WeakPassword(
            "Password is entirely numeric".to_string(),
        ));
    }

    if too_similar(&folded, username) {
        return Err(AccountError::WeakPassword(
            "Password is too similar to the username".to_string(),
        ));
    }

    let email_local = email.split('@').next().unwrap_or(email);
    if too_similar(&folded, email) || too_similar(&folded, email_local) {
        return Err(AccountError::WeakPassword(
            "Password is too similar to the email address".to_string(),
        ));
    }

    Ok(())
}

/// Containment check in casefolded space. Attributes shorter than four
/// characters are skipped so single letters don't poison the policy.
fn too_similar(folded_password: &str, attribute: &str) -> bool {
    let folded_attr = casefold(attribute);
    if folded_attr.chars().count() < 4 {
        return false;
    }
    folded_password.contains(&folded_attr) || folded_attr.contains(folded_password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn casefold_collides_simple_case_variants() {
        assert_eq!(casefold("alice"), casefold("Alice"));
        assert_eq!(casefold("alice"), casefold("ALICE"));
        assert_ne!(casefold("alice"), casefold("alicia"));
    }

    #[test]
    fn casefold_collides_compatibility_forms() {
        // U+FB01 LATIN SMALL LIGATURE FI normalizes to "fi" under NFKC.
        assert_eq!(casefold("\u{fb01}sh"), casefold("fish"));
        // German sharp s casefolds to "ss".
        assert_eq!(casefold("stra\u{df}e"), casefold("STRASSE"));
    }

    #[test]
    fn email_normalization_lowercases_domain_only() {
        assert_eq!(normalize_email("Bob@EXAMPLE.Com"), "Bob@example.com");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn username_format() {
        assert!(validate_username("bob.smith+test_1@x").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"a".repeat(31)).is_err());
        assert!(validate_username(&"a".repeat(30)).is_ok());
    }

    #[test]
    fn age_boundary_is_inclusive_at_exactly_eighteen() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();
        let exactly_18 = NaiveDate::from_ymd_opt(2008, 8, 29).unwrap();
        let one_day_short = NaiveDate::from_ymd_opt(2008, 8, 30).unwrap();

        assert!(validate_age(exactly_18, today).is_ok());
        assert!(matches!(
            validate_age(one_day_short, today),
            Err(AccountError::Underage)
        ));
    }

    #[test]
    fn age_handles_leap_day_births() {
        let dob = NaiveDate::from_ymd_opt(2008, 2, 29).unwrap();
        // 2008-02-29 + 18 years clamps to 2026-02-28.
        assert!(validate_age(dob, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()).is_ok());
        assert!(validate_age(dob, NaiveDate::from_ymd_opt(2026, 2, 27).unwrap()).is_err());
    }

    #[test]
    fn password_policy_rejections() {
        let check = |p: &str| validate_password(p, "bob_smith", "bob@example.com");

        assert!(matches!(check("short1A"), Err(AccountError::WeakPassword(_))));
        assert!(matches!(
            check("password123"),
            Err(AccountError::WeakPassword(_))
        ));
        assert!(matches!(
            check("8675309124"),
            Err(AccountError::WeakPassword(_))
        ));
        assert!(matches!(
            check("bob_smith99"),
            Err(AccountError::WeakPassword(_))
        ));
        assert!(matches!(
            check("xBOB@example.comx"),
            Err(AccountError::WeakPassword(_))
        ));
        assert!(check("Str0ngP@ss!").is_ok());
    }

    #[test]
    fn common_password_check_is_case_insensitive() {
        assert!(matches!(
            validate_password("PASSWORD123", "u", "u@example.com"),
            Err(AccountError::WeakPassword(_))
        ));
    }

    proptest! {
        #[test]
        fn casefold_is_idempotent(s in "\\PC{0,32}") {
            let once = casefold(&s);
            prop_assert_eq!(casefold(&once), once);
        }

        #[test]
        fn validate_password_never_panics(p in "\\PC{0,64}") {
            let _ = validate_password(&p, "someuser", "some@example.com");
        }
    }
}
