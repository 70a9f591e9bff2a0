//! Schema setup for the account and session tables.
//!
//! The unique indexes on the casefolded columns are the authoritative
//! race-safety mechanism for username/email uniqueness; the
//! application-level checks are a best-effort pre-check only.

use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id              BIGSERIAL PRIMARY KEY,
        username        TEXT NOT NULL,
        username_cf     TEXT NOT NULL,
        email           TEXT NOT NULL,
        email_cf        TEXT NOT NULL,
        password_hash   TEXT NOT NULL,
        date_of_birth   DATE NOT NULL,
        first_name      TEXT NOT NULL DEFAULT '',
        middle_name     TEXT NOT NULL DEFAULT '',
        last_name       TEXT NOT NULL DEFAULT '',
        is_active       BOOLEAN NOT NULL DEFAULT TRUE,
        is_staff        BOOLEAN NOT NULL DEFAULT FALSE,
        is_superuser    BOOLEAN NOT NULL DEFAULT FALSE,
        is_verified     BOOLEAN NOT NULL DEFAULT FALSE,
        date_joined     TIMESTAMPTZ NOT NULL DEFAULT now(),
        last_login      TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS accounts_username_cf_key
        ON accounts (username_cf)
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS accounts_email_cf_key
        ON accounts (email_cf)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS web_sessions (
        token               UUID PRIMARY KEY,
        account_id          BIGINT REFERENCES accounts (id) ON DELETE CASCADE,
        reset_token         TEXT,
        verification_token  TEXT,
        created_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
        expires_at          TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS web_sessions_expires_at_idx
        ON web_sessions (expires_at)
    "#,
];

/// Create the tables and indexes if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
