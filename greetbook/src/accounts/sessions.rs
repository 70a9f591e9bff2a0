//! Database-backed web sessions.
//!
//! Sessions serve two roles: carrying the authenticated account id for
//! the browser cookie, and stashing a verification/reset token during
//! the confirmation flows so the real token can be swapped out of the
//! URL after its first successful check. Anonymous sessions (no account
//! attached) are valid; a visitor following an email link is usually
//! not logged in.

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::sync::Arc;
use uuid::Uuid;

use super::errors::AccountResult;
use super::models::AccountId;

/// Session model
#[derive(Debug, Clone)]
pub struct Session {
    pub token: Uuid,
    pub account_id: Option<AccountId>,
    pub reset_token: Option<String>,
    pub verification_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether an account is attached to this session.
    pub fn is_authenticated(&self) -> bool {
        self.account_id.is_some()
    }
}

/// Session persistence over the `web_sessions` table
#[derive(Clone)]
pub struct SessionStore {
    pool: Arc<PgPool>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(pool: Arc<PgPool>, ttl_secs: i64) -> Self {
        Self {
            pool,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Create a new session, optionally already bound to an account.
    pub async fn create(&self, account_id: Option<AccountId>) -> AccountResult<Session> {
        let token = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = now + self.ttl;

        sqlx::query(
            r#"
            INSERT INTO web_sessions (token, account_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(token)
        .bind(account_id)
        .bind(now)
        .bind(expires_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(Session {
            token,
            account_id,
            reset_token: None,
            verification_token: None,
            created_at: now,
            expires_at,
        })
    }

    /// Look up a session by token. Expired sessions are deleted and
    /// reported as absent.
    pub async fn get(&self, token: Uuid) -> AccountResult<Option<Session>> {
        let row = sqlx::query(
            r#"
            SELECT token, account_id, reset_token, verification_token, created_at, expires_at
            FROM web_sessions
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(self.pool.as_ref())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let session = session_from_row(&row);
        if session.expires_at < Utc::now() {
            self.delete(token).await?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Bind an account to a session at login. The session key is
    /// rotated: the old row is deleted and a fresh token issued, and
    /// any stashed confirmation tokens are dropped with it.
    pub async fn promote(&self, old_token: Uuid, account_id: AccountId) -> AccountResult<Session> {
        self.delete(old_token).await?;
        self.create(Some(account_id)).await
    }

    /// Stash or clear the laundered password-reset token.
    pub async fn stash_reset_token(&self, token: Uuid, value: Option<&str>) -> AccountResult<()> {
        sqlx::query("UPDATE web_sessions SET reset_token = $2 WHERE token = $1")
            .bind(token)
            .bind(value)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    /// Stash or clear the laundered email-verification token.
    pub async fn stash_verification_token(
        &self,
        token: Uuid,
        value: Option<&str>,
    ) -> AccountResult<()> {
        sqlx::query("UPDATE web_sessions SET verification_token = $2 WHERE token = $1")
            .bind(token)
            .bind(value)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    /// Delete a session (logout or expiry).
    pub async fn delete(&self, token: Uuid) -> AccountResult<()> {
        sqlx::query("DELETE FROM web_sessions WHERE token = $1")
            .bind(token)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    /// Remove all expired sessions; returns how many were dropped.
    pub async fn purge_expired(&self) -> AccountResult<u64> {
        let result = sqlx::query("DELETE FROM web_sessions WHERE expires_at < $1")
            .bind(Utc::now())
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}

fn session_from_row(row: &PgRow) -> Session {
    Session {
        token: row.get("token"),
        account_id: row.get("account_id"),
        reset_token: row.get("reset_token"),
        verification_token: row.get("verification_token"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}
