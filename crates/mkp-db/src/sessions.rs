//! Server-side sessions keyed by an opaque UUID bearer token.
//!
//! A session lives for a fixed max age from creation. Expired rows are
//! deleted when presented and by [`purge_expired_sessions`].

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::accounts::{account_from_row, Account};

/// Who a session token speaks for.
#[derive(Debug, Clone)]
pub struct SessionSubject {
    pub token: Uuid,
    pub account: Option<Account>,
    pub is_admin: bool,
}

pub async fn create_session(pool: &PgPool, account_id: i64) -> Result<Uuid> {
    let token = Uuid::new_v4();
    sqlx::query("insert into sessions (token, account_id, is_admin) values ($1, $2, false)")
        .bind(token)
        .bind(account_id)
        .execute(pool)
        .await
        .context("create_session failed")?;
    Ok(token)
}

pub async fn create_admin_session(pool: &PgPool) -> Result<Uuid> {
    let token = Uuid::new_v4();
    sqlx::query("insert into sessions (token, account_id, is_admin) values ($1, null, true)")
        .bind(token)
        .execute(pool)
        .await
        .context("create_admin_session failed")?;
    Ok(token)
}

/// Resolve a token. Unknown tokens yield `None`. A session older than
/// `max_age`, or whose account has since been banned, is deleted and also
/// yields `None`.
pub async fn resolve_session(
    pool: &PgPool,
    token: Uuid,
    max_age: Duration,
) -> Result<Option<SessionSubject>> {
    let row = sqlx::query(
        r#"
        select s.token, s.is_admin, s.account_id as session_account_id,
               s.created_at <= now() - make_interval(secs => $2) as expired,
               a.id, a.username, a.avatar_hash, a.banned, a.balance_cents,
               a.merchant_id, a.created_at
        from sessions s
        left join accounts a on a.id = s.account_id
        where s.token = $1
        "#,
    )
    .bind(token)
    .bind(max_age.as_secs_f64())
    .fetch_optional(pool)
    .await
    .context("resolve_session failed")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let expired: bool = row.try_get("expired")?;
    if expired {
        delete_session(pool, token).await?;
        tracing::debug!(%token, "expired session presented");
        return Ok(None);
    }

    let is_admin: bool = row.try_get("is_admin")?;
    let session_account_id: Option<i64> = row.try_get("session_account_id")?;
    let account = match session_account_id {
        Some(_) => Some(account_from_row(&row)?),
        None => None,
    };

    if account.as_ref().is_some_and(|a| a.banned) {
        delete_session(pool, token).await?;
        return Ok(None);
    }

    Ok(Some(SessionSubject {
        token,
        account,
        is_admin,
    }))
}

/// Returns whether a session was removed.
pub async fn delete_session(pool: &PgPool, token: Uuid) -> Result<bool> {
    let res = sqlx::query("delete from sessions where token = $1")
        .bind(token)
        .execute(pool)
        .await
        .context("delete_session failed")?;
    Ok(res.rows_affected() > 0)
}

/// Delete every session older than `max_age`. Returns how many were removed.
pub async fn purge_expired_sessions(pool: &PgPool, max_age: Duration) -> Result<u64> {
    let res = sqlx::query("delete from sessions where created_at <= now() - make_interval(secs => $1)")
        .bind(max_age.as_secs_f64())
        .execute(pool)
        .await
        .context("purge_expired_sessions failed")?;
    Ok(res.rows_affected())
}
