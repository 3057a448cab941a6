//! Accounts: login upsert, lookup, admin moderation, merchant linking.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use mkp_ledger::{Cents, MarketError};
use mkp_providers::Identity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub avatar_hash: Option<String>,
    pub banned: bool,
    pub balance: Cents,
    pub merchant_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub(crate) const ACCOUNT_COLUMNS: &str =
    "id, username, avatar_hash, banned, balance_cents, merchant_id, created_at";

pub(crate) fn account_from_row(row: &PgRow) -> Result<Account> {
    Ok(Account {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        avatar_hash: row.try_get("avatar_hash")?,
        banned: row.try_get("banned")?,
        balance: Cents::new(row.try_get("balance_cents")?),
        merchant_id: row.try_get("merchant_id")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Create the account on first login, refresh name and avatar on later ones.
///
/// Banned accounts are refreshed but refused with `Forbidden`; the caller must
/// not issue a session.
pub async fn upsert_account_on_login(pool: &PgPool, identity: &Identity) -> Result<Account> {
    let row = sqlx::query(&format!(
        r#"
        insert into accounts (id, username, avatar_hash)
        values ($1, $2, $3)
        on conflict (id) do update
          set username = excluded.username,
              avatar_hash = excluded.avatar_hash
        returning {ACCOUNT_COLUMNS}
        "#
    ))
    .bind(identity.id)
    .bind(&identity.username)
    .bind(&identity.avatar)
    .fetch_one(pool)
    .await
    .context("upsert_account_on_login failed")?;

    let account = account_from_row(&row)?;
    if account.banned {
        return Err(MarketError::forbidden("account is banned").into());
    }
    Ok(account)
}

pub async fn fetch_account(pool: &PgPool, account_id: i64) -> Result<Account> {
    let row = sqlx::query(&format!(
        "select {ACCOUNT_COLUMNS} from accounts where id = $1"
    ))
    .bind(account_id)
    .fetch_optional(pool)
    .await
    .context("fetch_account failed")?;

    match row {
        Some(r) => account_from_row(&r),
        None => Err(MarketError::NotFound {
            entity: "account",
            id: account_id,
        }
        .into()),
    }
}

/// All accounts ordered by username (admin dashboard).
pub async fn list_accounts(pool: &PgPool) -> Result<Vec<Account>> {
    let rows = sqlx::query(&format!(
        "select {ACCOUNT_COLUMNS} from accounts order by username asc, id asc"
    ))
    .fetch_all(pool)
    .await
    .context("list_accounts failed")?;

    rows.iter().map(account_from_row).collect()
}

/// Ban an account and revoke its sessions in one transaction.
pub async fn ban_account(pool: &PgPool, account_id: i64) -> Result<Account> {
    let mut tx = pool.begin().await.context("ban_account begin failed")?;

    let row = sqlx::query(&format!(
        "update accounts set banned = true where id = $1 returning {ACCOUNT_COLUMNS}"
    ))
    .bind(account_id)
    .fetch_optional(&mut *tx)
    .await
    .context("ban_account update failed")?;

    let Some(row) = row else {
        return Err(MarketError::NotFound {
            entity: "account",
            id: account_id,
        }
        .into());
    };

    sqlx::query("delete from sessions where account_id = $1")
        .bind(account_id)
        .execute(&mut *tx)
        .await
        .context("ban_account session revoke failed")?;

    tx.commit().await.context("ban_account commit failed")?;
    tracing::info!(account_id, "account banned");
    account_from_row(&row)
}

pub async fn unban_account(pool: &PgPool, account_id: i64) -> Result<Account> {
    let row = sqlx::query(&format!(
        "update accounts set banned = false where id = $1 returning {ACCOUNT_COLUMNS}"
    ))
    .bind(account_id)
    .fetch_optional(pool)
    .await
    .context("unban_account failed")?;

    match row {
        Some(r) => {
            tracing::info!(account_id, "account unbanned");
            account_from_row(&r)
        }
        None => Err(MarketError::NotFound {
            entity: "account",
            id: account_id,
        }
        .into()),
    }
}

/// Delete an account. Listings (with their purchases and messages),
/// withdrawals and sessions go with it; purchases it made as a buyer are kept
/// for the seller with the buyer cleared.
pub async fn delete_account(pool: &PgPool, account_id: i64) -> Result<()> {
    let res = sqlx::query("delete from accounts where id = $1")
        .bind(account_id)
        .execute(pool)
        .await
        .context("delete_account failed")?;

    if res.rows_affected() == 0 {
        return Err(MarketError::NotFound {
            entity: "account",
            id: account_id,
        }
        .into());
    }
    tracing::info!(account_id, "account deleted");
    Ok(())
}

/// Record the payment processor's merchant id for a seller.
pub async fn set_merchant_id(pool: &PgPool, account_id: i64, merchant_id: &str) -> Result<Account> {
    let row = sqlx::query(&format!(
        "update accounts set merchant_id = $2 where id = $1 returning {ACCOUNT_COLUMNS}"
    ))
    .bind(account_id)
    .bind(merchant_id)
    .fetch_optional(pool)
    .await
    .context("set_merchant_id failed")?;

    match row {
        Some(r) => account_from_row(&r),
        None => Err(MarketError::NotFound {
            entity: "account",
            id: account_id,
        }
        .into()),
    }
}
