//! Seller balance and withdrawal ledger.
//!
//! Withdrawals debit the balance when requested, not when paid out. Completing
//! a request only records the payout; rejecting it returns the amount.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use mkp_ledger::withdrawal::{expected_balance, release, reserve};
use mkp_ledger::{Cents, MarketError, WithdrawalAction, WithdrawalDraft, WithdrawalStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Withdrawal {
    pub id: i64,
    pub account_id: i64,
    pub amount: Cents,
    pub method: String,
    pub destination: String,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Stored balance next to the balance implied by purchase credits and
/// withdrawals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerCheck {
    pub account_id: i64,
    pub balance: Cents,
    pub expected: Cents,
}

impl LedgerCheck {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.expected
    }
}

const WITHDRAWAL_COLUMNS: &str =
    "id, account_id, amount_cents, method, destination, status, requested_at, resolved_at";

fn withdrawal_from_row(row: &PgRow) -> Result<Withdrawal> {
    let status: String = row.try_get("status")?;
    Ok(Withdrawal {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        amount: Cents::new(row.try_get("amount_cents")?),
        method: row.try_get("method")?,
        destination: row.try_get("destination")?,
        status: WithdrawalStatus::parse(&status)
            .with_context(|| format!("corrupt withdrawal status in db: {status}"))?,
        requested_at: row.try_get("requested_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

/// `for no key update` serialises balance writers without waiting on the
/// `for key share` a purchase holds on its seller for the length of a charge.
async fn lock_balance(tx: &mut Transaction<'_, Postgres>, account_id: i64) -> Result<Cents> {
    let balance: Option<i64> =
        sqlx::query_scalar("select balance_cents from accounts where id = $1 for no key update")
            .bind(account_id)
            .fetch_optional(&mut **tx)
            .await
            .context("account row lock failed")?;

    match balance {
        Some(b) => Ok(Cents::new(b)),
        None => Err(MarketError::NotFound {
            entity: "account",
            id: account_id,
        }
        .into()),
    }
}

async fn store_balance(
    tx: &mut Transaction<'_, Postgres>,
    account_id: i64,
    balance: Cents,
) -> Result<()> {
    sqlx::query("update accounts set balance_cents = $2 where id = $1")
        .bind(account_id)
        .bind(balance.raw())
        .execute(&mut **tx)
        .await
        .context("balance update failed")?;
    Ok(())
}

/// Debit `draft.amount` and record a pending withdrawal. Nothing is written
/// when the balance is short.
pub async fn request_withdrawal(
    pool: &PgPool,
    account_id: i64,
    draft: WithdrawalDraft,
    payout_methods: &[String],
) -> Result<Withdrawal> {
    let draft = draft.validate(payout_methods)?;

    let mut tx = pool.begin().await.context("request_withdrawal begin failed")?;

    let balance = lock_balance(&mut tx, account_id).await?;
    let remaining = reserve(balance, draft.amount)?;
    store_balance(&mut tx, account_id, remaining).await?;

    let row = sqlx::query(&format!(
        r#"
        insert into withdrawals (account_id, amount_cents, method, destination, status)
        values ($1, $2, $3, $4, 'pending')
        returning {WITHDRAWAL_COLUMNS}
        "#
    ))
    .bind(account_id)
    .bind(draft.amount.raw())
    .bind(&draft.method)
    .bind(&draft.destination)
    .fetch_one(&mut *tx)
    .await
    .context("request_withdrawal insert failed")?;

    tx.commit().await.context("request_withdrawal commit failed")?;

    let withdrawal = withdrawal_from_row(&row)?;
    tracing::info!(
        withdrawal_id = withdrawal.id,
        account_id,
        amount = %withdrawal.amount,
        method = %withdrawal.method,
        "withdrawal requested"
    );
    Ok(withdrawal)
}

async fn resolve(pool: &PgPool, withdrawal_id: i64, action: WithdrawalAction) -> Result<Withdrawal> {
    let mut tx = pool.begin().await.context("resolve_withdrawal begin failed")?;

    let row = sqlx::query(
        "select status, account_id, amount_cents from withdrawals where id = $1 for update",
    )
    .bind(withdrawal_id)
    .fetch_optional(&mut *tx)
    .await
    .context("withdrawal row lock failed")?;
    let Some(row) = row else {
        return Err(MarketError::NotFound {
            entity: "withdrawal",
            id: withdrawal_id,
        }
        .into());
    };

    let from: String = row.try_get("status")?;
    let account_id: i64 = row.try_get("account_id")?;
    let amount = Cents::new(row.try_get("amount_cents")?);
    let to = WithdrawalStatus::parse(&from)?.apply(action)?;

    if to == WithdrawalStatus::Rejected {
        let balance = lock_balance(&mut tx, account_id).await?;
        store_balance(&mut tx, account_id, release(balance, amount)?).await?;
    }

    let row = sqlx::query(&format!(
        r#"
        update withdrawals
        set status = $2, resolved_at = now()
        where id = $1
        returning {WITHDRAWAL_COLUMNS}
        "#
    ))
    .bind(withdrawal_id)
    .bind(to.as_str())
    .fetch_one(&mut *tx)
    .await
    .context("withdrawal status update failed")?;

    tx.commit().await.context("resolve_withdrawal commit failed")?;
    tracing::info!(withdrawal_id, account_id, status = %to, "withdrawal resolved");
    withdrawal_from_row(&row)
}

/// `pending -> completed`. The balance was debited at request time.
pub async fn complete_withdrawal(pool: &PgPool, withdrawal_id: i64) -> Result<Withdrawal> {
    resolve(pool, withdrawal_id, WithdrawalAction::Complete).await
}

/// `pending -> rejected`, re-crediting the amount.
pub async fn reject_withdrawal(pool: &PgPool, withdrawal_id: i64) -> Result<Withdrawal> {
    resolve(pool, withdrawal_id, WithdrawalAction::Reject).await
}

/// An account's withdrawals, newest first.
pub async fn list_withdrawals(pool: &PgPool, account_id: i64) -> Result<Vec<Withdrawal>> {
    let rows = sqlx::query(&format!(
        r#"
        select {WITHDRAWAL_COLUMNS} from withdrawals
        where account_id = $1
        order by requested_at desc, id desc
        "#
    ))
    .bind(account_id)
    .fetch_all(pool)
    .await
    .context("list_withdrawals failed")?;

    rows.iter().map(withdrawal_from_row).collect()
}

/// Payout queue, oldest first.
pub async fn list_pending_withdrawals(pool: &PgPool) -> Result<Vec<Withdrawal>> {
    let rows = sqlx::query(&format!(
        r#"
        select {WITHDRAWAL_COLUMNS} from withdrawals
        where status = 'pending'
        order by requested_at asc, id asc
        "#
    ))
    .fetch_all(pool)
    .await
    .context("list_pending_withdrawals failed")?;

    rows.iter().map(withdrawal_from_row).collect()
}

/// Recompute an account's balance from its purchase credits and withdrawals.
pub async fn ledger_check(pool: &PgPool, account_id: i64) -> Result<LedgerCheck> {
    let mut tx = pool.begin().await.context("ledger_check begin failed")?;
    sqlx::query("set transaction isolation level repeatable read")
        .execute(&mut *tx)
        .await
        .context("ledger_check isolation failed")?;

    let balance: Option<i64> = sqlx::query_scalar("select balance_cents from accounts where id = $1")
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await
        .context("ledger_check balance read failed")?;
    let Some(balance) = balance else {
        return Err(MarketError::NotFound {
            entity: "account",
            id: account_id,
        }
        .into());
    };

    let credits: Vec<i64> =
        sqlx::query_scalar("select seller_credit_cents from purchases where seller_id = $1")
            .bind(account_id)
            .fetch_all(&mut *tx)
            .await
            .context("ledger_check credits read failed")?;

    let rows = sqlx::query("select amount_cents, status from withdrawals where account_id = $1")
        .bind(account_id)
        .fetch_all(&mut *tx)
        .await
        .context("ledger_check withdrawals read failed")?;
    let mut withdrawals = Vec::with_capacity(rows.len());
    for r in &rows {
        let status: String = r.try_get("status")?;
        withdrawals.push((
            Cents::new(r.try_get("amount_cents")?),
            WithdrawalStatus::parse(&status)?,
        ));
    }

    tx.commit().await.context("ledger_check commit failed")?;

    let expected = expected_balance(credits.into_iter().map(Cents::new), withdrawals)
        .context("ledger_check overflow")?;
    Ok(LedgerCheck {
        account_id,
        balance: Cents::new(balance),
        expected,
    })
}
