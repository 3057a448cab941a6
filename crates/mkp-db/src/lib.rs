//! mkp-db
//!
//! Postgres persistence for the marketplace ledger.
//!
//! Every mutating operation follows the same shape: open a transaction, lock
//! the rows it depends on (`select ... for update`), ask `mkp-ledger` whether
//! the change is legal, write, commit. A rejected operation returns before
//! commit and the dropped transaction rolls back, so state is never partially
//! applied.
//!
//! Domain rejections are returned as `anyhow::Error` wrapping a
//! [`mkp_ledger::MarketError`]; callers recover them with `downcast_ref`.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub mod accounts;
pub mod listings;
pub mod messages;
pub mod purchases;
pub mod sessions;
pub mod withdrawals;

pub use accounts::{
    ban_account, delete_account, fetch_account, list_accounts, set_merchant_id, unban_account,
    upsert_account_on_login, Account,
};
pub use listings::{
    approve_listing, create_game, deny_listing, fetch_listing, fetch_public_listing, list_games,
    list_pending, list_public, submit_listing, Game, Listing,
};
pub use messages::{list_messages, post_message, Message};
pub use purchases::{fetch_purchase, list_purchases, purchase, Purchase, PurchaseTerms};
pub use sessions::{
    create_admin_session, create_session, delete_session, purge_expired_sessions, resolve_session,
    SessionSubject,
};
pub use withdrawals::{
    complete_withdrawal, ledger_check, list_pending_withdrawals, list_withdrawals,
    reject_withdrawal, request_withdrawal, LedgerCheck, Withdrawal,
};

pub const ENV_DB_URL: &str = "MKP_DATABASE_URL";

/// Connect to Postgres using MKP_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='listings'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_ledger_schema: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_ledger_schema: bool,
}

/// Detect a Postgres unique constraint violation by name.
pub(crate) fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}
