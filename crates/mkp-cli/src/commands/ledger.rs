//! `mkp ledger` handlers.

use anyhow::{bail, Result};
use sqlx::PgPool;

pub async fn check(pool: &PgPool, account_id: i64) -> Result<()> {
    let c = mkp_db::ledger_check(pool, account_id).await?;
    println!("account_id={}", c.account_id);
    println!("balance={}", c.balance);
    println!("expected={}", c.expected);
    if !c.is_consistent() {
        bail!(
            "LEDGER_MISMATCH account_id={} balance={} expected={}",
            c.account_id,
            c.balance,
            c.expected
        );
    }
    println!("consistent=true");
    Ok(())
}
