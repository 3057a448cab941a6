//! Purchase settlement.
//!
//! One transaction per purchase:
//!
//! 1. `for update` on the listing row (serialises buyers of the same listing),
//!    `for key share` on the buyer and seller rows. Neither can be deleted
//!    mid-charge; balance updates and `for no key update` locks still proceed.
//! 2. Precondition check and fee split from `mkp-ledger`.
//! 3. External charge, bounded by `PurchaseTerms::charge_timeout`. A failure
//!    or expiry returns before any write; the dropped transaction rolls back
//!    and releases the locks and the pool connection.
//! 4. Listing -> sold, purchase row, seller credit per fulfillment policy.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use mkp_ledger::{
    Cents, FeeSchedule, FulfillmentPolicy, ListingAction, ListingOutcome, MarketError,
    PurchaseCandidate,
};
use mkp_providers::{ChargeRequest, PaymentProcessor};

use crate::is_unique_constraint_violation;
use crate::listings::lock_listing_status;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Purchase {
    pub id: i64,
    pub listing_id: i64,
    pub listing_title: String,
    /// `None` once the buyer's account has been deleted.
    pub buyer_id: Option<i64>,
    pub seller_id: i64,
    pub price: Cents,
    pub fee: Cents,
    pub seller_credit: Cents,
    pub confirmation_id: String,
    pub created_at: DateTime<Utc>,
}

/// Deployment-wide settlement terms.
#[derive(Debug, Clone)]
pub struct PurchaseTerms {
    pub fees: FeeSchedule,
    pub fulfillment: FulfillmentPolicy,
    pub currency: String,
    /// The charge is abandoned, and the purchase fails, after this long.
    pub charge_timeout: Duration,
}

const PURCHASE_SELECT: &str = r#"
    select p.id, p.listing_id, l.title as listing_title, p.buyer_id, p.seller_id,
           p.price_cents, p.fee_cents, p.seller_credit_cents, p.confirmation_id, p.created_at
    from purchases p
    join listings l on l.id = p.listing_id
"#;

fn purchase_from_row(row: &PgRow) -> Result<Purchase> {
    Ok(Purchase {
        id: row.try_get("id")?,
        listing_id: row.try_get("listing_id")?,
        listing_title: row.try_get("listing_title")?,
        buyer_id: row.try_get("buyer_id")?,
        seller_id: row.try_get("seller_id")?,
        price: Cents::new(row.try_get("price_cents")?),
        fee: Cents::new(row.try_get("fee_cents")?),
        seller_credit: Cents::new(row.try_get("seller_credit_cents")?),
        confirmation_id: row.try_get("confirmation_id")?,
        created_at: row.try_get("created_at")?,
    })
}

struct PartyRow {
    id: i64,
    banned: bool,
    merchant_id: Option<String>,
}

fn find_party(parties: &[PartyRow], id: i64) -> Result<&PartyRow, MarketError> {
    parties
        .iter()
        .find(|p| p.id == id)
        .ok_or(MarketError::NotFound {
            entity: "account",
            id,
        })
}

/// Buy `listing_id` for `buyer_id`, charging `payment_token`.
pub async fn purchase(
    pool: &PgPool,
    processor: &dyn PaymentProcessor,
    terms: &PurchaseTerms,
    listing_id: i64,
    buyer_id: i64,
    payment_token: &str,
) -> Result<Purchase> {
    let payment_token = payment_token.trim();
    if payment_token.is_empty() {
        return Err(MarketError::validation("payment token must not be empty").into());
    }

    let mut tx = pool.begin().await.context("purchase begin failed")?;

    let status = lock_listing_status(&mut tx, listing_id).await?;
    let listing = sqlx::query("select seller_id, price_cents, title from listings where id = $1")
        .bind(listing_id)
        .fetch_one(&mut *tx)
        .await
        .context("purchase listing read failed")?;
    let seller_id: i64 = listing.try_get("seller_id")?;
    let price = Cents::new(listing.try_get("price_cents")?);
    let title: String = listing.try_get("title")?;

    let party_rows = sqlx::query(
        r#"
        select id, banned, merchant_id
        from accounts
        where id = any($1)
        order by id
        for key share
        "#,
    )
    .bind(vec![buyer_id, seller_id])
    .fetch_all(&mut *tx)
    .await
    .context("purchase party lock failed")?;

    let mut parties = Vec::with_capacity(party_rows.len());
    for row in &party_rows {
        parties.push(PartyRow {
            id: row.try_get("id")?,
            banned: row.try_get("banned")?,
            merchant_id: row.try_get("merchant_id")?,
        });
    }
    let buyer = find_party(&parties, buyer_id)?;
    let seller = find_party(&parties, seller_id)?;

    let candidate = PurchaseCandidate {
        listing_status: status,
        seller_id,
        seller_banned: seller.banned,
        seller_merchant_id: seller.merchant_id.clone(),
        buyer_id,
        buyer_banned: buyer.banned,
    };
    let destination = candidate.check(terms.fulfillment)?;
    let split = terms.fees.split(price)?;
    let sold = match status.apply(ListingAction::Sell)? {
        ListingOutcome::Becomes(s) => s,
        ListingOutcome::Deleted => {
            return Err(MarketError::not_purchasable("listing no longer exists").into())
        }
    };

    let charge = processor.charge(ChargeRequest {
        amount: split.price,
        currency: terms.currency.clone(),
        application_fee: split.fee,
        destination,
        source: payment_token.to_string(),
        description: format!("listing {listing_id}: {title}"),
    });
    let receipt = match tokio::time::timeout(terms.charge_timeout, charge).await {
        Ok(Ok(receipt)) => receipt,
        Ok(Err(e)) => {
            tracing::warn!(listing_id, buyer_id, processor = processor.name(), error = %e, "charge failed");
            return Err(MarketError::PaymentFailed(e.to_string()).into());
        }
        Err(_) => {
            tracing::warn!(
                listing_id,
                buyer_id,
                processor = processor.name(),
                timeout_ms = terms.charge_timeout.as_millis() as u64,
                "charge timed out"
            );
            return Err(MarketError::PaymentFailed("payment processor timed out".to_string()).into());
        }
    };

    let seller_credit = terms.fulfillment.seller_credit(&split);

    sqlx::query("update listings set status = $2 where id = $1")
        .bind(listing_id)
        .bind(sold.as_str())
        .execute(&mut *tx)
        .await
        .context("purchase listing update failed")?;

    let inserted = sqlx::query(
        r#"
        insert into purchases (
          listing_id, buyer_id, seller_id, price_cents, fee_cents, seller_credit_cents, confirmation_id
        ) values ($1, $2, $3, $4, $5, $6, $7)
        returning id
        "#,
    )
    .bind(listing_id)
    .bind(buyer_id)
    .bind(seller_id)
    .bind(split.price.raw())
    .bind(split.fee.raw())
    .bind(seller_credit.raw())
    .bind(&receipt.confirmation_id)
    .fetch_one(&mut *tx)
    .await;

    let purchase_id: i64 = match inserted {
        Ok(row) => row.try_get("id")?,
        Err(e) if is_unique_constraint_violation(&e, "uq_purchases_listing") => {
            return Err(MarketError::not_purchasable("listing already sold").into());
        }
        Err(e) => return Err(anyhow::Error::new(e).context("purchase insert failed")),
    };

    if seller_credit.is_positive() {
        sqlx::query("update accounts set balance_cents = balance_cents + $2 where id = $1")
            .bind(seller_id)
            .bind(seller_credit.raw())
            .execute(&mut *tx)
            .await
            .context("purchase seller credit failed")?;
    }

    if let Err(e) = tx.commit().await {
        // The processor has already taken the money; operators must reconcile.
        tracing::error!(
            listing_id,
            buyer_id,
            confirmation_id = %receipt.confirmation_id,
            error = %e,
            "purchase commit failed after successful charge"
        );
        return Err(anyhow::Error::new(e).context("purchase commit failed"));
    }

    tracing::info!(
        listing_id,
        purchase_id,
        buyer_id,
        seller_id,
        price = %split.price,
        fee = %split.fee,
        seller_credit = %seller_credit,
        policy = terms.fulfillment.as_str(),
        "purchase settled"
    );

    fetch_purchase(pool, purchase_id).await
}

pub async fn fetch_purchase(pool: &PgPool, purchase_id: i64) -> Result<Purchase> {
    let row = sqlx::query(&format!("{PURCHASE_SELECT} where p.id = $1"))
        .bind(purchase_id)
        .fetch_optional(pool)
        .await
        .context("fetch_purchase failed")?;

    match row {
        Some(r) => purchase_from_row(&r),
        None => Err(MarketError::NotFound {
            entity: "purchase",
            id: purchase_id,
        }
        .into()),
    }
}

/// Purchases where the account is buyer or seller, newest first.
pub async fn list_purchases(pool: &PgPool, account_id: i64) -> Result<Vec<Purchase>> {
    let rows = sqlx::query(&format!(
        r#"{PURCHASE_SELECT}
        where p.buyer_id = $1 or p.seller_id = $1
        order by p.created_at desc, p.id desc
        "#
    ))
    .bind(account_id)
    .fetch_all(pool)
    .await
    .context("list_purchases failed")?;

    rows.iter().map(purchase_from_row).collect()
}
