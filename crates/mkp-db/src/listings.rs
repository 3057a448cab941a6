//! Listing lifecycle, moderation and the game catalog.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use mkp_ledger::{Cents, ListingAction, ListingDraft, ListingOutcome, ListingStatus, MarketError};

use crate::is_unique_constraint_violation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub id: i64,
    pub seller_id: i64,
    pub seller_username: String,
    pub title: String,
    pub description: Option<String>,
    pub price: Cents,
    pub status: ListingStatus,
    pub image_url: Option<String>,
    pub game_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Game {
    pub id: i64,
    pub name: String,
    pub icon_url: Option<String>,
}

const LISTING_SELECT: &str = r#"
    select l.id, l.seller_id, a.username as seller_username, l.title, l.description,
           l.price_cents, l.status, l.image_url, l.game_id, l.created_at
    from listings l
    join accounts a on a.id = l.seller_id
"#;

fn listing_from_row(row: &PgRow) -> Result<Listing> {
    let status: String = row.try_get("status")?;
    Ok(Listing {
        id: row.try_get("id")?,
        seller_id: row.try_get("seller_id")?,
        seller_username: row.try_get("seller_username")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        price: Cents::new(row.try_get("price_cents")?),
        status: ListingStatus::parse(&status)
            .with_context(|| format!("corrupt listing status in db: {status}"))?,
        image_url: row.try_get("image_url")?,
        game_id: row.try_get("game_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn listing_not_found(id: i64) -> anyhow::Error {
    MarketError::NotFound {
        entity: "listing",
        id,
    }
    .into()
}

/// Create a listing for `seller_id`. Starts `pending` under moderation,
/// `available` otherwise.
pub async fn submit_listing(
    pool: &PgPool,
    seller_id: i64,
    draft: ListingDraft,
    moderation: bool,
) -> Result<Listing> {
    let draft = draft.validate()?;
    let status = ListingStatus::initial(moderation);

    let mut tx = pool.begin().await.context("submit_listing begin failed")?;

    let seller = sqlx::query("select banned from accounts where id = $1 for share")
        .bind(seller_id)
        .fetch_optional(&mut *tx)
        .await
        .context("submit_listing seller lookup failed")?;
    let Some(seller) = seller else {
        return Err(MarketError::NotFound {
            entity: "account",
            id: seller_id,
        }
        .into());
    };
    let banned: bool = seller.try_get("banned")?;
    if banned {
        return Err(MarketError::forbidden("banned accounts cannot create listings").into());
    }

    if let Some(game_id) = draft.game_id {
        let exists: Option<i64> = sqlx::query_scalar("select id from games where id = $1")
            .bind(game_id)
            .fetch_optional(&mut *tx)
            .await
            .context("submit_listing game lookup failed")?;
        if exists.is_none() {
            return Err(MarketError::validation(format!("unknown game id {game_id}")).into());
        }
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        insert into listings (seller_id, title, description, price_cents, status, image_url, game_id)
        values ($1, $2, $3, $4, $5, $6, $7)
        returning id
        "#,
    )
    .bind(seller_id)
    .bind(&draft.title)
    .bind(&draft.description)
    .bind(draft.price.raw())
    .bind(status.as_str())
    .bind(&draft.image_url)
    .bind(draft.game_id)
    .fetch_one(&mut *tx)
    .await
    .context("submit_listing insert failed")?;

    tx.commit().await.context("submit_listing commit failed")?;
    tracing::info!(listing_id = id, seller_id, status = %status, "listing submitted");

    fetch_listing(pool, id).await
}

pub async fn fetch_listing(pool: &PgPool, listing_id: i64) -> Result<Listing> {
    let row = sqlx::query(&format!("{LISTING_SELECT} where l.id = $1"))
        .bind(listing_id)
        .fetch_optional(pool)
        .await
        .context("fetch_listing failed")?;

    match row {
        Some(r) => listing_from_row(&r),
        None => Err(listing_not_found(listing_id)),
    }
}

/// One listing as an anonymous visitor may see it. Pending, sold and deleted
/// listings, and listings of banned sellers, are reported as not found.
pub async fn fetch_public_listing(pool: &PgPool, listing_id: i64) -> Result<Listing> {
    let row = sqlx::query(&format!(
        r#"{LISTING_SELECT}
        where l.id = $1
          and l.status in ('approved', 'available')
          and not a.banned
        "#
    ))
    .bind(listing_id)
    .fetch_optional(pool)
    .await
    .context("fetch_public_listing failed")?;

    match row {
        Some(r) => listing_from_row(&r),
        None => Err(listing_not_found(listing_id)),
    }
}

/// Publicly visible listings (approved or available) of non-banned sellers,
/// newest first, optionally restricted to one game.
pub async fn list_public(pool: &PgPool, game_id: Option<i64>) -> Result<Vec<Listing>> {
    let rows = sqlx::query(&format!(
        r#"{LISTING_SELECT}
        where l.status in ('approved', 'available')
          and not a.banned
          and ($1::bigint is null or l.game_id = $1)
        order by l.created_at desc, l.id desc
        "#
    ))
    .bind(game_id)
    .fetch_all(pool)
    .await
    .context("list_public failed")?;

    rows.iter().map(listing_from_row).collect()
}

/// Moderation queue, oldest first.
pub async fn list_pending(pool: &PgPool) -> Result<Vec<Listing>> {
    let rows = sqlx::query(&format!(
        "{LISTING_SELECT} where l.status = 'pending' order by l.created_at asc, l.id asc"
    ))
    .fetch_all(pool)
    .await
    .context("list_pending failed")?;

    rows.iter().map(listing_from_row).collect()
}

/// Lock a listing row and return its current status.
pub(crate) async fn lock_listing_status(
    tx: &mut Transaction<'_, Postgres>,
    listing_id: i64,
) -> Result<ListingStatus> {
    let status: Option<String> =
        sqlx::query_scalar("select status from listings where id = $1 for update")
            .bind(listing_id)
            .fetch_optional(&mut **tx)
            .await
            .context("listing row lock failed")?;

    match status {
        Some(s) => Ok(ListingStatus::parse(&s)?),
        None => Err(listing_not_found(listing_id)),
    }
}

async fn moderate(pool: &PgPool, listing_id: i64, action: ListingAction) -> Result<ListingOutcome> {
    let mut tx = pool.begin().await.context("moderate begin failed")?;

    let from = lock_listing_status(&mut tx, listing_id).await?;
    let outcome = from.apply(action)?;

    match outcome {
        ListingOutcome::Becomes(to) => {
            sqlx::query("update listings set status = $2 where id = $1")
                .bind(listing_id)
                .bind(to.as_str())
                .execute(&mut *tx)
                .await
                .context("moderate status update failed")?;
        }
        ListingOutcome::Deleted => {
            sqlx::query("delete from listings where id = $1")
                .bind(listing_id)
                .execute(&mut *tx)
                .await
                .context("moderate delete failed")?;
        }
    }

    tx.commit().await.context("moderate commit failed")?;
    tracing::info!(listing_id, action = action.as_str(), from = %from, "listing moderated");
    Ok(outcome)
}

/// `pending -> approved`.
pub async fn approve_listing(pool: &PgPool, listing_id: i64) -> Result<Listing> {
    moderate(pool, listing_id, ListingAction::Approve).await?;
    fetch_listing(pool, listing_id).await
}

/// Deny a pending listing; the row is deleted.
pub async fn deny_listing(pool: &PgPool, listing_id: i64) -> Result<()> {
    moderate(pool, listing_id, ListingAction::Deny).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Games
// ---------------------------------------------------------------------------

pub async fn list_games(pool: &PgPool) -> Result<Vec<Game>> {
    let rows = sqlx::query("select id, name, icon_url from games order by name asc")
        .fetch_all(pool)
        .await
        .context("list_games failed")?;

    rows.iter()
        .map(|r| {
            Ok(Game {
                id: r.try_get("id")?,
                name: r.try_get("name")?,
                icon_url: r.try_get("icon_url")?,
            })
        })
        .collect()
}

pub async fn create_game(pool: &PgPool, name: &str, icon_url: Option<&str>) -> Result<Game> {
    let name = name.trim();
    if name.is_empty() {
        return Err(MarketError::validation("game name must not be empty").into());
    }
    let icon_url = icon_url.map(str::trim).filter(|s| !s.is_empty());

    let res = sqlx::query("insert into games (name, icon_url) values ($1, $2) returning id")
        .bind(name)
        .bind(icon_url)
        .fetch_one(pool)
        .await;

    match res {
        Ok(row) => Ok(Game {
            id: row.try_get("id")?,
            name: name.to_string(),
            icon_url: icon_url.map(str::to_string),
        }),
        Err(e) if is_unique_constraint_violation(&e, "uq_games_name") => {
            Err(MarketError::validation(format!("game '{name}' already exists")).into())
        }
        Err(e) => Err(anyhow::Error::new(e).context("create_game insert failed")),
    }
}
