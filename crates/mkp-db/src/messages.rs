//! Per-purchase chat between buyer and seller.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use mkp_ledger::{validate_content, MarketError, Participants};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: i64,
    pub purchase_id: i64,
    /// `None` once the sender's account has been deleted.
    pub sender_id: Option<i64>,
    pub sender_username: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

fn message_from_row(row: &PgRow) -> Result<Message> {
    Ok(Message {
        id: row.try_get("id")?,
        purchase_id: row.try_get("purchase_id")?,
        sender_id: row.try_get("sender_id")?,
        sender_username: row.try_get("sender_username")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn participants(pool: &PgPool, purchase_id: i64) -> Result<Participants> {
    let row = sqlx::query("select buyer_id, seller_id from purchases where id = $1")
        .bind(purchase_id)
        .fetch_optional(pool)
        .await
        .context("purchase participants lookup failed")?;

    match row {
        Some(r) => Ok(Participants {
            buyer_id: r.try_get("buyer_id")?,
            seller_id: r.try_get("seller_id")?,
        }),
        None => Err(MarketError::NotFound {
            entity: "purchase",
            id: purchase_id,
        }
        .into()),
    }
}

/// Append a message. Only the purchase's buyer and seller may post.
pub async fn post_message(
    pool: &PgPool,
    purchase_id: i64,
    sender_id: i64,
    content: &str,
) -> Result<Message> {
    participants(pool, purchase_id).await?.require(sender_id)?;
    let content = validate_content(content)?;

    let row = sqlx::query(
        r#"
        with inserted as (
          insert into messages (purchase_id, sender_id, content)
          values ($1, $2, $3)
          returning id, purchase_id, sender_id, content, created_at
        )
        select i.id, i.purchase_id, i.sender_id, a.username as sender_username,
               i.content, i.created_at
        from inserted i
        join accounts a on a.id = i.sender_id
        "#,
    )
    .bind(purchase_id)
    .bind(sender_id)
    .bind(&content)
    .fetch_one(pool)
    .await
    .context("post_message insert failed")?;

    let message = message_from_row(&row)?;
    tracing::debug!(purchase_id, sender_id, message_id = message.id, "message posted");
    Ok(message)
}

/// Full conversation, oldest first. Only the buyer and seller may read.
pub async fn list_messages(pool: &PgPool, purchase_id: i64, viewer_id: i64) -> Result<Vec<Message>> {
    participants(pool, purchase_id).await?.require(viewer_id)?;

    let rows = sqlx::query(
        r#"
        select m.id, m.purchase_id, m.sender_id, a.username as sender_username,
               m.content, m.created_at
        from messages m
        left join accounts a on a.id = m.sender_id
        where m.purchase_id = $1
        order by m.created_at asc, m.id asc
        "#,
    )
    .bind(purchase_id)
    .fetch_all(pool)
    .await
    .context("list_messages failed")?;

    rows.iter().map(message_from_row).collect()
}
