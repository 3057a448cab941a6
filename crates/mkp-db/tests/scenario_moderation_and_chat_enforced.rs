use std::time::Duration;

use mkp_ledger::{Cents, FeeSchedule, FulfillmentPolicy, ListingDraft, ListingStatus, MarketError};
use mkp_providers::{ChargeReceipt, ChargeRequest, Identity, MerchantLink, PaymentProcessor, ProviderError};
use uuid::Uuid;

struct ApprovingProcessor;

#[async_trait::async_trait]
impl PaymentProcessor for ApprovingProcessor {
    fn name(&self) -> &'static str {
        "approving"
    }

    async fn charge(&self, _req: ChargeRequest) -> Result<ChargeReceipt, ProviderError> {
        Ok(ChargeReceipt {
            confirmation_id: format!("ch_{}", Uuid::new_v4().simple()),
        })
    }

    fn onboarding_url(&self, _state: &str) -> Result<String, ProviderError> {
        Ok("http://onboarding.invalid".to_string())
    }

    async fn exchange_onboarding_code(&self, _code: &str) -> Result<MerchantLink, ProviderError> {
        Err(ProviderError::Config("not used".to_string()))
    }
}

async fn new_account(pool: &sqlx::PgPool, name: &str) -> anyhow::Result<i64> {
    let id = (Uuid::new_v4().as_u128() as i64) & i64::MAX;
    mkp_db::upsert_account_on_login(
        pool,
        &Identity {
            id,
            username: format!("{name}_{id}"),
            avatar: None,
        },
    )
    .await?;
    Ok(id)
}

fn draft(title: &str) -> ListingDraft {
    ListingDraft {
        title: title.to_string(),
        price: Cents::units(10),
        description: None,
        image_url: None,
        game_id: None,
    }
}

fn kind(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<MarketError>().map(|e| e.kind()).unwrap_or("internal")
}

/// Moderation state machine, ban effects and public visibility.
///
/// DB-backed test. Skips if MKP_DATABASE_URL is not set.
#[tokio::test]
async fn moderation_lifecycle_and_ban_enforced() -> anyhow::Result<()> {
    let url = match std::env::var(mkp_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: MKP_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    mkp_db::migrate(&pool).await?;

    let seller = new_account(&pool, "seller").await?;

    // Moderated submission starts pending and is not public.
    let a = mkp_db::submit_listing(&pool, seller, draft("Skin A"), true).await?;
    let b = mkp_db::submit_listing(&pool, seller, draft("Skin B"), true).await?;
    assert_eq!(a.status, ListingStatus::Pending);
    let public = mkp_db::list_public(&pool, None).await?;
    assert!(!public.iter().any(|l| l.id == a.id));

    let pending = mkp_db::list_pending(&pool).await?;
    let pos_a = pending.iter().position(|l| l.id == a.id);
    let pos_b = pending.iter().position(|l| l.id == b.id);
    assert!(pos_a.is_some() && pos_a < pos_b, "pending queue is oldest first");

    // pending -> approved, once.
    let approved = mkp_db::approve_listing(&pool, a.id).await?;
    assert_eq!(approved.status, ListingStatus::Approved);
    let err = mkp_db::approve_listing(&pool, a.id).await.unwrap_err();
    assert_eq!(kind(&err), "invalid_state_transition");
    let err = mkp_db::deny_listing(&pool, a.id).await.unwrap_err();
    assert_eq!(kind(&err), "invalid_state_transition");
    assert!(mkp_db::list_public(&pool, None).await?.iter().any(|l| l.id == a.id));

    // Denial deletes.
    mkp_db::deny_listing(&pool, b.id).await?;
    let err = mkp_db::fetch_listing(&pool, b.id).await.unwrap_err();
    assert_eq!(kind(&err), "not_found");

    // Approved listings are not purchasable.
    let buyer = new_account(&pool, "buyer").await?;
    let terms = mkp_db::PurchaseTerms {
        fees: FeeSchedule::default(),
        fulfillment: FulfillmentPolicy::DirectCredit,
        currency: "usd".to_string(),
        charge_timeout: Duration::from_secs(5),
    };
    let err = mkp_db::purchase(&pool, &ApprovingProcessor, &terms, a.id, buyer, "tok")
        .await
        .unwrap_err();
    assert_eq!(kind(&err), "not_purchasable");

    // Bad input.
    let err = mkp_db::submit_listing(&pool, seller, draft("   "), true).await.unwrap_err();
    assert_eq!(kind(&err), "validation");
    let mut zero = draft("free");
    zero.price = Cents::ZERO;
    let err = mkp_db::submit_listing(&pool, seller, zero, true).await.unwrap_err();
    assert_eq!(kind(&err), "validation");
    let mut unknown_game = draft("with game");
    unknown_game.game_id = Some(-1);
    let err = mkp_db::submit_listing(&pool, seller, unknown_game, true).await.unwrap_err();
    assert_eq!(kind(&err), "validation");

    // Banning hides listings, blocks submission and login, revokes sessions.
    let token = mkp_db::create_session(&pool, seller).await?;
    mkp_db::ban_account(&pool, seller).await?;
    assert!(mkp_db::resolve_session(&pool, token, Duration::from_secs(3600)).await?.is_none());
    assert!(!mkp_db::list_public(&pool, None).await?.iter().any(|l| l.id == a.id));
    let err = mkp_db::submit_listing(&pool, seller, draft("Skin C"), false).await.unwrap_err();
    assert_eq!(kind(&err), "forbidden");
    let err = mkp_db::upsert_account_on_login(
        &pool,
        &Identity {
            id: seller,
            username: "renamed".to_string(),
            avatar: None,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(kind(&err), "forbidden");

    mkp_db::unban_account(&pool, seller).await?;
    assert!(mkp_db::list_public(&pool, None).await?.iter().any(|l| l.id == a.id));

    mkp_db::delete_account(&pool, seller).await?;
    let err = mkp_db::fetch_listing(&pool, a.id).await.unwrap_err();
    assert_eq!(kind(&err), "not_found");
    mkp_db::delete_account(&pool, buyer).await?;
    Ok(())
}

/// Only the buyer and seller of a purchase can read or post in its chat, and
/// the conversation survives deletion of the buyer's account.
///
/// DB-backed test. Skips if MKP_DATABASE_URL is not set.
#[tokio::test]
async fn chat_is_restricted_to_participants() -> anyhow::Result<()> {
    let url = match std::env::var(mkp_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: MKP_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    mkp_db::migrate(&pool).await?;

    let seller = new_account(&pool, "seller").await?;
    let buyer = new_account(&pool, "buyer").await?;
    let outsider = new_account(&pool, "outsider").await?;

    let listing = mkp_db::submit_listing(&pool, seller, draft("Coaching hour"), false).await?;
    let terms = mkp_db::PurchaseTerms {
        fees: FeeSchedule::default(),
        fulfillment: FulfillmentPolicy::DirectCredit,
        currency: "usd".to_string(),
        charge_timeout: Duration::from_secs(5),
    };
    let p = mkp_db::purchase(&pool, &ApprovingProcessor, &terms, listing.id, buyer, "tok").await?;
    assert_eq!(mkp_db::list_purchases(&pool, seller).await?.len(), 1);
    assert_eq!(mkp_db::list_purchases(&pool, buyer).await?.len(), 1);

    mkp_db::post_message(&pool, p.id, buyer, "hi, when can we start?").await?;
    mkp_db::post_message(&pool, p.id, seller, "tonight").await?;

    let err = mkp_db::post_message(&pool, p.id, outsider, "let me in").await.unwrap_err();
    assert_eq!(kind(&err), "forbidden");
    let err = mkp_db::list_messages(&pool, p.id, outsider).await.unwrap_err();
    assert_eq!(kind(&err), "forbidden");
    let err = mkp_db::post_message(&pool, p.id, buyer, "   ").await.unwrap_err();
    assert_eq!(kind(&err), "validation");

    let history = mkp_db::list_messages(&pool, p.id, seller).await?;
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hi, when can we start?", "tonight"]);

    // Deleting the buyer keeps the purchase and its credit for the seller.
    mkp_db::delete_account(&pool, buyer).await?;
    let kept = mkp_db::fetch_purchase(&pool, p.id).await?;
    assert_eq!(kept.buyer_id, None);
    assert!(mkp_db::ledger_check(&pool, seller).await?.is_consistent());

    // The seller still has the whole conversation; the buyer's lines lose
    // their author but not their content.
    let history = mkp_db::list_messages(&pool, p.id, seller).await?;
    let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hi, when can we start?", "tonight"]);
    assert_eq!(history[0].sender_id, None);
    assert_eq!(history[0].sender_username, None);
    assert_eq!(history[1].sender_id, Some(seller));

    mkp_db::delete_account(&pool, seller).await?;
    mkp_db::delete_account(&pool, outsider).await?;
    Ok(())
}
