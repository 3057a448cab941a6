use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mkp_ledger::{Cents, FeeSchedule, FulfillmentPolicy, ListingDraft, ListingStatus, MarketError};
use mkp_providers::{ChargeReceipt, ChargeRequest, Identity, MerchantLink, PaymentProcessor, ProviderError};
use uuid::Uuid;

/// Slow processor: holds each charge long enough for a competing purchase to
/// queue behind the listing lock. Declines when `decline` is set.
struct SlowProcessor {
    decline: bool,
    charges: AtomicUsize,
}

#[async_trait::async_trait]
impl PaymentProcessor for SlowProcessor {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn charge(&self, _req: ChargeRequest) -> Result<ChargeReceipt, ProviderError> {
        self.charges.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        if self.decline {
            return Err(ProviderError::Api {
                code: Some(402),
                message: "card_declined".to_string(),
            });
        }
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

async fn listing_for_sale(pool: &sqlx::PgPool, seller: i64) -> anyhow::Result<i64> {
    let listing = mkp_db::submit_listing(
        pool,
        seller,
        ListingDraft {
            title: "Rare mount".to_string(),
            price: Cents::units(40),
            description: Some("account-bound".to_string()),
            image_url: None,
            game_id: None,
        },
        false,
    )
    .await?;
    Ok(listing.id)
}

fn terms() -> anyhow::Result<mkp_db::PurchaseTerms> {
    Ok(mkp_db::PurchaseTerms {
        fees: FeeSchedule::from_bps(1500)?,
        fulfillment: FulfillmentPolicy::DirectCredit,
        currency: "usd".to_string(),
        charge_timeout: Duration::from_secs(5),
    })
}

/// Two buyers race for one available listing: exactly one purchase settles,
/// the other sees NotPurchasable, and the seller is credited once.
///
/// DB-backed test. Skips if MKP_DATABASE_URL is not set.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_purchases_settle_exactly_once() -> anyhow::Result<()> {
    let url = match std::env::var(mkp_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: MKP_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await?;
    mkp_db::migrate(&pool).await?;

    let seller = new_account(&pool, "seller").await?;
    let buyer_a = new_account(&pool, "buyer_a").await?;
    let buyer_b = new_account(&pool, "buyer_b").await?;
    let listing_id = listing_for_sale(&pool, seller).await?;

    let processor = Arc::new(SlowProcessor {
        decline: false,
        charges: AtomicUsize::new(0),
    });
    let terms = Arc::new(terms()?);

    let mut handles = Vec::new();
    for buyer in [buyer_a, buyer_b] {
        let pool = pool.clone();
        let processor = Arc::clone(&processor);
        let terms = Arc::clone(&terms);
        handles.push(tokio::spawn(async move {
            mkp_db::purchase(&pool, processor.as_ref(), &terms, listing_id, buyer, "tok_visa").await
        }));
    }

    let mut wins = 0;
    let mut refused = 0;
    for h in handles {
        match h.await? {
            Ok(_) => wins += 1,
            Err(e) => {
                assert!(
                    matches!(e.downcast_ref::<MarketError>(), Some(MarketError::NotPurchasable(_))),
                    "loser must see NotPurchasable, got {e:#}"
                );
                refused += 1;
            }
        }
    }
    assert_eq!((wins, refused), (1, 1));
    assert_eq!(processor.charges.load(Ordering::SeqCst), 1, "loser must not be charged");

    let listing = mkp_db::fetch_listing(&pool, listing_id).await?;
    assert_eq!(listing.status, ListingStatus::Sold);
    assert_eq!(mkp_db::fetch_account(&pool, seller).await?.balance, Cents::units(34));
    assert!(mkp_db::ledger_check(&pool, seller).await?.is_consistent());

    for id in [seller, buyer_a, buyer_b] {
        mkp_db::delete_account(&pool, id).await?;
    }
    Ok(())
}

/// A declined charge leaves the listing available and the seller uncredited.
///
/// DB-backed test. Skips if MKP_DATABASE_URL is not set.
#[tokio::test]
async fn declined_charge_changes_nothing() -> anyhow::Result<()> {
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
    let listing_id = listing_for_sale(&pool, seller).await?;

    let processor = SlowProcessor {
        decline: true,
        charges: AtomicUsize::new(0),
    };
    let err = mkp_db::purchase(&pool, &processor, &terms()?, listing_id, buyer, "tok_chargeDeclined")
        .await
        .unwrap_err();
    match err.downcast_ref::<MarketError>() {
        Some(MarketError::PaymentFailed(detail)) => assert!(detail.contains("card_declined")),
        other => panic!("expected PaymentFailed, got {other:?}"),
    }

    let listing = mkp_db::fetch_listing(&pool, listing_id).await?;
    assert_eq!(listing.status, ListingStatus::Available);
    assert_eq!(mkp_db::fetch_account(&pool, seller).await?.balance, Cents::ZERO);
    assert!(mkp_db::list_purchases(&pool, buyer).await?.is_empty());

    mkp_db::delete_account(&pool, seller).await?;
    mkp_db::delete_account(&pool, buyer).await?;
    Ok(())
}
