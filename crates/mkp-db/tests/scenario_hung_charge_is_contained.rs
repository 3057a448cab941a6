use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mkp_ledger::{Cents, FeeSchedule, FulfillmentPolicy, ListingDraft, ListingStatus, MarketError, WithdrawalDraft};
use mkp_providers::{ChargeReceipt, ChargeRequest, Identity, MerchantLink, PaymentProcessor, ProviderError};
use uuid::Uuid;

/// `hang` never answers; otherwise the charge succeeds after `delay`.
/// `started` flips once a charge is in flight.
struct StallingProcessor {
    hang: bool,
    delay: Duration,
    started: AtomicBool,
    charges: AtomicUsize,
}

impl StallingProcessor {
    fn hanging() -> Self {
        Self {
            hang: true,
            delay: Duration::ZERO,
            started: AtomicBool::new(false),
            charges: AtomicUsize::new(0),
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            hang: false,
            delay,
            started: AtomicBool::new(false),
            charges: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl PaymentProcessor for StallingProcessor {
    fn name(&self) -> &'static str {
        "stalling"
    }

    async fn charge(&self, _req: ChargeRequest) -> Result<ChargeReceipt, ProviderError> {
        self.charges.fetch_add(1, Ordering::SeqCst);
        self.started.store(true, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.delay).await;
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

async fn listing_for_sale(pool: &sqlx::PgPool, seller: i64, title: &str) -> anyhow::Result<i64> {
    let listing = mkp_db::submit_listing(
        pool,
        seller,
        ListingDraft {
            title: title.to_string(),
            price: Cents::units(100),
            description: None,
            image_url: None,
            game_id: None,
        },
        false,
    )
    .await?;
    Ok(listing.id)
}

fn terms(charge_timeout: Duration) -> anyhow::Result<mkp_db::PurchaseTerms> {
    Ok(mkp_db::PurchaseTerms {
        fees: FeeSchedule::from_bps(1500)?,
        fulfillment: FulfillmentPolicy::DirectCredit,
        currency: "usd".to_string(),
        charge_timeout,
    })
}

/// With a pool of two, two purchases against a processor that never answers
/// fail with PaymentFailed once the charge timeout passes, hand their
/// connections back, and leave both listings on sale. An unrelated read
/// afterwards is served promptly.
///
/// DB-backed test. Skips if MKP_DATABASE_URL is not set.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hung_processor_fails_purchase_and_frees_the_pool() -> anyhow::Result<()> {
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
    let first = listing_for_sale(&pool, seller, "Hung charge one").await?;
    let second = listing_for_sale(&pool, seller, "Hung charge two").await?;

    let processor = Arc::new(StallingProcessor::hanging());
    let terms = Arc::new(terms(Duration::from_millis(300))?);

    let mut handles = Vec::new();
    for listing_id in [first, second] {
        let pool = pool.clone();
        let processor = Arc::clone(&processor);
        let terms = Arc::clone(&terms);
        handles.push(tokio::spawn(async move {
            mkp_db::purchase(&pool, processor.as_ref(), &terms, listing_id, buyer, "tok_visa").await
        }));
    }

    for h in handles {
        let err = tokio::time::timeout(Duration::from_secs(5), h)
            .await
            .expect("purchase must give up at the charge timeout")?
            .unwrap_err();
        match err.downcast_ref::<MarketError>() {
            Some(MarketError::PaymentFailed(detail)) => assert!(detail.contains("timed out"), "got {detail}"),
            other => panic!("expected PaymentFailed, got {other:?}"),
        }
    }
    assert_eq!(processor.charges.load(Ordering::SeqCst), 2);

    let public = tokio::time::timeout(Duration::from_secs(5), mkp_db::list_public(&pool, None))
        .await
        .expect("pool must be free after timed out charges")?;
    assert!(public.iter().any(|l| l.id == first));

    for id in [first, second] {
        assert_eq!(mkp_db::fetch_listing(&pool, id).await?.status, ListingStatus::Available);
    }
    assert_eq!(mkp_db::fetch_account(&pool, seller).await?.balance, Cents::ZERO);
    assert!(mkp_db::list_purchases(&pool, buyer).await?.is_empty());

    mkp_db::delete_account(&pool, seller).await?;
    mkp_db::delete_account(&pool, buyer).await?;
    Ok(())
}

/// While a charge for one of the seller's listings is in flight, the seller
/// can still withdraw existing balance: the withdrawal does not queue behind
/// the purchase's lock on the seller row. Both then settle and the ledger
/// balances.
///
/// DB-backed test. Skips if MKP_DATABASE_URL is not set.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn withdrawal_proceeds_while_charge_in_flight() -> anyhow::Result<()> {
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
    let buyer = new_account(&pool, "buyer").await?;
    let sold_earlier = listing_for_sale(&pool, seller, "Sold earlier").await?;
    let on_sale = listing_for_sale(&pool, seller, "Selling now").await?;

    let quick = StallingProcessor::slow(Duration::ZERO);
    mkp_db::purchase(&pool, &quick, &terms(Duration::from_secs(5))?, sold_earlier, buyer, "tok_visa").await?;
    assert_eq!(mkp_db::fetch_account(&pool, seller).await?.balance, Cents::units(85));

    let slow = Arc::new(StallingProcessor::slow(Duration::from_secs(2)));
    let in_flight = {
        let pool = pool.clone();
        let slow = Arc::clone(&slow);
        let terms = terms(Duration::from_secs(10))?;
        tokio::spawn(async move {
            mkp_db::purchase(&pool, slow.as_ref(), &terms, on_sale, buyer, "tok_visa").await
        })
    };
    while !slow.started.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let withdrawal = tokio::time::timeout(
        Duration::from_millis(1500),
        mkp_db::request_withdrawal(
            &pool,
            seller,
            WithdrawalDraft {
                amount: Cents::units(85),
                method: "paypal".to_string(),
                destination: "seller@example.com".to_string(),
            },
            &["paypal".to_string()],
        ),
    )
    .await
    .expect("withdrawal must not wait for the in-flight charge")?;
    assert_eq!(withdrawal.amount, Cents::units(85));

    in_flight.await??;
    assert_eq!(mkp_db::fetch_account(&pool, seller).await?.balance, Cents::units(85));
    let check = mkp_db::ledger_check(&pool, seller).await?;
    assert!(check.is_consistent(), "ledger drift: {check:?}");

    mkp_db::delete_account(&pool, seller).await?;
    mkp_db::delete_account(&pool, buyer).await?;
    Ok(())
}
