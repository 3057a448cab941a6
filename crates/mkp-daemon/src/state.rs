//! Shared runtime state for mkp-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Everything here is
//! read-only after boot; all mutable marketplace state lives in Postgres.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use mkp_config::admin::AdminCredential;
use mkp_config::MarketplaceSettings;
use mkp_db::PurchaseTerms;
use mkp_providers::{IdentityProvider, PaymentProcessor};

use crate::oauth_state::StateSigner;

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            service: "mkp-daemon",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared handle across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub db: PgPool,
    pub settings: MarketplaceSettings,
    /// Hash of the merged config the process booted with.
    pub config_hash: String,
    pub identity: Arc<dyn IdentityProvider>,
    pub payments: Arc<dyn PaymentProcessor>,
    /// `None` disables admin login.
    pub admin_credential: Option<AdminCredential>,
    pub oauth_states: StateSigner,
}

impl AppState {
    pub fn new(
        db: PgPool,
        settings: MarketplaceSettings,
        config_hash: String,
        identity: Arc<dyn IdentityProvider>,
        payments: Arc<dyn PaymentProcessor>,
        admin_credential: Option<AdminCredential>,
    ) -> Self {
        Self {
            build: BuildInfo::current(),
            db,
            settings,
            config_hash,
            identity,
            payments,
            admin_credential,
            oauth_states: StateSigner::random(),
        }
    }

    pub fn purchase_terms(&self) -> PurchaseTerms {
        PurchaseTerms {
            fees: self.settings.fees,
            fulfillment: self.settings.fulfillment,
            currency: self.settings.currency.clone(),
            charge_timeout: self.settings.charge_timeout,
        }
    }
}
