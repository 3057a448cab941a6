//! Typed view over the merged configuration.
//!
//! Every key is optional; absent keys take the defaults below. Values of the
//! wrong type are errors, not silently defaulted.
//!
//! ```yaml
//! marketplace:
//!   moderation: true              # new listings start pending
//!   platform_fee_bps: 1500        # 15%
//!   currency: usd
//!   fulfillment: direct_credit    # or connected_account
//!   payout_methods: [paypal, bank_transfer, crypto]
//!   charge_timeout_secs: 20       # card charge gives up after this
//! identity:
//!   client_id: "..."
//!   redirect_uri: "http://127.0.0.1:8080/v1/auth/callback"
//!   client_secret_env: MKP_IDENTITY_CLIENT_SECRET
//! payments:
//!   client_id: "ca_..."
//!   onboarding_redirect_uri: "http://127.0.0.1:8080/v1/payouts/callback"
//!   secret_key_env: MKP_PAYMENTS_SECRET_KEY
//! admin:
//!   password_hash_env: MKP_ADMIN_PASSWORD_HASH
//! server:
//!   cors_origins: ["http://localhost:5173"]
//!   session_max_age_secs: 604800  # bearer tokens expire after 7 days
//! ```

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use serde_json::Value;

use mkp_ledger::purchase::DEFAULT_FEE_BPS;
use mkp_ledger::{FeeSchedule, FulfillmentPolicy};

pub const DEFAULT_CURRENCY: &str = "usd";
pub const DEFAULT_PAYOUT_METHODS: &[&str] = &["paypal", "bank_transfer", "crypto"];
pub const DEFAULT_CHARGE_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_SESSION_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct MarketplaceSettings {
    pub moderation: bool,
    pub fees: FeeSchedule,
    pub currency: String,
    pub fulfillment: FulfillmentPolicy,
    pub payout_methods: Vec<String>,
    pub charge_timeout: Duration,
    pub identity_client_id: String,
    pub identity_redirect_uri: String,
    pub payments_client_id: String,
    pub payments_onboarding_redirect_uri: String,
    pub cors_origins: Vec<String>,
    pub session_max_age: Duration,
}

impl Default for MarketplaceSettings {
    fn default() -> Self {
        Self {
            moderation: true,
            fees: FeeSchedule::default(),
            currency: DEFAULT_CURRENCY.to_string(),
            fulfillment: FulfillmentPolicy::DirectCredit,
            payout_methods: DEFAULT_PAYOUT_METHODS.iter().map(|s| s.to_string()).collect(),
            charge_timeout: Duration::from_secs(DEFAULT_CHARGE_TIMEOUT_SECS),
            identity_client_id: String::new(),
            identity_redirect_uri: "http://127.0.0.1:8080/v1/auth/callback".to_string(),
            payments_client_id: String::new(),
            payments_onboarding_redirect_uri: "http://127.0.0.1:8080/v1/payouts/callback"
                .to_string(),
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            session_max_age: Duration::from_secs(DEFAULT_SESSION_MAX_AGE_SECS),
        }
    }
}

impl MarketplaceSettings {
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let d = Self::default();

        let fee_bps = match cfg.pointer("/marketplace/platform_fee_bps") {
            None | Some(Value::Null) => DEFAULT_FEE_BPS,
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| anyhow!("CONFIG_INVALID /marketplace/platform_fee_bps must be a non-negative integer"))?,
        };
        let fees = FeeSchedule::from_bps(fee_bps)
            .map_err(|e| anyhow!("CONFIG_INVALID /marketplace/platform_fee_bps: {e}"))?;

        let fulfillment = match read_string(cfg, "/marketplace/fulfillment")? {
            None => d.fulfillment,
            Some(s) => FulfillmentPolicy::parse(&s)
                .map_err(|e| anyhow!("CONFIG_INVALID /marketplace/fulfillment: {e}"))?,
        };

        let payout_methods = read_string_list(cfg, "/marketplace/payout_methods")?
            .map(|v| v.into_iter().map(|m| m.to_ascii_lowercase()).collect::<Vec<_>>())
            .unwrap_or(d.payout_methods);
        if payout_methods.is_empty() {
            bail!("CONFIG_INVALID /marketplace/payout_methods must not be empty");
        }

        Ok(Self {
            moderation: read_bool(cfg, "/marketplace/moderation")?.unwrap_or(d.moderation),
            fees,
            currency: read_string(cfg, "/marketplace/currency")?
                .map(|c| c.to_ascii_lowercase())
                .unwrap_or(d.currency),
            fulfillment,
            payout_methods,
            charge_timeout: read_secs(cfg, "/marketplace/charge_timeout_secs")?
                .unwrap_or(d.charge_timeout),
            identity_client_id: read_string(cfg, "/identity/client_id")?
                .unwrap_or(d.identity_client_id),
            identity_redirect_uri: read_string(cfg, "/identity/redirect_uri")?
                .unwrap_or(d.identity_redirect_uri),
            payments_client_id: read_string(cfg, "/payments/client_id")?
                .unwrap_or(d.payments_client_id),
            payments_onboarding_redirect_uri: read_string(cfg, "/payments/onboarding_redirect_uri")?
                .unwrap_or(d.payments_onboarding_redirect_uri),
            cors_origins: read_string_list(cfg, "/server/cors_origins")?.unwrap_or(d.cors_origins),
            session_max_age: read_secs(cfg, "/server/session_max_age_secs")?
                .unwrap_or(d.session_max_age),
        })
    }
}

fn read_bool(cfg: &Value, pointer: &str) -> Result<Option<bool>> {
    match cfg.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => bail!("CONFIG_INVALID {pointer} must be a boolean"),
    }
}

/// Positive whole seconds.
fn read_secs(cfg: &Value, pointer: &str) -> Result<Option<Duration>> {
    match cfg.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) if n > 0 => Ok(Some(Duration::from_secs(n))),
            _ => bail!("CONFIG_INVALID {pointer} must be a positive integer"),
        },
    }
}

fn read_string(cfg: &Value, pointer: &str) -> Result<Option<String>> {
    match cfg.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => bail!("CONFIG_INVALID {pointer} must be a string"),
    }
}

fn read_string_list(cfg: &Value, pointer: &str) -> Result<Option<Vec<String>>> {
    match cfg.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(|s| s.trim().to_string())
                    .ok_or_else(|| anyhow!("CONFIG_INVALID {pointer} must be a list of strings"))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some),
        Some(_) => bail!("CONFIG_INVALID {pointer} must be a list of strings"),
    }
}
