//! Command handler modules for mkp-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod admin;
pub mod catalog;
pub mod ledger;

use anyhow::Result;
use mkp_config::secrets::{resolve_secrets, SecretsMode};
use mkp_config::MarketplaceSettings;

// ---------------------------------------------------------------------------
// config-check
// ---------------------------------------------------------------------------

/// Load, validate and summarise a layered config. Secret values are never
/// printed; only whether each one resolved.
pub fn config_check(paths: &[String]) -> Result<()> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = mkp_config::load_layered_yaml(&path_refs)?;
    let settings = MarketplaceSettings::from_config_json(&loaded.config_json)?;
    let secrets = resolve_secrets(&loaded.config_json, SecretsMode::Tooling)?;

    println!("config_hash={}", loaded.config_hash);
    println!("moderation={}", settings.moderation);
    println!("platform_fee_bps={}", settings.fees.bps());
    println!("fulfillment={}", settings.fulfillment.as_str());
    println!("currency={}", settings.currency);
    println!("payout_methods={}", settings.payout_methods.join(","));
    println!(
        "identity_client_secret={}",
        resolved(secrets.identity_client_secret.is_some())
    );
    println!(
        "payments_secret_key={}",
        resolved(secrets.payments_secret_key.is_some())
    );
    println!(
        "admin_credential={}",
        resolved(secrets.admin_credential.is_some())
    );
    Ok(())
}

fn resolved(present: bool) -> &'static str {
    if present {
        "resolved"
    } else {
        "MISSING"
    }
}
