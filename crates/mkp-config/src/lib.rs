//! mkp-config
//!
//! Layered YAML configuration for the marketplace service.
//!
//! - Documents are merged in order (earlier = base, later = override).
//! - Literal secrets in YAML are refused; YAML stores env var NAMES only and
//!   [`secrets::resolve_secrets`] reads the values once at startup.
//! - The merged document is canonicalised and hashed so operators can tell
//!   which configuration a process booted with.

pub mod admin;
pub mod secrets;
pub mod settings;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub use settings::MarketplaceSettings;

/// Env var holding a comma-separated list of YAML paths in merge order.
pub const ENV_CONFIG_PATHS: &str = "MKP_CONFIG";

/// Known secret-like prefixes. If any leaf string value in the effective
/// config starts with one of these, loading aborts with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk_live",    // Stripe live secret key
    "sk_test",    // Stripe test secret key
    "rk_live",    // Stripe restricted key
    "rk_test",
    "whsec_",     // Stripe webhook signing secret
    "sk-",        // generic bearer-style keys
    "-----BEGIN", // PEM private keys
    "ghp_",       // GitHub PAT
    "xoxb-",      // Slack bot token
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

/// Read and merge YAML files, earliest first.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("CONFIG_READ_FAILED path={p}")))
        .collect::<Result<Vec<_>>>()?;
    let doc_refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

/// Load the layers named by `MKP_CONFIG`. An unset or blank variable yields
/// an empty config, so every setting falls back to its default.
pub fn load_from_env() -> Result<LoadedConfig> {
    match std::env::var(ENV_CONFIG_PATHS) {
        Ok(v) if !v.trim().is_empty() => {
            let paths: Vec<&str> = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            load_layered_yaml(&paths)
        }
        _ => load_layered_yaml_from_strings(&[]),
    }
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty document parses as null; treat it as "no overrides".
        if v_json.is_null() {
            continue;
        }
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; any other overlay value replaces the base.
fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut into), Value::Object(from)) => {
            for (key, value) in from {
                let merged = match into.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                into.insert(key, merged);
            }
            Value::Object(into)
        }
        (_, replacement) => replacement,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    match find_secret_leaf(v, String::new()) {
        Some(ptr) => bail!("CONFIG_SECRET_DETECTED leaf={ptr} value=REDACTED"),
        None => Ok(()),
    }
}

/// JSON pointer of the first string leaf that looks like a credential.
fn find_secret_leaf(v: &Value, at: String) -> Option<String> {
    match v {
        Value::String(s) if looks_like_secret(s) => Some(at),
        Value::Object(map) => map.iter().find_map(|(k, child)| {
            // RFC 6901 escaping
            let token = k.replace('~', "~0").replace('/', "~1");
            find_secret_leaf(child, format!("{at}/{token}"))
        }),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, child)| find_secret_leaf(child, format!("{at}/{i}"))),
        _ => None,
    }
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}
