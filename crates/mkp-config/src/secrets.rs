//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g. `"MKP_PAYMENTS_SECRET_KEY"`).
//! - At startup, callers invoke [`resolve_secrets`] once and pass the result
//!   into constructors; no other module calls `std::env::var` for secrets.
//! - `Debug` impls on secret-containing structs redact values.
//! - Error messages reference the env var NAME, never the value.
//!
//! # Mode-aware enforcement
//! - `Serve`:   identity client secret, payments secret key and admin
//!              credential are **required**.
//! - `Tooling`: nothing is required (CLI commands that only touch the DB).

use anyhow::{bail, Result};
use serde_json::Value;

use crate::admin::AdminCredential;

pub const DEFAULT_IDENTITY_SECRET_ENV: &str = "MKP_IDENTITY_CLIENT_SECRET";
pub const DEFAULT_PAYMENTS_SECRET_ENV: &str = "MKP_PAYMENTS_SECRET_KEY";
pub const DEFAULT_ADMIN_HASH_ENV: &str = "MKP_ADMIN_PASSWORD_HASH";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretsMode {
    Serve,
    Tooling,
}

/// All runtime-resolved secrets for one process.
#[derive(Clone)]
pub struct ResolvedSecrets {
    pub identity_client_secret: Option<String>,
    pub payments_secret_key: Option<String>,
    pub admin_credential: Option<AdminCredential>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "identity_client_secret",
                &self.identity_client_secret.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "payments_secret_key",
                &self.payments_secret_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "admin_credential",
                &self.admin_credential.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

struct SecretEnvNames {
    identity_client_secret_var: String,
    payments_secret_key_var: String,
    admin_hash_var: String,
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        identity_client_secret_var: read_str_at(config_json, "/identity/client_secret_env")
            .unwrap_or_else(|| DEFAULT_IDENTITY_SECRET_ENV.to_string()),
        payments_secret_key_var: read_str_at(config_json, "/payments/secret_key_env")
            .unwrap_or_else(|| DEFAULT_PAYMENTS_SECRET_ENV.to_string()),
        admin_hash_var: read_str_at(config_json, "/admin/password_hash_env")
            .unwrap_or_else(|| DEFAULT_ADMIN_HASH_ENV.to_string()),
    }
}

/// Resolve all secrets from the environment.
///
/// # Errors
/// In `Serve` mode, the **name** of the first missing variable. A present but
/// malformed admin credential is an error in every mode.
pub fn resolve_secrets(config_json: &Value, mode: SecretsMode) -> Result<ResolvedSecrets> {
    let names = parse_env_names(config_json);

    let identity_client_secret = resolve_env(&names.identity_client_secret_var);
    let payments_secret_key = resolve_env(&names.payments_secret_key_var);
    let admin_credential = match resolve_env(&names.admin_hash_var) {
        Some(raw) => Some(AdminCredential::parse(&raw).map_err(|e| {
            anyhow::anyhow!("{e} (from env var '{}')", names.admin_hash_var)
        })?),
        None => None,
    };

    if mode == SecretsMode::Serve {
        if identity_client_secret.is_none() {
            bail!(
                "SECRETS_MISSING: required env var '{}' (identity client secret) is not set or empty",
                names.identity_client_secret_var
            );
        }
        if payments_secret_key.is_none() {
            bail!(
                "SECRETS_MISSING: required env var '{}' (payments secret key) is not set or empty",
                names.payments_secret_key_var
            );
        }
        if admin_credential.is_none() {
            bail!(
                "SECRETS_MISSING: required env var '{}' (admin password hash) is not set or empty",
                names.admin_hash_var
            );
        }
    }

    Ok(ResolvedSecrets {
        identity_client_secret,
        payments_secret_key,
        admin_credential,
    })
}
