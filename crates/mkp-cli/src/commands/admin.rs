//! `mkp admin` handlers.

use anyhow::{Context, Result};
use mkp_config::admin::AdminCredential;
use uuid::Uuid;

/// Stored form (`pbkdf2-sha256$<rounds>$<salt_hex>$<digest_hex>`) of
/// `password`. A random 16-byte salt is drawn when `salt_hex` is `None`.
pub fn hash_password(password: &str, salt_hex: Option<&str>, rounds: u32) -> Result<String> {
    let salt = match salt_hex {
        Some(s) => hex::decode(s.trim()).context("--salt must be hex")?,
        None => Uuid::new_v4().as_bytes().to_vec(),
    };
    let credential = AdminCredential::derive_with_rounds(&salt, password, rounds)?;
    Ok(credential.encode())
}
