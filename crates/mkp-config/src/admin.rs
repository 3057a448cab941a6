//! Admin credential: PBKDF2-HMAC-SHA256, compared in constant time.
//!
//! The stored form is `pbkdf2-sha256$<rounds>$<salt_hex>$<digest_hex>` and
//! lives in the env var named by `admin.password_hash_env`. Operators produce
//! it with `mkp admin hash-password`.

use anyhow::{anyhow, bail, Context, Result};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Minimum salt length in bytes accepted by [`AdminCredential::parse`].
pub const MIN_SALT_BYTES: usize = 8;

/// Work factor for newly derived credentials.
pub const DEFAULT_ROUNDS: u32 = 600_000;
/// Stored credentials below this work factor are refused.
pub const MIN_ROUNDS: u32 = 10_000;

const SCHEME: &str = "pbkdf2-sha256";
const DIGEST_BYTES: usize = 32;

#[derive(Clone)]
pub struct AdminCredential {
    rounds: u32,
    salt: Vec<u8>,
    digest: Vec<u8>,
}

impl std::fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredential")
            .field("salt", &"<REDACTED>")
            .field("digest", &"<REDACTED>")
            .finish()
    }
}

impl AdminCredential {
    /// Parse the `pbkdf2-sha256$<rounds>$<salt_hex>$<digest_hex>` form.
    pub fn parse(stored: &str) -> Result<Self> {
        let mut parts = stored.trim().split('$');
        let (Some(scheme), Some(rounds), Some(salt_hex), Some(digest_hex), None) =
            (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
        else {
            bail!("ADMIN_CREDENTIAL_INVALID: expected '{SCHEME}$<rounds>$<salt_hex>$<digest_hex>'");
        };
        if scheme != SCHEME {
            bail!("ADMIN_CREDENTIAL_INVALID: unsupported scheme '{scheme}'");
        }
        let rounds: u32 = rounds
            .parse()
            .map_err(|_| anyhow!("ADMIN_CREDENTIAL_INVALID: rounds is not a number"))?;
        check_rounds(rounds).context("ADMIN_CREDENTIAL_INVALID")?;

        let salt = hex::decode(salt_hex).context("ADMIN_CREDENTIAL_INVALID: salt is not hex")?;
        if salt.len() < MIN_SALT_BYTES {
            bail!("ADMIN_CREDENTIAL_INVALID: salt must be at least {MIN_SALT_BYTES} bytes");
        }
        let digest =
            hex::decode(digest_hex).context("ADMIN_CREDENTIAL_INVALID: digest is not hex")?;
        if digest.len() != DIGEST_BYTES {
            bail!("ADMIN_CREDENTIAL_INVALID: digest must be {DIGEST_BYTES} bytes");
        }
        Ok(Self { rounds, salt, digest })
    }

    /// Derive a credential at [`DEFAULT_ROUNDS`].
    pub fn derive(salt: &[u8], password: &str) -> Result<Self> {
        Self::derive_with_rounds(salt, password, DEFAULT_ROUNDS)
    }

    pub fn derive_with_rounds(salt: &[u8], password: &str, rounds: u32) -> Result<Self> {
        if salt.len() < MIN_SALT_BYTES {
            bail!("salt must be at least {MIN_SALT_BYTES} bytes");
        }
        if password.is_empty() {
            bail!("admin password must not be empty");
        }
        check_rounds(rounds)?;
        Ok(Self {
            rounds,
            salt: salt.to_vec(),
            digest: stretch(salt, password, rounds).to_vec(),
        })
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Stored form, suitable for the admin password env var.
    pub fn encode(&self) -> String {
        format!(
            "{SCHEME}${}${}${}",
            self.rounds,
            hex::encode(&self.salt),
            hex::encode(&self.digest)
        )
    }

    /// CPU-bound for the full work factor; async callers should run it off
    /// the reactor.
    pub fn verify(&self, candidate: &str) -> bool {
        let computed = stretch(&self.salt, candidate, self.rounds);
        computed.as_slice().ct_eq(self.digest.as_slice()).into()
    }
}

fn check_rounds(rounds: u32) -> Result<()> {
    if rounds < MIN_ROUNDS {
        bail!("rounds must be at least {MIN_ROUNDS}, got {rounds}");
    }
    Ok(())
}

fn stretch(salt: &[u8], password: &str, rounds: u32) -> [u8; DIGEST_BYTES] {
    let mut out = [0u8; DIGEST_BYTES];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut out);
    out
}
