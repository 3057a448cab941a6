//! Signed OAuth `state` values.
//!
//! Format: `<subject>.<issued_unix>.<nonce>.<hex hmac-sha256(key, subject.issued.nonce)>`.
//! The key is generated per process, so states do not survive a restart; a
//! user whose login straddles a restart simply starts over. Nothing is stored
//! server-side.
//!
//! The onboarding callback arrives as a plain browser redirect with no bearer
//! token, so the signed subject is what identifies the account there.

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// States older than this are refused.
pub const STATE_MAX_AGE_SECS: i64 = 15 * 60;

/// Subject used for the login flow, where no account exists yet.
pub const LOGIN_SUBJECT: &str = "login";

const ONBOARDING_PREFIX: &str = "payout-";

/// Subject for a merchant onboarding round trip started by `account_id`.
pub fn onboarding_subject(account_id: i64) -> String {
    format!("{ONBOARDING_PREFIX}{account_id}")
}

/// Inverse of [`onboarding_subject`].
pub fn onboarding_account(subject: &str) -> Option<i64> {
    subject.strip_prefix(ONBOARDING_PREFIX)?.parse().ok()
}

#[derive(Clone)]
pub struct StateSigner {
    key: [u8; 32],
}

impl std::fmt::Debug for StateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StateSigner(<REDACTED>)")
    }
}

impl StateSigner {
    pub fn random() -> Self {
        let mut key = [0u8; 32];
        key[..16].copy_from_slice(Uuid::new_v4().as_bytes());
        key[16..].copy_from_slice(Uuid::new_v4().as_bytes());
        Self { key }
    }

    pub fn with_key(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn issue(&self, subject: &str) -> Result<String> {
        self.issue_at(subject, chrono::Utc::now().timestamp())
    }

    fn issue_at(&self, subject: &str, issued: i64) -> Result<String> {
        if subject.is_empty() || subject.contains('.') {
            return Err(anyhow!("oauth state subject must be non-empty and dot-free"));
        }
        let payload = format!("{subject}.{issued}.{}", Uuid::new_v4().simple());
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{payload}.{sig}"))
    }

    pub fn verify(&self, state: &str, subject: &str) -> bool {
        self.verified_subject(state).as_deref() == Some(subject)
    }

    /// The subject of an authentic, unexpired state.
    pub fn verified_subject(&self, state: &str) -> Option<String> {
        self.verified_subject_at(state, chrono::Utc::now().timestamp())
    }

    fn verified_subject_at(&self, state: &str, now: i64) -> Option<String> {
        let (payload, sig) = state.rsplit_once('.')?;
        let sig = hex::decode(sig).ok()?;
        let mut mac = self.mac().ok()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&sig).ok()?;

        let mut parts = payload.splitn(3, '.');
        let (Some(subject), Some(issued), Some(_nonce)) = (parts.next(), parts.next(), parts.next())
        else {
            return None;
        };
        let issued = issued.parse::<i64>().ok()?;
        (issued <= now && now - issued <= STATE_MAX_AGE_SECS).then(|| subject.to_string())
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| anyhow!("oauth state key: {e}"))
    }
}
