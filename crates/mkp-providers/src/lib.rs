//! mkp-providers
//!
//! External collaborators of the marketplace, each behind an object-safe
//! async trait so the service can hold `Arc<dyn ...>` and tests can swap in
//! in-process fakes:
//!
//! - [`IdentityProvider`]: OAuth2 authorization-code login.
//! - [`PaymentProcessor`]: card charges and merchant-account onboarding.
//!
//! Concrete reqwest clients live in [`discord`] and [`stripe`]. Credentials are
//! passed in by the caller (resolved once at startup); nothing here reads the
//! environment and nothing here logs a credential.

pub mod discord;
pub mod stripe;

use std::fmt;
use std::time::Duration;

use mkp_ledger::Cents;

pub use discord::DiscordIdentityProvider;
pub use stripe::StripePaymentProcessor;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that a provider implementation may return.
#[derive(Debug)]
pub enum ProviderError {
    /// Network or transport failure.
    Transport(String),
    /// The upstream API returned an application-level error.
    Api { code: Option<i64>, message: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// A required configuration value is missing or invalid.
    Config(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "transport error: {msg}"),
            ProviderError::Api {
                code: Some(c),
                message,
            } => write!(f, "provider api error code={c}: {message}"),
            ProviderError::Api {
                code: None,
                message,
            } => write!(f, "provider api error: {message}"),
            ProviderError::Decode(msg) => write!(f, "decode error: {msg}"),
            ProviderError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Transport(format!("timed out: {e}"))
        } else if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Upper bound on one provider round trip, connect included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// reqwest client used by every provider. A hung upstream surfaces as
/// `ProviderError::Transport` once `timeout` elapses.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(timeout)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
        .build()
        .map_err(|e| ProviderError::Config(format!("http client: {e}")))
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// OAuth2 access token returned by a code exchange. `Debug` is redacted.
#[derive(Clone)]
pub struct AccessToken(pub String);

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<REDACTED>)")
    }
}

/// Profile returned by the identity provider after login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable numeric account id assigned by the provider.
    pub id: i64,
    pub username: String,
    /// Avatar hash; `None` means the provider's default avatar.
    pub avatar: Option<String>,
}

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// URL the browser is redirected to in order to start the login.
    fn authorize_url(&self, state: &str) -> Result<String, ProviderError>;

    async fn exchange_code(&self, code: &str) -> Result<AccessToken, ProviderError>;

    async fn fetch_identity(&self, token: &AccessToken) -> Result<Identity, ProviderError>;
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

/// One card charge for one listing.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount: Cents,
    pub currency: String,
    /// Platform fee. Only sent upstream when `destination` is set.
    pub application_fee: Cents,
    /// Seller merchant account for destination charges.
    pub destination: Option<String>,
    /// Client-side payment token (card source).
    pub source: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeReceipt {
    /// Processor-assigned charge id, stored as the purchase confirmation id.
    pub confirmation_id: String,
}

/// Result of a merchant onboarding code exchange.
#[derive(Clone)]
pub struct MerchantLink {
    pub merchant_id: String,
    pub access_token: String,
}

impl fmt::Debug for MerchantLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerchantLink")
            .field("merchant_id", &self.merchant_id)
            .field("access_token", &"<REDACTED>")
            .finish()
    }
}

#[async_trait::async_trait]
pub trait PaymentProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn charge(&self, req: ChargeRequest) -> Result<ChargeReceipt, ProviderError>;

    /// URL a seller visits to connect a merchant account.
    fn onboarding_url(&self, state: &str) -> Result<String, ProviderError>;

    async fn exchange_onboarding_code(&self, code: &str) -> Result<MerchantLink, ProviderError>;
}
