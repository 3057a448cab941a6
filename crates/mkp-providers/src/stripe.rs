//! Stripe payment processor: card charges and Connect (standard OAuth)
//! onboarding.
//!
//! Charges are form-encoded `POST /v1/charges`. When a destination merchant is
//! given the charge becomes a destination charge and the platform fee travels
//! as `application_fee_amount`; otherwise the platform keeps the whole charge.

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::{
    http_client, ChargeReceipt, ChargeRequest, MerchantLink, PaymentProcessor, ProviderError,
    DEFAULT_REQUEST_TIMEOUT,
};

pub const STRIPE_API_BASE_URL: &str = "https://api.stripe.com";
pub const STRIPE_CONNECT_BASE_URL: &str = "https://connect.stripe.com";

#[derive(Clone)]
pub struct StripePaymentProcessor {
    secret_key: String,
    client_id: String,
    onboarding_redirect_uri: String,
    http: reqwest::Client,
    api_base_url: String,
    connect_base_url: String,
}

impl std::fmt::Debug for StripePaymentProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripePaymentProcessor")
            .field("secret_key", &"<REDACTED>")
            .field("client_id", &self.client_id)
            .field("api_base_url", &self.api_base_url)
            .field("connect_base_url", &self.connect_base_url)
            .finish()
    }
}

impl StripePaymentProcessor {
    pub fn new(
        secret_key: String,
        client_id: String,
        onboarding_redirect_uri: String,
    ) -> Result<Self, ProviderError> {
        Self::new_with_base_urls(
            secret_key,
            client_id,
            onboarding_redirect_uri,
            STRIPE_API_BASE_URL.to_string(),
            STRIPE_CONNECT_BASE_URL.to_string(),
            DEFAULT_REQUEST_TIMEOUT,
        )
    }

    pub fn new_with_base_urls(
        secret_key: String,
        client_id: String,
        onboarding_redirect_uri: String,
        api_base_url: String,
        connect_base_url: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            secret_key,
            client_id,
            onboarding_redirect_uri,
            http: http_client(timeout)?,
            api_base_url,
            connect_base_url,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }

    fn connect_url(&self, path: &str) -> String {
        format!("{}{}", self.connect_base_url.trim_end_matches('/'), path)
    }
}

/// Form fields for a charge. Amounts are in the currency's minor unit.
fn charge_form(req: &ChargeRequest) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("amount", req.amount.raw().to_string()),
        ("currency", req.currency.clone()),
        ("source", req.source.clone()),
        ("description", req.description.clone()),
    ];
    if let Some(dest) = &req.destination {
        form.push(("application_fee_amount", req.application_fee.raw().to_string()));
        form.push(("transfer_data[destination]", dest.clone()));
    }
    form
}

#[async_trait::async_trait]
impl PaymentProcessor for StripePaymentProcessor {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn charge(&self, req: ChargeRequest) -> Result<ChargeReceipt, ProviderError> {
        if !req.amount.is_positive() {
            return Err(ProviderError::Config(format!(
                "charge amount must be positive, got {}",
                req.amount
            )));
        }

        let resp = self
            .http
            .post(self.api_url("/v1/charges"))
            .bearer_auth(&self.secret_key)
            .form(&charge_form(&req))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body: StripeErrorEnvelope = resp.json().await.unwrap_or_default();
            return Err(ProviderError::Api {
                code: Some(i64::from(status.as_u16())),
                message: body.message(),
            });
        }

        let charge: StripeCharge = resp.json().await?;
        if !charge.paid || charge.status.as_deref() == Some("failed") {
            return Err(ProviderError::Api {
                code: None,
                message: format!(
                    "charge {} not paid (status={})",
                    charge.id,
                    charge.status.as_deref().unwrap_or("unknown")
                ),
            });
        }

        tracing::debug!(charge_id = %charge.id, "stripe charge succeeded");
        Ok(ChargeReceipt {
            confirmation_id: charge.id,
        })
    }

    fn onboarding_url(&self, state: &str) -> Result<String, ProviderError> {
        if self.client_id.is_empty() {
            return Err(ProviderError::Config(
                "payments.client_id is not configured".to_string(),
            ));
        }
        let url = Url::parse_with_params(
            &self.connect_url("/oauth/authorize"),
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("scope", "read_write"),
                ("redirect_uri", self.onboarding_redirect_uri.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| ProviderError::Config(format!("invalid stripe connect url: {e}")))?;
        Ok(url.to_string())
    }

    async fn exchange_onboarding_code(&self, code: &str) -> Result<MerchantLink, ProviderError> {
        let resp = self
            .http
            .post(self.connect_url("/oauth/token"))
            .bearer_auth(&self.secret_key)
            .form(&[("grant_type", "authorization_code"), ("code", code)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body: StripeOAuthError = resp.json().await.unwrap_or_default();
            return Err(ProviderError::Api {
                code: Some(i64::from(status.as_u16())),
                message: body
                    .error_description
                    .or(body.error)
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }

        let token: StripeOAuthToken = resp.json().await?;
        Ok(MerchantLink {
            merchant_id: token.stripe_user_id,
            access_token: token.access_token,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeCharge {
    id: String,
    #[serde(default)]
    paid: bool,
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StripeErrorEnvelope {
    error: Option<StripeErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct StripeErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl StripeErrorEnvelope {
    fn message(&self) -> String {
        match &self.error {
            Some(StripeErrorBody {
                code: Some(c),
                message: Some(m),
            }) => format!("{c}: {m}"),
            Some(StripeErrorBody {
                message: Some(m), ..
            }) => m.clone(),
            Some(StripeErrorBody { code: Some(c), .. }) => c.clone(),
            _ => "unknown".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeOAuthToken {
    stripe_user_id: String,
    access_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct StripeOAuthError {
    error: Option<String>,
    error_description: Option<String>,
}
