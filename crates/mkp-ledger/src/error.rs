//! Domain error taxonomy.
//!
//! Every variant is recoverable: the request that produced it is rejected and
//! persistent state is left as it was. Infrastructure failures (database,
//! transport) are not represented here; they travel as `anyhow::Error` and are
//! reported as internal errors at the HTTP boundary.

use std::fmt;

use crate::money::Cents;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// Bad user input; the client should correct the form and retry.
    Validation(String),
    /// The entity is no longer in the state the action requires (stale or
    /// repeated action).
    InvalidStateTransition { entity: &'static str, from: String, action: &'static str },
    NotFound { entity: &'static str, id: i64 },
    NotPurchasable(String),
    InsufficientBalance { requested: Cents, available: Cents },
    Forbidden(String),
    /// The payment processor declined the charge. Carries the processor's
    /// message verbatim.
    PaymentFailed(String),
    /// The identity provider or payment-processor onboarding exchange failed.
    ExternalAuthFailed(String),
    /// No valid session accompanied the request.
    Unauthenticated,
}

impl MarketError {
    /// Stable machine-readable tag used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketError::Validation(_) => "validation",
            MarketError::InvalidStateTransition { .. } => "invalid_state_transition",
            MarketError::NotFound { .. } => "not_found",
            MarketError::NotPurchasable(_) => "not_purchasable",
            MarketError::InsufficientBalance { .. } => "insufficient_balance",
            MarketError::Forbidden(_) => "forbidden",
            MarketError::PaymentFailed(_) => "payment_failed",
            MarketError::ExternalAuthFailed(_) => "external_auth_failed",
            MarketError::Unauthenticated => "unauthenticated",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        MarketError::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        MarketError::Forbidden(msg.into())
    }

    pub fn not_purchasable(msg: impl Into<String>) -> Self {
        MarketError::NotPurchasable(msg.into())
    }
}

impl fmt::Display for MarketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketError::Validation(msg) => write!(f, "validation error: {msg}"),
            MarketError::InvalidStateTransition { entity, from, action } => {
                write!(f, "cannot {action} {entity} in state {from}")
            }
            MarketError::NotFound { entity, id } => write!(f, "{entity} {id} not found"),
            MarketError::NotPurchasable(msg) => write!(f, "listing not purchasable: {msg}"),
            MarketError::InsufficientBalance { requested, available } => write!(
                f,
                "insufficient balance: requested {requested}, available {available}"
            ),
            MarketError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            MarketError::PaymentFailed(msg) => write!(f, "payment failed: {msg}"),
            MarketError::ExternalAuthFailed(msg) => write!(f, "external auth failed: {msg}"),
            MarketError::Unauthenticated => f.write_str("authentication required"),
        }
    }
}

impl std::error::Error for MarketError {}
