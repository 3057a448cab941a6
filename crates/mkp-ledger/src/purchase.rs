//! Purchase preconditions, platform fee split and fulfillment policy.

use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::listing::ListingStatus;
use crate::money::Cents;

/// 100% expressed in basis points.
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Platform fee applied when a deployment does not configure one (15%).
pub const DEFAULT_FEE_BPS: u32 = 1500;

// ---------------------------------------------------------------------------
// Fee schedule
// ---------------------------------------------------------------------------

/// Platform fee as basis points of the sale price (`1500` = 15%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeSchedule {
    bps: u32,
}

/// How a sale price is divided between the operator and the seller.
///
/// `fee + seller_net == price` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub price: Cents,
    pub fee: Cents,
    pub seller_net: Cents,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self { bps: DEFAULT_FEE_BPS }
    }
}

impl FeeSchedule {
    pub fn from_bps(bps: u32) -> Result<Self, MarketError> {
        if i64::from(bps) > BPS_DENOMINATOR {
            return Err(MarketError::validation(format!(
                "platform fee {bps} bps exceeds 100%"
            )));
        }
        Ok(Self { bps })
    }

    pub fn bps(&self) -> u32 {
        self.bps
    }

    /// Fee is rounded half-up to the nearest cent; the seller gets the rest.
    pub fn split(&self, price: Cents) -> Result<FeeSplit, MarketError> {
        let raw = price
            .raw()
            .checked_mul(i64::from(self.bps))
            .and_then(|v| v.checked_add(BPS_DENOMINATOR / 2))
            .ok_or_else(|| MarketError::validation("price too large for fee computation"))?;
        let fee = Cents::new(raw / BPS_DENOMINATOR);
        let seller_net = price
            .checked_sub(fee)
            .ok_or_else(|| MarketError::validation("fee underflow"))?;
        Ok(FeeSplit { price, fee, seller_net })
    }
}

// ---------------------------------------------------------------------------
// Fulfillment policy
// ---------------------------------------------------------------------------

/// Where the money goes once a charge succeeds. Exactly one policy is active
/// per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentPolicy {
    /// The platform collects the charge and credits the seller's internal
    /// balance with the net amount; sellers cash out through withdrawals.
    DirectCredit,
    /// The charge is routed to the seller's onboarded merchant account with
    /// the fee taken as an application fee; the internal balance is untouched.
    ConnectedAccount,
}

impl FulfillmentPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            FulfillmentPolicy::DirectCredit => "direct_credit",
            FulfillmentPolicy::ConnectedAccount => "connected_account",
        }
    }

    pub fn parse(s: &str) -> Result<Self, MarketError> {
        match s.trim() {
            "direct_credit" => Ok(FulfillmentPolicy::DirectCredit),
            "connected_account" => Ok(FulfillmentPolicy::ConnectedAccount),
            other => Err(MarketError::validation(format!(
                "unknown fulfillment policy '{other}'; expected direct_credit | connected_account"
            ))),
        }
    }

    /// Amount credited to the seller's internal balance for a given split.
    pub fn seller_credit(self, split: &FeeSplit) -> Cents {
        match self {
            FulfillmentPolicy::DirectCredit => split.seller_net,
            FulfillmentPolicy::ConnectedAccount => Cents::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Purchase preconditions
// ---------------------------------------------------------------------------

/// Row-locked state read at the start of a purchase transaction.
#[derive(Debug, Clone)]
pub struct PurchaseCandidate {
    pub listing_status: ListingStatus,
    pub seller_id: i64,
    pub seller_banned: bool,
    pub seller_merchant_id: Option<String>,
    pub buyer_id: i64,
    pub buyer_banned: bool,
}

impl PurchaseCandidate {
    /// Returns the merchant destination for the charge (if the policy routes
    /// funds to the seller) or the reason the listing cannot be bought.
    pub fn check(&self, policy: FulfillmentPolicy) -> Result<Option<String>, MarketError> {
        if self.listing_status != ListingStatus::Available {
            return Err(MarketError::not_purchasable(format!(
                "listing is {}",
                self.listing_status
            )));
        }
        if self.buyer_id == self.seller_id {
            return Err(MarketError::not_purchasable("sellers cannot buy their own listing"));
        }
        if self.seller_banned {
            return Err(MarketError::not_purchasable("seller is banned"));
        }
        if self.buyer_banned {
            return Err(MarketError::not_purchasable("buyer is banned"));
        }

        match policy {
            FulfillmentPolicy::DirectCredit => Ok(None),
            FulfillmentPolicy::ConnectedAccount => match &self.seller_merchant_id {
                Some(m) => Ok(Some(m.clone())),
                None => Err(MarketError::not_purchasable(
                    "seller has not connected a payout account",
                )),
            },
        }
    }
}
