//! Seller balance and withdrawal lifecycle.
//!
//! Withdrawals debit the balance eagerly: the amount leaves the balance at
//! request time, so the balance a seller sees already excludes outstanding
//! requests and a second request cannot spend the same funds.
//!
//! ```text
//!   request ──► Pending ──Complete──► Completed (term.)
//!                  │
//!                Reject (re-credits the amount)
//!                  │
//!                  ▼
//!              Rejected (term.)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::money::Cents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalAction {
    Complete,
    Reject,
}

impl WithdrawalAction {
    pub fn as_str(self) -> &'static str {
        match self {
            WithdrawalAction::Complete => "complete",
            WithdrawalAction::Reject => "reject",
        }
    }
}

impl WithdrawalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self, MarketError> {
        match s {
            "pending" => Ok(WithdrawalStatus::Pending),
            "completed" => Ok(WithdrawalStatus::Completed),
            "rejected" => Ok(WithdrawalStatus::Rejected),
            other => Err(MarketError::validation(format!(
                "unknown withdrawal status: {other}"
            ))),
        }
    }

    pub fn apply(self, action: WithdrawalAction) -> Result<WithdrawalStatus, MarketError> {
        match (self, action) {
            (WithdrawalStatus::Pending, WithdrawalAction::Complete) => Ok(WithdrawalStatus::Completed),
            (WithdrawalStatus::Pending, WithdrawalAction::Reject) => Ok(WithdrawalStatus::Rejected),
            (from, action) => Err(MarketError::InvalidStateTransition {
                entity: "withdrawal",
                from: from.as_str().to_string(),
                action: action.as_str(),
            }),
        }
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Debit `amount` from `balance`, returning the new balance.
///
/// Fails with `InsufficientBalance` when `amount > balance`; the caller must
/// then write nothing.
pub fn reserve(balance: Cents, amount: Cents) -> Result<Cents, MarketError> {
    if !amount.is_positive() {
        return Err(MarketError::validation("withdrawal amount must be greater than zero"));
    }
    if amount > balance {
        return Err(MarketError::InsufficientBalance {
            requested: amount,
            available: balance,
        });
    }
    balance
        .checked_sub(amount)
        .ok_or_else(|| MarketError::validation("balance underflow"))
}

/// Return a rejected withdrawal's amount to the balance.
pub fn release(balance: Cents, amount: Cents) -> Result<Cents, MarketError> {
    balance
        .checked_add(amount)
        .ok_or_else(|| MarketError::validation("balance overflow"))
}

/// Seller-supplied payout request, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalDraft {
    pub amount: Cents,
    pub method: String,
    pub destination: String,
}

impl WithdrawalDraft {
    pub fn validate(self, allowed_methods: &[String]) -> Result<WithdrawalDraft, MarketError> {
        if !self.amount.is_positive() {
            return Err(MarketError::validation("withdrawal amount must be greater than zero"));
        }
        let method = self.method.trim().to_ascii_lowercase();
        if !allowed_methods.iter().any(|m| m.eq_ignore_ascii_case(&method)) {
            return Err(MarketError::validation(format!(
                "unsupported payout method '{method}'"
            )));
        }
        let destination = self.destination.trim().to_string();
        if destination.is_empty() {
            return Err(MarketError::validation("payout destination must not be empty"));
        }
        Ok(WithdrawalDraft {
            amount: self.amount,
            method,
            destination,
        })
    }
}

/// Balance implied by the ledger history: sale credits minus every
/// withdrawal that was not rejected.
pub fn expected_balance(
    sale_credits: impl IntoIterator<Item = Cents>,
    withdrawals: impl IntoIterator<Item = (Cents, WithdrawalStatus)>,
) -> Option<Cents> {
    let mut total = Cents::ZERO;
    for c in sale_credits {
        total = total.checked_add(c)?;
    }
    for (amount, status) in withdrawals {
        if status != WithdrawalStatus::Rejected {
            total = total.checked_sub(amount)?;
        }
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn methods() -> Vec<String> {
        vec!["paypal".to_string(), "bank_transfer".to_string()]
    }

    #[test]
    fn reserve_debits_and_rejects_overdraw() {
        let after = reserve(Cents::units(85), Cents::units(85)).unwrap();
        assert_eq!(after, Cents::ZERO);

        let err = reserve(after, Cents::new(1)).unwrap_err();
        assert_eq!(
            err,
            MarketError::InsufficientBalance {
                requested: Cents::new(1),
                available: Cents::ZERO
            }
        );
    }

    #[test]
    fn reserve_rejects_non_positive_amounts() {
        assert_eq!(reserve(Cents::units(5), Cents::ZERO).unwrap_err().kind(), "validation");
    }

    #[test]
    fn only_pending_can_move() {
        assert_eq!(
            WithdrawalStatus::Pending.apply(WithdrawalAction::Complete).unwrap(),
            WithdrawalStatus::Completed
        );
        assert_eq!(
            WithdrawalStatus::Pending.apply(WithdrawalAction::Reject).unwrap(),
            WithdrawalStatus::Rejected
        );
        for from in [WithdrawalStatus::Completed, WithdrawalStatus::Rejected] {
            for action in [WithdrawalAction::Complete, WithdrawalAction::Reject] {
                assert!(from.apply(action).is_err());
            }
        }
    }

    #[test]
    fn draft_validation() {
        let ok = WithdrawalDraft {
            amount: Cents::units(10),
            method: " PayPal ".to_string(),
            destination: " me@example.com ".to_string(),
        }
        .validate(&methods())
        .unwrap();
        assert_eq!(ok.method, "paypal");
        assert_eq!(ok.destination, "me@example.com");

        let bad_method = WithdrawalDraft {
            amount: Cents::units(10),
            method: "carrier_pigeon".to_string(),
            destination: "roof".to_string(),
        };
        assert!(bad_method.validate(&methods()).is_err());

        let blank_dest = WithdrawalDraft {
            amount: Cents::units(10),
            method: "paypal".to_string(),
            destination: "  ".to_string(),
        };
        assert!(blank_dest.validate(&methods()).is_err());
    }

    #[test]
    fn expected_balance_ignores_rejected() {
        let bal = expected_balance(
            [Cents::units(85), Cents::units(10)],
            [
                (Cents::units(50), WithdrawalStatus::Completed),
                (Cents::units(20), WithdrawalStatus::Pending),
                (Cents::units(15), WithdrawalStatus::Rejected),
            ],
        )
        .unwrap();
        assert_eq!(bal, Cents::units(25));
    }
}
