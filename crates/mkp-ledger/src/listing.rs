//! Listing lifecycle state machine.
//!
//! # State diagram
//!
//! ```text
//!   moderated deployments            direct-sale deployments
//!
//!        submit                             submit
//!          │                                  │
//!          ▼                                  ▼
//!       Pending ──Approve──► Approved      Available ──Sell──► Sold (term.)
//!          │
//!        Deny
//!          │
//!          ▼
//!      (row deleted)
//! ```
//!
//! The two paths are disjoint. `Approved` and `Sold` accept no further
//! actions; a denied listing leaves no row behind, so "denied" is an action
//! outcome and never a stored status.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MarketError;
use crate::money::Cents;

pub const MAX_TITLE_CHARS: usize = 120;

// ---------------------------------------------------------------------------
// ListingStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    /// Awaiting admin review; not publicly visible.
    Pending,
    /// Accepted by an admin; publicly visible. **Terminal.**
    Approved,
    /// Listed for direct sale; publicly visible and purchasable.
    Available,
    /// Purchased. **Terminal.**
    Sold,
}

impl ListingStatus {
    /// Initial status for a new listing under the deployment's moderation setting.
    pub fn initial(moderation: bool) -> Self {
        if moderation {
            ListingStatus::Pending
        } else {
            ListingStatus::Available
        }
    }

    /// Statuses shown in the public catalog.
    pub const PUBLIC: [ListingStatus; 2] = [ListingStatus::Approved, ListingStatus::Available];

    pub fn is_public(self) -> bool {
        Self::PUBLIC.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ListingStatus::Approved | ListingStatus::Sold)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ListingStatus::Pending => "pending",
            ListingStatus::Approved => "approved",
            ListingStatus::Available => "available",
            ListingStatus::Sold => "sold",
        }
    }

    pub fn parse(s: &str) -> Result<Self, MarketError> {
        match s {
            "pending" => Ok(ListingStatus::Pending),
            "approved" => Ok(ListingStatus::Approved),
            "available" => Ok(ListingStatus::Available),
            "sold" => Ok(ListingStatus::Sold),
            other => Err(MarketError::validation(format!("unknown listing status: {other}"))),
        }
    }

    /// Apply an action, returning what should happen to the stored row.
    pub fn apply(self, action: ListingAction) -> Result<ListingOutcome, MarketError> {
        use ListingAction::*;
        use ListingStatus::*;

        match (self, action) {
            (Pending, Approve) => Ok(ListingOutcome::Becomes(Approved)),
            (Pending, Deny) => Ok(ListingOutcome::Deleted),
            (Available, Sell) => Ok(ListingOutcome::Becomes(Sold)),
            (from, action) => Err(MarketError::InvalidStateTransition {
                entity: "listing",
                from: from.as_str().to_string(),
                action: action.as_str(),
            }),
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ListingAction / ListingOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingAction {
    Approve,
    Deny,
    Sell,
}

impl ListingAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ListingAction::Approve => "approve",
            ListingAction::Deny => "deny",
            ListingAction::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingOutcome {
    Becomes(ListingStatus),
    Deleted,
}

// ---------------------------------------------------------------------------
// ListingDraft
// ---------------------------------------------------------------------------

/// Seller-supplied fields for a new listing, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    pub price: Cents,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub game_id: Option<i64>,
}

impl ListingDraft {
    /// Trim text fields, drop blank optionals, and enforce the input rules.
    pub fn validate(self) -> Result<ListingDraft, MarketError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(MarketError::validation("title must not be empty"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(MarketError::validation(format!(
                "title must be at most {MAX_TITLE_CHARS} characters"
            )));
        }
        if !self.price.is_positive() {
            return Err(MarketError::validation("price must be greater than zero"));
        }

        Ok(ListingDraft {
            title,
            price: self.price,
            description: non_blank(self.description),
            image_url: non_blank(self.image_url),
            game_id: self.game_id,
        })
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ListingStatus; 4] = [
        ListingStatus::Pending,
        ListingStatus::Approved,
        ListingStatus::Available,
        ListingStatus::Sold,
    ];
    const ACTIONS: [ListingAction; 3] =
        [ListingAction::Approve, ListingAction::Deny, ListingAction::Sell];

    #[test]
    fn only_three_transitions_are_legal() {
        let mut legal = Vec::new();
        for from in ALL {
            for action in ACTIONS {
                if let Ok(out) = from.apply(action) {
                    legal.push((from, action, out));
                }
            }
        }
        assert_eq!(
            legal,
            vec![
                (ListingStatus::Pending, ListingAction::Approve, ListingOutcome::Becomes(ListingStatus::Approved)),
                (ListingStatus::Pending, ListingAction::Deny, ListingOutcome::Deleted),
                (ListingStatus::Available, ListingAction::Sell, ListingOutcome::Becomes(ListingStatus::Sold)),
            ]
        );
    }

    #[test]
    fn terminal_states_reject_everything() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for action in ACTIONS {
                assert!(from.apply(action).is_err(), "{from} accepted {action:?}");
            }
        }
    }

    #[test]
    fn repeated_approve_is_invalid_transition() {
        let err = ListingStatus::Approved.apply(ListingAction::Approve).unwrap_err();
        assert_eq!(err.kind(), "invalid_state_transition");
    }

    #[test]
    fn initial_status_follows_moderation() {
        assert_eq!(ListingStatus::initial(true), ListingStatus::Pending);
        assert_eq!(ListingStatus::initial(false), ListingStatus::Available);
    }

    #[test]
    fn status_string_roundtrip_and_public_set() {
        for s in ALL {
            assert_eq!(ListingStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(ListingStatus::parse("denied").is_err());
        assert!(!ListingStatus::Pending.is_public());
        assert!(!ListingStatus::Sold.is_public());
        assert!(ListingStatus::Approved.is_public());
        assert!(ListingStatus::Available.is_public());
    }

    fn draft(title: &str, cents: i64) -> ListingDraft {
        ListingDraft {
            title: title.to_string(),
            price: Cents::new(cents),
            description: Some("  ".to_string()),
            image_url: Some(" https://img.example/a.png ".to_string()),
            game_id: None,
        }
    }

    #[test]
    fn draft_validation_trims_and_normalises() {
        let ok = draft("  Level 80 account ", 10_000).validate().unwrap();
        assert_eq!(ok.title, "Level 80 account");
        assert_eq!(ok.description, None);
        assert_eq!(ok.image_url.as_deref(), Some("https://img.example/a.png"));
    }

    #[test]
    fn draft_validation_rejects_empty_title_and_non_positive_price() {
        assert_eq!(draft("   ", 100).validate().unwrap_err().kind(), "validation");
        assert_eq!(draft("x", 0).validate().unwrap_err().kind(), "validation");
        assert_eq!(draft("x", -5).validate().unwrap_err().kind(), "validation");
        let long = "a".repeat(MAX_TITLE_CHARS + 1);
        assert!(draft(&long, 100).validate().is_err());
    }
}
