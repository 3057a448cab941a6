//! mkp-ledger
//!
//! Pure marketplace domain rules: money, listing and withdrawal state
//! machines, purchase preconditions, fee split, chat access. No I/O lives
//! here; `mkp-db` reads row-locked state, asks these functions what to do,
//! and writes the answer inside the same transaction.

pub mod chat;
pub mod error;
pub mod listing;
pub mod money;
pub mod purchase;
pub mod withdrawal;

pub use chat::{validate_content, Participants};
pub use error::MarketError;
pub use listing::{ListingAction, ListingDraft, ListingOutcome, ListingStatus};
pub use money::{Cents, ParseCentsError};
pub use purchase::{FeeSchedule, FeeSplit, FulfillmentPolicy, PurchaseCandidate};
pub use withdrawal::{WithdrawalAction, WithdrawalDraft, WithdrawalStatus};
