//! Scenario: a $100.00 sale at a 15% platform fee credits the seller $85.00;
//! withdrawing $85.00 empties the balance and a further $0.01 is refused.
//!
//! Pure ledger arithmetic; the DB-backed version of the same flow lives in
//! `mkp-db/tests/scenario_purchase_credit_and_withdraw.rs`.

use mkp_ledger::withdrawal::{expected_balance, reserve};
use mkp_ledger::{
    Cents, FeeSchedule, FulfillmentPolicy, ListingAction, ListingOutcome, ListingStatus,
    MarketError, WithdrawalStatus,
};

#[test]
fn sale_credit_then_full_withdrawal_then_overdraw_refused() {
    let fees = FeeSchedule::from_bps(1500).unwrap();
    let price = Cents::parse_decimal("100.00").unwrap();

    // Listing goes available -> sold exactly once.
    let status = ListingStatus::initial(false);
    let outcome = status.apply(ListingAction::Sell).unwrap();
    assert_eq!(outcome, ListingOutcome::Becomes(ListingStatus::Sold));
    assert!(ListingStatus::Sold.apply(ListingAction::Sell).is_err());

    let split = fees.split(price).unwrap();
    let credit = FulfillmentPolicy::DirectCredit.seller_credit(&split);
    assert_eq!(credit, Cents::units(85));

    let mut balance = Cents::ZERO + credit;
    balance = reserve(balance, Cents::units(85)).unwrap();
    assert_eq!(balance, Cents::ZERO);

    let err = reserve(balance, Cents::parse_decimal("0.01").unwrap()).unwrap_err();
    assert!(matches!(err, MarketError::InsufficientBalance { .. }));
    // The failed request left the balance untouched.
    assert_eq!(balance, Cents::ZERO);

    // Ledger consistency: credits minus eagerly-debited withdrawals.
    let implied = expected_balance(
        [credit],
        [(Cents::units(85), WithdrawalStatus::Pending)],
    )
    .unwrap();
    assert_eq!(implied, balance);
}
