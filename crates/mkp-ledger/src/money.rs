//! Fixed-point money type.
//!
//! All monetary amounts (listing prices, fees, balances, withdrawals) are
//! stored as integer cents in an `i64`. Floats never touch a balance.
//!
//! `Cents` wraps the raw `i64` so the type system prevents:
//! - Implicit construction from raw `i64` (no `From<i64>` impl).
//! - Mixing money with unrelated integers (ids, basis points, counts).
//!
//! # Scale
//!
//! 1 USD = `Cents(100)`. Prices are accepted as decimal strings with at most
//! two fractional digits; anything finer is rejected rather than rounded.
//!
//! # Arithmetic
//!
//! Ledger arithmetic goes through `checked_add` / `checked_sub`, which return
//! `None` on overflow. `Add`/`Sub` operators exist for test and display code.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Cents newtype
// ---------------------------------------------------------------------------

/// A monetary amount in integer cents.
///
/// Serialises as a decimal string (`"85.00"`) so API clients never see the
/// internal scale.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Cents(i64);

impl Cents {
    pub const ZERO: Cents = Cents(0);

    /// Construct from a raw cent count.
    #[inline]
    pub const fn new(raw: i64) -> Self {
        Cents(raw)
    }

    /// Construct from whole currency units (`Cents::units(100)` == $100.00).
    #[inline]
    pub const fn units(whole: i64) -> Self {
        Cents(whole * 100)
    }

    /// Extract the underlying cent count (for DB binds and processor calls).
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub fn checked_add(self, rhs: Cents) -> Option<Cents> {
        self.0.checked_add(rhs.0).map(Cents)
    }

    #[inline]
    pub fn checked_sub(self, rhs: Cents) -> Option<Cents> {
        self.0.checked_sub(rhs.0).map(Cents)
    }

    /// Parse a decimal string such as `"100"`, `"9.5"` or `"+12.34"`.
    ///
    /// Rejects negatives, more than two decimals, non-digit characters and
    /// overflow.
    pub fn parse_decimal(s: &str) -> Result<Cents, ParseCentsError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseCentsError::Empty);
        }
        let s = s.strip_prefix('+').unwrap_or(s);
        if s.starts_with('-') {
            return Err(ParseCentsError::Negative);
        }

        let mut parts = s.split('.');
        let int_part = parts.next().unwrap_or("");
        let frac_part = parts.next();
        if parts.next().is_some() {
            return Err(ParseCentsError::Malformed);
        }

        if int_part.is_empty() && frac_part.map_or(true, str::is_empty) {
            return Err(ParseCentsError::Malformed);
        }
        if !int_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(ParseCentsError::Malformed);
        }

        let int_val: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| ParseCentsError::Overflow)?
        };

        let frac_val: i64 = match frac_part {
            None | Some("") => 0,
            Some(frac) => {
                if !frac.chars().all(|c| c.is_ascii_digit()) {
                    return Err(ParseCentsError::Malformed);
                }
                if frac.len() > 2 {
                    return Err(ParseCentsError::TooPrecise);
                }
                let padded = format!("{frac:0<2}");
                padded.parse().map_err(|_| ParseCentsError::Malformed)?
            }
        };

        int_val
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac_val))
            .map(Cents)
            .ok_or(ParseCentsError::Overflow)
    }
}

impl Add for Cents {
    type Output = Cents;
    #[inline]
    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0 + rhs.0)
    }
}

impl Sub for Cents {
    type Output = Cents;
    #[inline]
    fn sub(self, rhs: Cents) -> Cents {
        Cents(self.0 - rhs.0)
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Cents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Cents::parse_decimal(&s).map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Parse error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseCentsError {
    Empty,
    Negative,
    Malformed,
    TooPrecise,
    Overflow,
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ParseCentsError::Empty => "empty amount",
            ParseCentsError::Negative => "negative amount not allowed",
            ParseCentsError::Malformed => "invalid decimal format",
            ParseCentsError::TooPrecise => "at most two decimal places allowed",
            ParseCentsError::Overflow => "amount overflow",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ParseCentsError {}
