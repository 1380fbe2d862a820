//! Minor-unit money and proration.
//!
//! Every amount in the system is an integer count of minor units (cents). Major
//! units only exist at the caller boundary, where `Money::from_major` converts
//! with a fixed factor of 100.

use core::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Amount in minor units (e.g. cents).
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    /// Conversion factor between major and minor units.
    pub const MINOR_PER_MAJOR: i64 = 100;

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Convert a major-unit decimal (e.g. `12.34`) into minor units.
    ///
    /// Rejects amounts with sub-cent precision and amounts that overflow.
    pub fn from_major(major: Decimal) -> DomainResult<Self> {
        let normalized = major.normalize();
        if normalized.scale() > 2 {
            return Err(DomainError::validation(format!(
                "amount {major} has more than 2 decimal places"
            )));
        }
        let minor = (normalized * Decimal::from(Self::MINOR_PER_MAJOR))
            .to_i64()
            .ok_or_else(|| DomainError::validation(format!("amount {major} is out of range")))?;
        Ok(Self(minor))
    }

    pub fn to_major(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::invariant("money overflow"))
    }

    pub fn checked_sub(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::invariant("money overflow"))
    }

    /// Multiply a unit amount by a quantity.
    pub fn checked_mul(self, quantity: i64) -> DomainResult<Money> {
        self.0
            .checked_mul(quantity)
            .map(Money)
            .ok_or_else(|| DomainError::invariant("money overflow"))
    }

    /// Split this amount across `weights`; see [`prorate`].
    pub fn prorate(self, weights: &[i64]) -> DomainResult<Vec<Money>> {
        Ok(prorate(self.0, weights)?.into_iter().map(Money).collect())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_major(), f)
    }
}

/// Distribute `total` proportionally to `weights`.
///
/// Each share is `total * weight / Σweights` (integer division); the whole
/// rounding loss goes to the last share, so the result always sums to `total`
/// and is reproducible for the same input order.
pub fn prorate(total: i64, weights: &[i64]) -> DomainResult<Vec<i64>> {
    if total < 0 {
        return Err(DomainError::validation("prorated total cannot be negative"));
    }
    if weights.iter().any(|w| *w < 0) {
        return Err(DomainError::validation("proration weights cannot be negative"));
    }
    if weights.is_empty() {
        if total == 0 {
            return Ok(Vec::new());
        }
        return Err(DomainError::validation("cannot prorate a non-zero total over no weights"));
    }

    let weight_sum: i128 = weights.iter().map(|w| *w as i128).sum();
    if weight_sum == 0 {
        if total == 0 {
            return Ok(vec![0; weights.len()]);
        }
        return Err(DomainError::validation("cannot prorate a non-zero total over zero weights"));
    }

    let mut shares = Vec::with_capacity(weights.len());
    let mut allocated: i64 = 0;
    for weight in weights {
        // i128 keeps `total * weight` exact; the quotient is <= total so it fits back.
        let share = ((total as i128 * *weight as i128) / weight_sum) as i64;
        allocated += share;
        shares.push(share);
    }

    if let Some(last) = shares.last_mut() {
        *last += total - allocated;
    }

    Ok(shares)
}

/// Integer division rounding half away from zero, for non-negative numerators.
///
/// This is the single rounding mode used wherever a per-unit cost is derived
/// from a total (average cost). Returns 0 when `denominator` is 0.
pub fn div_round_half_up(numerator: i64, denominator: i64) -> i64 {
    if denominator == 0 {
        return 0;
    }
    let n = numerator as i128;
    let d = denominator as i128;
    ((2 * n + d) / (2 * d)) as i64
}
