//! Fixed-point amounts, prices and rate factors.
//!
//! Every quantity the ledger tracks is a [`rust_decimal::Decimal`] wrapped in
//! a purpose-specific newtype:
//! - [`CollateralAmount`] — units of a collateral token
//! - [`DebtAmount`] — normalized debt principal, excluding accrued interest
//! - [`DebtValue`] — rate-adjusted debt, the unit of free-debt balances
//! - [`Price`] — debt value per unit of collateral
//! - [`Rate`] — cumulative interest factor applied to principal
//!
//! Stored balances never go negative; movements are expressed with the signed
//! delta types [`CollateralDelta`], [`DebtDelta`] and [`ValueDelta`]. All
//! arithmetic is checked: helpers return `Option` and callers decide whether
//! `None` is an overflow fault or an insufficient-balance rejection.
//!
//! Every quantity serializes as its decimal string: `Decimal`'s default
//! deserializer needs a self-describing format, and ledger snapshots travel
//! through `bincode`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL AMOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// A non-negative quantity of one collateral token
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CollateralAmount(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl CollateralAmount {
    /// Zero collateral
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create an amount, rejecting negative values
    pub fn new(value: Decimal) -> Result<Self> {
        if value < Decimal::ZERO {
            return Err(Error::InvalidParameter {
                name: "collateral_amount".into(),
                reason: format!("must not be negative, got {}", value),
            });
        }
        Ok(Self(value))
    }

    /// Raw decimal value
    pub fn raw(&self) -> Decimal {
        self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Check if strictly positive
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction, `None` when the result would go negative
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        let next = self.0.checked_sub(other.0)?;
        if next < Decimal::ZERO {
            None
        } else {
            Some(Self(next))
        }
    }

    /// Apply a signed delta, `None` on overflow or a negative result
    pub fn checked_apply(self, delta: CollateralDelta) -> Option<Self> {
        let next = self.0.checked_add(delta.0)?;
        if next < Decimal::ZERO {
            None
        } else {
            Some(Self(next))
        }
    }

    /// Value of this amount at a spot price
    pub fn value_at(self, price: Price) -> Option<DebtValue> {
        self.0.checked_mul(price.0).map(DebtValue)
    }

    /// Scale by a non-negative factor
    pub fn scaled(self, factor: Decimal) -> Option<Self> {
        let next = self.0.checked_mul(factor)?;
        if next < Decimal::ZERO {
            None
        } else {
            Some(Self(next))
        }
    }

    /// Smaller of two amounts
    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for CollateralAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEBT AMOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Normalized debt principal of a loan, before the rate factor
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DebtAmount(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl DebtAmount {
    /// Zero debt
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create an amount, rejecting negative values
    pub fn new(value: Decimal) -> Result<Self> {
        if value < Decimal::ZERO {
            return Err(Error::InvalidParameter {
                name: "debt_amount".into(),
                reason: format!("must not be negative, got {}", value),
            });
        }
        Ok(Self(value))
    }

    /// Raw decimal value
    pub fn raw(&self) -> Decimal {
        self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Check if strictly positive
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction, `None` when the result would go negative
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        let next = self.0.checked_sub(other.0)?;
        if next < Decimal::ZERO {
            None
        } else {
            Some(Self(next))
        }
    }

    /// Apply a signed delta, `None` on overflow or a negative result
    pub fn checked_apply(self, delta: DebtDelta) -> Option<Self> {
        let next = self.0.checked_add(delta.0)?;
        if next < Decimal::ZERO {
            None
        } else {
            Some(Self(next))
        }
    }

    /// Rate-adjusted value of this principal
    pub fn value_at(self, rate: Rate) -> Option<DebtValue> {
        self.0.checked_mul(rate.0).map(DebtValue)
    }

    /// Fraction this amount represents of a whole, `None` when the whole is zero
    pub fn ratio_of(self, whole: Self) -> Option<Decimal> {
        self.0.checked_div(whole.0)
    }

    /// Value accrued on this principal when the rate grows by `delta`
    pub fn scaled_value(self, delta: Decimal) -> Option<DebtValue> {
        let next = self.0.checked_mul(delta)?;
        if next < Decimal::ZERO {
            None
        } else {
            Some(DebtValue(next))
        }
    }

    /// Smaller of two amounts
    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for DebtAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEBT VALUE
// ═══════════════════════════════════════════════════════════════════════════════

/// Rate-adjusted debt value: principal times the cumulative rate
///
/// Free-debt balances, seized-debt balances, ceilings, dust floors and
/// auction tabs are all carried in this unit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DebtValue(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl DebtValue {
    /// Zero value
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a value, rejecting negatives
    pub fn new(value: Decimal) -> Result<Self> {
        if value < Decimal::ZERO {
            return Err(Error::InvalidParameter {
                name: "debt_value".into(),
                reason: format!("must not be negative, got {}", value),
            });
        }
        Ok(Self(value))
    }

    /// Raw decimal value
    pub fn raw(&self) -> Decimal {
        self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Check if strictly positive
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction, `None` when the result would go negative
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        let next = self.0.checked_sub(other.0)?;
        if next < Decimal::ZERO {
            None
        } else {
            Some(Self(next))
        }
    }

    /// Apply a signed delta, `None` on overflow or a negative result
    pub fn checked_apply(self, delta: ValueDelta) -> Option<Self> {
        let next = self.0.checked_add(delta.0)?;
        if next < Decimal::ZERO {
            None
        } else {
            Some(Self(next))
        }
    }

    /// Scale by a non-negative factor such as a liquidation penalty
    pub fn scaled(self, factor: Decimal) -> Option<Self> {
        let next = self.0.checked_mul(factor)?;
        if next < Decimal::ZERO {
            None
        } else {
            Some(Self(next))
        }
    }

    /// Convert back to principal by dividing out the rate factor
    pub fn principal_at(self, rate: Rate) -> Option<DebtAmount> {
        self.0.checked_div(rate.0).map(DebtAmount)
    }

    /// Collateral quantity this value buys at a price, `None` at price zero
    pub fn collateral_at(self, price: Price) -> Option<CollateralAmount> {
        if price.0.is_zero() {
            return None;
        }
        self.0.checked_div(price.0).map(CollateralAmount)
    }

    /// Smaller of two values
    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for DebtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE
// ═══════════════════════════════════════════════════════════════════════════════

/// Debt value per unit of collateral
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Price(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Price {
    /// Zero price
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price, rejecting negatives
    pub fn new(value: Decimal) -> Result<Self> {
        if value < Decimal::ZERO {
            return Err(Error::InvalidParameter {
                name: "price".into(),
                reason: format!("must not be negative, got {}", value),
            });
        }
        Ok(Self(value))
    }

    /// Raw decimal value
    pub fn raw(&self) -> Decimal {
        self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Check if strictly positive
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Scale by a non-negative factor such as an auction price buffer
    pub fn scaled(self, factor: Decimal) -> Option<Self> {
        let next = self.0.checked_mul(factor)?;
        if next < Decimal::ZERO {
            None
        } else {
            Some(Self(next))
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Cumulative interest factor for one collateral type, strictly positive
///
/// A loan's tab is `debt_amount * rate`. Accrual raises the rate, which
/// scales every outstanding tab of the type in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rate(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Rate {
    /// Neutral rate: tab equals principal
    pub const ONE: Self = Self(Decimal::ONE);

    /// Create a rate, rejecting non-positive values
    pub fn new(value: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            return Err(Error::InvalidParameter {
                name: "rate".into(),
                reason: format!("must be strictly positive, got {}", value),
            });
        }
        Ok(Self(value))
    }

    /// Raw decimal value
    pub fn raw(&self) -> Decimal {
        self.0
    }

    /// Raise the rate by a non-negative increment
    pub fn checked_increase(self, delta: Decimal) -> Option<Self> {
        if delta < Decimal::ZERO {
            return None;
        }
        self.0.checked_add(delta).map(Self)
    }
}

impl Default for Rate {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNED DELTAS
// ═══════════════════════════════════════════════════════════════════════════════

/// Signed change to a collateral quantity
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CollateralDelta(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl CollateralDelta {
    /// No change
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create from a raw signed value
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// A delta that adds the given amount
    pub fn increase(amount: CollateralAmount) -> Self {
        Self(amount.0)
    }

    /// A delta that removes the given amount
    pub fn decrease(amount: CollateralAmount) -> Self {
        Self(-amount.0)
    }

    /// Raw signed value
    pub fn raw(&self) -> Decimal {
        self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Check if the delta adds collateral
    pub fn is_increase(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Check if the delta removes collateral
    pub fn is_decrease(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Unsigned magnitude
    pub fn magnitude(&self) -> CollateralAmount {
        CollateralAmount(self.0.abs())
    }

    /// The opposite delta
    pub fn negated(&self) -> Self {
        Self(-self.0)
    }
}

impl fmt::Display for CollateralDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signed change to a debt principal
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DebtDelta(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl DebtDelta {
    /// No change
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create from a raw signed value
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// A delta that adds the given principal
    pub fn increase(amount: DebtAmount) -> Self {
        Self(amount.0)
    }

    /// A delta that removes the given principal
    pub fn decrease(amount: DebtAmount) -> Self {
        Self(-amount.0)
    }

    /// Raw signed value
    pub fn raw(&self) -> Decimal {
        self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Check if the delta adds debt
    pub fn is_increase(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Check if the delta removes debt
    pub fn is_decrease(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Unsigned magnitude
    pub fn magnitude(&self) -> DebtAmount {
        DebtAmount(self.0.abs())
    }

    /// The opposite delta
    pub fn negated(&self) -> Self {
        Self(-self.0)
    }

    /// Signed rate-adjusted value of this principal change
    pub fn value_at(&self, rate: Rate) -> Option<ValueDelta> {
        self.0.checked_mul(rate.0).map(ValueDelta)
    }
}

impl fmt::Display for DebtDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signed change to a rate-adjusted debt value
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ValueDelta(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl ValueDelta {
    /// No change
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create from a raw signed value
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Raw signed value
    pub fn raw(&self) -> Decimal {
        self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Check if the delta adds value
    pub fn is_increase(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Check if the delta removes value
    pub fn is_decrease(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Unsigned magnitude
    pub fn magnitude(&self) -> DebtValue {
        DebtValue(self.0.abs())
    }
}

impl fmt::Display for ValueDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHECKED EXPONENTIATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Raise a decimal to an integer power by squaring, `None` on overflow
///
/// Used by the exponential decay curves, whose step counts can be large
/// enough that repeated multiplication would be wasteful.
pub fn checked_pow(base: Decimal, exp: u64) -> Option<Decimal> {
    let mut result = Decimal::ONE;
    let mut base = base;
    let mut exp = exp;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.checked_mul(base)?;
        }
        exp >>= 1;
        if exp > 0 {
            base = base.checked_mul(base)?;
        }
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn coll(v: Decimal) -> CollateralAmount {
        CollateralAmount::new(v).unwrap()
    }

    fn debt(v: Decimal) -> DebtAmount {
        DebtAmount::new(v).unwrap()
    }

    fn value(v: Decimal) -> DebtValue {
        DebtValue::new(v).unwrap()
    }

    #[test]
    fn test_negative_amounts_rejected() {
        assert!(CollateralAmount::new(dec!(-1)).is_err());
        assert!(DebtAmount::new(dec!(-0.001)).is_err());
        assert!(DebtValue::new(dec!(-5)).is_err());
        assert!(Price::new(dec!(-2)).is_err());
        assert!(CollateralAmount::new(dec!(0)).is_ok());
    }

    #[test]
    fn test_rate_must_be_positive() {
        assert!(Rate::new(dec!(0)).is_err());
        assert!(Rate::new(dec!(-1)).is_err());
        assert_eq!(Rate::new(dec!(1)).unwrap(), Rate::ONE);
    }

    #[test]
    fn test_checked_sub_refuses_negative_result() {
        let a = coll(dec!(1));
        let b = coll(dec!(2));
        assert_eq!(b.checked_sub(a), Some(coll(dec!(1))));
        assert_eq!(a.checked_sub(b), None);
    }

    #[test]
    fn test_apply_delta() {
        let balance = coll(dec!(10));
        let up = CollateralDelta::increase(coll(dec!(2.5)));
        let down = CollateralDelta::decrease(coll(dec!(12.5)));

        assert_eq!(balance.checked_apply(up), Some(coll(dec!(12.5))));
        assert_eq!(balance.checked_apply(down), None);
        assert_eq!(
            balance.checked_apply(up).unwrap().checked_apply(down),
            Some(CollateralAmount::ZERO)
        );
    }

    #[test]
    fn test_delta_sign_helpers() {
        let up = DebtDelta::increase(debt(dec!(3)));
        let down = up.negated();

        assert!(up.is_increase() && !up.is_decrease());
        assert!(down.is_decrease() && !down.is_increase());
        assert!(DebtDelta::ZERO.is_zero());
        assert_eq!(down.magnitude(), debt(dec!(3)));
    }

    #[test]
    fn test_value_conversions() {
        let rate = Rate::new(dec!(1.05)).unwrap();
        let tab = debt(dec!(100)).value_at(rate).unwrap();
        assert_eq!(tab, value(dec!(105)));
        assert_eq!(tab.principal_at(rate), Some(debt(dec!(100))));

        let price = Price::new(dec!(3)).unwrap();
        let lot = value(dec!(12)).collateral_at(price).unwrap();
        assert_eq!(lot, coll(dec!(4)));
        assert_eq!(value(dec!(12)).collateral_at(Price::ZERO), None);
    }

    #[test]
    fn test_collateral_value_at_price() {
        let price = Price::new(dec!(1500)).unwrap();
        assert_eq!(coll(dec!(2)).value_at(price), Some(value(dec!(3000))));
    }

    #[test]
    fn test_signed_value_delta() {
        let rate = Rate::new(dec!(2)).unwrap();
        let repay = DebtDelta::decrease(debt(dec!(5)));
        let vd = repay.value_at(rate).unwrap();

        assert!(vd.is_decrease());
        assert_eq!(vd.magnitude(), value(dec!(10)));
        assert_eq!(value(dec!(4)).checked_apply(vd), None);
        assert_eq!(value(dec!(10)).checked_apply(vd), Some(DebtValue::ZERO));
    }

    #[test]
    fn test_ratio_of_whole() {
        assert_eq!(debt(dec!(1)).ratio_of(debt(dec!(4))), Some(dec!(0.25)));
        assert_eq!(debt(dec!(1)).ratio_of(DebtAmount::ZERO), None);
    }

    #[test]
    fn test_scaled_rejects_negative_factor() {
        assert_eq!(value(dec!(10)).scaled(dec!(1.13)), Some(value(dec!(11.3))));
        assert_eq!(value(dec!(10)).scaled(dec!(-1)), None);
        assert_eq!(Price::new(dec!(4)).unwrap().scaled(dec!(1.25)), Price::new(dec!(5)).ok());
    }

    #[test]
    fn test_checked_pow() {
        assert_eq!(checked_pow(dec!(0.1), 0), Some(dec!(1)));
        assert_eq!(checked_pow(dec!(0.1), 3), Some(dec!(0.001)));
        assert_eq!(checked_pow(dec!(2), 10), Some(dec!(1024)));
        // large bases overflow instead of wrapping
        assert_eq!(checked_pow(dec!(10), 40), None);
    }

    #[test]
    fn test_min_helpers() {
        assert_eq!(coll(dec!(2)).min(coll(dec!(3))), coll(dec!(2)));
        assert_eq!(value(dec!(7)).min(value(dec!(5))), value(dec!(5)));
        assert_eq!(debt(dec!(1)).min(debt(dec!(1))), debt(dec!(1)));
    }
}
