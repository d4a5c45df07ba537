//! Per-collateral-type state and risk parameters.

use serde::{Deserialize, Serialize};

use crate::core::units::{DebtAmount, DebtValue, Price, Rate};

/// Risk parameters and aggregate debt for one collateral type
///
/// `total_debt` is the sum of all loan principals of the type; the ledger is
/// the only writer. The spot price is the safe price used for solvency
/// checks, refreshed from an oracle by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralInfo {
    spot_price: Price,
    total_debt: DebtAmount,
    max_debt: DebtValue,
    min_debt: DebtValue,
    rate: Rate,
}

impl CollateralInfo {
    /// Create a collateral type with no debt issued yet
    pub fn new(spot_price: Price, max_debt: DebtValue, min_debt: DebtValue, rate: Rate) -> Self {
        Self {
            spot_price,
            total_debt: DebtAmount::ZERO,
            max_debt,
            min_debt,
            rate,
        }
    }

    /// Safe price used for solvency checks
    pub fn spot_price(&self) -> Price {
        self.spot_price
    }

    /// Sum of all loan principals of this type
    pub fn total_debt(&self) -> DebtAmount {
        self.total_debt
    }

    /// Per-type debt ceiling, in debt value
    pub fn max_debt(&self) -> DebtValue {
        self.max_debt
    }

    /// Dust floor: smallest non-zero tab a loan may carry
    pub fn min_debt(&self) -> DebtValue {
        self.min_debt
    }

    /// Cumulative interest factor
    pub fn rate(&self) -> Rate {
        self.rate
    }

    /// Rate-adjusted value of all outstanding debt of this type
    pub fn total_value(&self) -> Option<DebtValue> {
        self.total_debt.value_at(self.rate)
    }

    pub(crate) fn set_spot_price(&mut self, price: Price) {
        self.spot_price = price;
    }

    pub(crate) fn set_max_debt(&mut self, ceiling: DebtValue) {
        self.max_debt = ceiling;
    }

    pub(crate) fn set_min_debt(&mut self, floor: DebtValue) {
        self.min_debt = floor;
    }

    pub(crate) fn set_total_debt(&mut self, total: DebtAmount) {
        self.total_debt = total;
    }

    pub(crate) fn set_rate(&mut self, rate: Rate) {
        self.rate = rate;
    }
}
