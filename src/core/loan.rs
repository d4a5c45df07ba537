//! A single collateralized position.

use serde::{Deserialize, Serialize};

use crate::core::units::{CollateralAmount, DebtAmount, DebtValue, Price, Rate};

/// One account's position in one collateral type
///
/// Loans are created lazily on first touch and never deleted, only drained
/// back to zero. The ledger hands out copies; all mutation goes through
/// ledger operations so the accounting identities stay intact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    /// Collateral locked behind the debt
    pub collateral_amount: CollateralAmount,
    /// Normalized debt principal
    pub debt_amount: DebtAmount,
}

impl Loan {
    /// An empty position
    pub const EMPTY: Self = Self {
        collateral_amount: CollateralAmount::ZERO,
        debt_amount: DebtAmount::ZERO,
    };

    /// Create a loan from its two balances
    pub fn new(collateral_amount: CollateralAmount, debt_amount: DebtAmount) -> Self {
        Self {
            collateral_amount,
            debt_amount,
        }
    }

    /// Rate-adjusted debt owed by this position
    pub fn tab(&self, rate: Rate) -> Option<DebtValue> {
        self.debt_amount.value_at(rate)
    }

    /// Value of the locked collateral at a spot price
    pub fn collateral_value(&self, price: Price) -> Option<DebtValue> {
        self.collateral_amount.value_at(price)
    }

    /// Whether the tab is fully covered by collateral value
    pub fn is_safe(&self, price: Price, rate: Rate) -> Option<bool> {
        let tab = self.tab(rate)?;
        let value = self.collateral_value(price)?;
        Some(tab <= value)
    }

    /// True when both balances are zero
    pub fn is_empty(&self) -> bool {
        self.collateral_amount.is_zero() && self.debt_amount.is_zero()
    }
}
