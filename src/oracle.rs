//! Price oracle interface.
//!
//! The market reads auction start prices and ledger spot prices through this
//! seam. Production feed pipelines (medianizers, delay buffers) live outside
//! the crate; `StaticOracle` is the in-memory table used for wiring, tests and
//! the simulator.

use std::collections::HashMap;

use crate::core::ids::CollateralId;
use crate::core::units::Price;
use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of current prices, one per collateral type
pub trait PriceOracle: Send + Sync {
    /// The current price for a collateral type
    ///
    /// `PriceUnavailable` when the feed has no valid reading; callers must
    /// treat that as a rejection and change no state.
    fn safe_price(&self, collateral: CollateralId) -> Result<Price>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATIC ORACLE
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory price table
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    prices: HashMap<CollateralId, Price>,
}

impl StaticOracle {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or replace the price for a collateral type
    pub fn set_price(&mut self, collateral: CollateralId, price: Price) {
        self.prices.insert(collateral, price);
    }

    /// Drop the price for a collateral type, making reads fail
    pub fn clear_price(&mut self, collateral: CollateralId) {
        self.prices.remove(&collateral);
    }
}

impl PriceOracle for StaticOracle {
    fn safe_price(&self, collateral: CollateralId) -> Result<Price> {
        self.prices
            .get(&collateral)
            .copied()
            .ok_or_else(|| Error::PriceUnavailable(collateral.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_static_oracle() {
        let eth = CollateralId::new("ETH").unwrap();
        let mut oracle = StaticOracle::new();
        assert!(matches!(
            oracle.safe_price(eth),
            Err(Error::PriceUnavailable(_))
        ));

        oracle.set_price(eth, Price::new(dec!(2000)).unwrap());
        assert_eq!(oracle.safe_price(eth).unwrap(), Price::new(dec!(2000)).unwrap());

        oracle.clear_price(eth);
        assert!(oracle.safe_price(eth).is_err());
    }
}
