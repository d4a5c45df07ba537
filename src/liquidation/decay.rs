//! Price-decay calculators for Dutch auctions.
//!
//! Each auction carries a starting price; a calculator maps that price and the
//! elapsed time to the current asking price. All calculators are validated at
//! construction and monotone non-increasing in elapsed time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::units::{checked_pow, Price};
use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// CALCULATOR TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Maps an auction's starting price to its current asking price
pub trait PriceCalculator: Send + Sync + std::fmt::Debug {
    /// Asking price `elapsed_secs` after the auction started
    fn price(&self, start: Price, elapsed_secs: u64) -> Price;
}

// ═══════════════════════════════════════════════════════════════════════════════
// LINEAR DECREASE
// ═══════════════════════════════════════════════════════════════════════════════

/// Price falls linearly, reaching exactly zero at `max_duration`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinearDecrease {
    /// Seconds after which the price is zero
    max_duration: u64,
}

impl LinearDecrease {
    /// Create a linear decay over a positive duration
    pub fn new(max_duration: u64) -> Result<Self> {
        if max_duration == 0 {
            return Err(Error::InvalidParameter {
                name: "max_duration".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(Self { max_duration })
    }

    /// Seconds until the price reaches zero
    pub fn max_duration(&self) -> u64 {
        self.max_duration
    }
}

impl PriceCalculator for LinearDecrease {
    fn price(&self, start: Price, elapsed_secs: u64) -> Price {
        if elapsed_secs >= self.max_duration {
            return Price::ZERO;
        }
        let remaining = Decimal::from(self.max_duration - elapsed_secs);
        let ratio = remaining
            .checked_div(Decimal::from(self.max_duration))
            .unwrap_or(Decimal::ZERO);
        start.scaled(ratio).unwrap_or(Price::ZERO)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STAIRSTEP EXPONENTIAL DECREASE
// ═══════════════════════════════════════════════════════════════════════════════

/// Price multiplies by `factor` once per whole `step_secs` elapsed
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StairstepExponentialDecrease {
    /// Seconds between price drops
    step_secs: u64,
    /// Multiplier applied at each step, in `[0, 1]`
    factor: Decimal,
}

impl StairstepExponentialDecrease {
    /// Create a stairstep decay with a positive step and a factor in `[0, 1]`
    pub fn new(step_secs: u64, factor: Decimal) -> Result<Self> {
        if step_secs == 0 {
            return Err(Error::InvalidParameter {
                name: "step_secs".into(),
                reason: "must be positive".into(),
            });
        }
        validate_factor(factor)?;
        Ok(Self { step_secs, factor })
    }

    /// Seconds between price drops
    pub fn step_secs(&self) -> u64 {
        self.step_secs
    }

    /// Per-step multiplier
    pub fn factor(&self) -> Decimal {
        self.factor
    }
}

impl PriceCalculator for StairstepExponentialDecrease {
    fn price(&self, start: Price, elapsed_secs: u64) -> Price {
        let steps = elapsed_secs / self.step_secs;
        let scale = checked_pow(self.factor, steps).unwrap_or(Decimal::ZERO);
        start.scaled(scale).unwrap_or(Price::ZERO)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPONENTIAL DECREASE
// ═══════════════════════════════════════════════════════════════════════════════

/// Price multiplies by `factor` every second
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExponentialDecrease {
    /// Per-second multiplier, in `[0, 1]`
    factor: Decimal,
}

impl ExponentialDecrease {
    /// Create a continuous exponential decay with a factor in `[0, 1]`
    pub fn new(factor: Decimal) -> Result<Self> {
        validate_factor(factor)?;
        Ok(Self { factor })
    }

    /// Per-second multiplier
    pub fn factor(&self) -> Decimal {
        self.factor
    }
}

impl PriceCalculator for ExponentialDecrease {
    fn price(&self, start: Price, elapsed_secs: u64) -> Price {
        let scale = checked_pow(self.factor, elapsed_secs).unwrap_or(Decimal::ZERO);
        start.scaled(scale).unwrap_or(Price::ZERO)
    }
}

fn validate_factor(factor: Decimal) -> Result<()> {
    if factor < Decimal::ZERO || factor > Decimal::ONE {
        return Err(Error::InvalidParameter {
            name: "factor".into(),
            reason: format!("must be within [0, 1], got {}", factor),
        });
    }
    Ok(())
}
