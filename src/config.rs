//! Market configuration.
//!
//! Serde structs describing a complete market: system ceilings, the debt
//! sink, and per-collateral parameters including the decay curve choice.
//! A config file validates as a whole before any state is built, and
//! [`Market::from_config`] assembles a ready market from it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::collateral::CollateralInfo;
use crate::core::ids::{AccountId, CollateralId};
use crate::core::units::{DebtValue, Price, Rate};
use crate::error::{Error, Result};
use crate::liquidation::decay::{
    ExponentialDecrease, LinearDecrease, PriceCalculator, StairstepExponentialDecrease,
};
use crate::liquidation::engine::AuctionParams;
use crate::market::Market;
use crate::oracle::StaticOracle;
use crate::sink::DebtBuffer;

// ═══════════════════════════════════════════════════════════════════════════════
// CURVE CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Price-decay curve choice for one collateral type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CurveConfig {
    /// Linear decay to zero over a fixed duration
    Linear {
        /// Seconds from start price to zero
        max_duration_secs: u64,
    },
    /// Multiplicative decay applied once per whole step
    Stairstep {
        /// Seconds between price cuts
        step_secs: u64,
        /// Multiplier applied per step, in `[0, 1]`
        factor: Decimal,
    },
    /// Multiplicative decay applied every second
    Exponential {
        /// Multiplier applied per second, in `[0, 1]`
        factor: Decimal,
    },
}

impl CurveConfig {
    /// Construct the configured calculator
    pub fn build(&self) -> Result<Box<dyn PriceCalculator>> {
        Ok(match self {
            CurveConfig::Linear { max_duration_secs } => {
                Box::new(LinearDecrease::new(*max_duration_secs)?)
            }
            CurveConfig::Stairstep { step_secs, factor } => {
                Box::new(StairstepExponentialDecrease::new(*step_secs, *factor)?)
            }
            CurveConfig::Exponential { factor } => Box::new(ExponentialDecrease::new(*factor)?),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKET CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Debt sink configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Label hashed into the sink's account id
    pub account: String,
    /// Seconds queued bad debt waits before it can be settled
    pub maturation_delay_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            account: "sink".into(),
            maturation_delay_secs: 0,
        }
    }
}

/// Parameters of one listed collateral type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralConfig {
    /// Asset symbol, ASCII, at most 12 bytes
    pub symbol: String,
    /// Initial safe price, also seeded into the oracle
    pub spot_price: Decimal,
    /// Debt value ceiling of the type
    pub max_debt: Decimal,
    /// Dust floor below which no loan debt may fall
    pub min_debt: Decimal,
    /// Liquidation penalty multiplier, `>= 1`
    pub penalty: Decimal,
    /// Capacity ceiling for this type's auctions
    pub max_auction_cost: Decimal,
    /// Price-decay curve of this type's auctions
    pub curve: CurveConfig,
    /// Auction engine tuning
    #[serde(default)]
    pub auction: AuctionParams,
}

/// Complete market description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// System-wide debt value ceiling
    pub system_max_debt: Decimal,
    /// Global capacity ceiling across all auctions
    pub max_auction_cost: Decimal,
    /// Debt sink wiring
    #[serde(default)]
    pub sink: SinkConfig,
    /// Listed collateral types
    pub collaterals: Vec<CollateralConfig>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            system_max_debt: Decimal::ZERO,
            max_auction_cost: Decimal::ZERO,
            sink: SinkConfig::default(),
            collaterals: Vec::new(),
        }
    }
}

impl MarketConfig {
    /// Validate the whole description without building anything
    pub fn validate(&self) -> Result<()> {
        DebtValue::new(self.system_max_debt).map_err(|_| Error::InvalidParameter {
            name: "system_max_debt".into(),
            reason: format!("must not be negative, got {}", self.system_max_debt),
        })?;
        DebtValue::new(self.max_auction_cost).map_err(|_| Error::InvalidParameter {
            name: "max_auction_cost".into(),
            reason: format!("must not be negative, got {}", self.max_auction_cost),
        })?;
        if self.sink.account.is_empty() {
            return Err(Error::InvalidParameter {
                name: "sink.account".into(),
                reason: "must not be empty".into(),
            });
        }
        for entry in &self.collaterals {
            entry.validate()?;
        }
        let mut symbols: Vec<&str> = self.collaterals.iter().map(|c| c.symbol.as_str()).collect();
        symbols.sort_unstable();
        symbols.dedup();
        if symbols.len() != self.collaterals.len() {
            return Err(Error::InvalidParameter {
                name: "collaterals".into(),
                reason: "duplicate symbol".into(),
            });
        }
        Ok(())
    }

    /// Load a market description from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Deserialization(format!("{}: {}", path.display(), e)))?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| Error::Deserialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save the description to a JSON file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Serialization(format!("{}: {}", parent.display(), e)))?;
        }
        std::fs::write(path, content)
            .map_err(|e| Error::Serialization(format!("{}: {}", path.display(), e)))
    }
}

impl CollateralConfig {
    /// Validate one type's parameters, including the curve
    pub fn validate(&self) -> Result<()> {
        CollateralId::new(&self.symbol)?;
        Price::new(self.spot_price).map_err(|_| Error::InvalidParameter {
            name: format!("{}.spot_price", self.symbol),
            reason: format!("must not be negative, got {}", self.spot_price),
        })?;
        DebtValue::new(self.max_debt).map_err(|_| Error::InvalidParameter {
            name: format!("{}.max_debt", self.symbol),
            reason: format!("must not be negative, got {}", self.max_debt),
        })?;
        DebtValue::new(self.min_debt).map_err(|_| Error::InvalidParameter {
            name: format!("{}.min_debt", self.symbol),
            reason: format!("must not be negative, got {}", self.min_debt),
        })?;
        DebtValue::new(self.max_auction_cost).map_err(|_| Error::InvalidParameter {
            name: format!("{}.max_auction_cost", self.symbol),
            reason: format!("must not be negative, got {}", self.max_auction_cost),
        })?;
        if self.penalty < Decimal::ONE {
            return Err(Error::InvalidParameter {
                name: format!("{}.penalty", self.symbol),
                reason: format!("must be at least 1, got {}", self.penalty),
            });
        }
        self.curve.build()?;
        self.auction.validate()
    }
}

impl Market<StaticOracle, DebtBuffer> {
    /// Assemble a market with a static oracle and a debt buffer from a
    /// validated description
    pub fn from_config(config: &MarketConfig) -> Result<Self> {
        config.validate()?;
        let sink_account = AccountId::named(&config.sink.account);
        let mut market = Market::new(
            DebtValue::new(config.system_max_debt)?,
            DebtValue::new(config.max_auction_cost)?,
            StaticOracle::new(),
            DebtBuffer::new(sink_account, config.sink.maturation_delay_secs),
        );
        for entry in &config.collaterals {
            let collateral = CollateralId::new(&entry.symbol)?;
            let spot = Price::new(entry.spot_price)?;
            market.oracle_mut().set_price(collateral, spot);
            market.add_collateral(
                collateral,
                CollateralInfo::new(
                    spot,
                    DebtValue::new(entry.max_debt)?,
                    DebtValue::new(entry.min_debt)?,
                    Rate::ONE,
                ),
                entry.penalty,
                DebtValue::new(entry.max_auction_cost)?,
                entry.curve.build()?,
                entry.auction,
            )?;
        }
        Ok(market)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::PriceOracle;
    use rust_decimal_macros::dec;

    fn sample_config() -> MarketConfig {
        MarketConfig {
            system_max_debt: dec!(100000),
            max_auction_cost: dec!(10000),
            sink: SinkConfig {
                account: "buffer".into(),
                maturation_delay_secs: 60,
            },
            collaterals: vec![
                CollateralConfig {
                    symbol: "ETH".into(),
                    spot_price: dec!(2000),
                    max_debt: dec!(50000),
                    min_debt: dec!(100),
                    penalty: dec!(1.13),
                    max_auction_cost: dec!(5000),
                    curve: CurveConfig::Linear {
                        max_duration_secs: 7200,
                    },
                    auction: AuctionParams::default(),
                },
                CollateralConfig {
                    symbol: "WBTC".into(),
                    spot_price: dec!(40000),
                    max_debt: dec!(30000),
                    min_debt: dec!(200),
                    penalty: dec!(1.2),
                    max_auction_cost: dec!(8000),
                    curve: CurveConfig::Stairstep {
                        step_secs: 90,
                        factor: dec!(0.99),
                    },
                    auction: AuctionParams::default(),
                },
            ],
        }
    }

    #[test]
    fn test_validate_accepts_sample() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_penalty() {
        let mut config = sample_config();
        config.collaterals[0].penalty = dec!(0.9);
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_symbols() {
        let mut config = sample_config();
        config.collaterals[1].symbol = "ETH".into();
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_curve() {
        let mut config = sample_config();
        config.collaterals[0].curve = CurveConfig::Exponential { factor: dec!(1.5) };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_from_config_builds_market() {
        let config = sample_config();
        let market = Market::from_config(&config).unwrap();

        let eth = CollateralId::new("ETH").unwrap();
        let wbtc = CollateralId::new("WBTC").unwrap();
        assert_eq!(market.ledger().collateral_ids(), vec![eth, wbtc]);
        assert_eq!(
            market.ledger().collateral_info(eth).unwrap().spot_price(),
            Price::new(dec!(2000)).unwrap()
        );
        assert_eq!(
            market.oracle().safe_price(wbtc).unwrap(),
            Price::new(dec!(40000)).unwrap()
        );
        // engine sale floor is dust scaled by penalty
        assert_eq!(
            market.engine(eth).unwrap().min_sale_target(),
            DebtValue::new(dec!(113)).unwrap()
        );
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = sample_config();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: MarketConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
