//! # Breakwater
//!
//! A permissioned over-collateralized lending ledger with Dutch-auction
//! liquidations, built as a deterministic in-process state machine.
//!
//! ## Architecture
//!
//! The system consists of three components behind one composition root:
//!
//! - **Core**: Typed units, identifiers, and the loan ledger
//! - **Liquidation**: The liquidation trigger, per-type auction engines,
//!   and pluggable price-decay curves
//! - **Market**: The assembled market with its event log
//!
//! External collaborators sit behind narrow traits: a price oracle
//! ([`oracle::PriceOracle`]), a bad-debt sink ([`sink::DebtSink`]), and
//! token gateways ([`adapters`]).
//!
//! ## Design Principles
//!
//! - **Atomic**: Every rejected operation leaves state untouched
//! - **Typed**: Units, ids, and rejections are distinct types, not raw numbers
//! - **Solvent**: Debt and collateral conservation hold after every mutation
//! - **Injected**: No globals; every collaborator is explicit state
//!
//! ## Example
//!
//! ```rust,ignore
//! use breakwater::prelude::*;
//!
//! // Assemble a market from a config file
//! let config = MarketConfig::load(path)?;
//! let mut market = Market::from_config(&config)?;
//!
//! // Liquidate an underwater loan into a Dutch auction
//! let sale = market.liquidate(collateral, owner, keeper, now)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod adapters;
pub mod config;
pub mod core;
pub mod error;
pub mod liquidation;
pub mod market;
pub mod oracle;
pub mod sink;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapters::{CollateralGateway, DebtGateway};
    pub use crate::config::{CollateralConfig, CurveConfig, MarketConfig, SinkConfig};
    pub use crate::core::{
        ids::{AccountId, CollateralId, EscrowId, SaleId},
        ledger::Ledger,
        units::{
            CollateralAmount, CollateralDelta, DebtAmount, DebtDelta, DebtValue, Price, Rate,
        },
    };
    pub use crate::error::{Error, Result};
    pub use crate::liquidation::{
        decay::{
            ExponentialDecrease, LinearDecrease, PriceCalculator,
            StairstepExponentialDecrease,
        },
        engine::{AuctionEngine, AuctionParams, AuctionStatus, Purchase, Sale},
        trigger::LiquidationTrigger,
    };
    pub use crate::market::{Market, MarketEvent};
    pub use crate::oracle::{PriceOracle, StaticOracle};
    pub use crate::sink::{DebtBuffer, DebtSink};
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// System name
pub const SYSTEM_NAME: &str = "breakwater";
