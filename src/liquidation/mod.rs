//! Liquidation module.
//!
//! This module turns undercollateralized loans into Dutch auctions:
//! - Liquidation trigger enforcing capacity ceilings and dust rules
//! - Auction engine running the sales of one collateral type
//! - Price-decay calculators shaping each auction's price curve

pub mod decay;
pub mod engine;
pub mod trigger;

pub use decay::*;
pub use engine::*;
pub use trigger::*;
