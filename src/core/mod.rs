//! Core modules of the lending ledger.
//!
//! This module contains the fundamental building blocks:
//! - Identifiers for accounts, collateral types, escrows and sales
//! - Decimal-backed amount, value and rate newtypes
//! - Per-type collateral parameters and per-user loans
//! - The ledger itself: balances, loans and the debt counters

pub mod collateral;
pub mod ids;
pub mod ledger;
pub mod loan;
pub mod units;

pub use collateral::*;
pub use ids::*;
pub use ledger::*;
pub use loan::*;
pub use units::*;
