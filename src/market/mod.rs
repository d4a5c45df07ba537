//! Market assembly.
//!
//! Wires the ledger, liquidation trigger, auction engines, oracle and debt
//! sink into a single [`Market`] value, and keeps a bounded event log of
//! every successful state change.

pub mod coordinator;
pub mod events;

pub use coordinator::Market;
pub use events::{EventLog, MarketEvent, DEFAULT_MAX_EVENTS};
