//! Error types for the breakwater ledger.
//!
//! Rule rejections and fatal faults share one enum so that every operation
//! returns a single [`Result`], but the two kinds are distinguishable:
//! [`Error::is_rejection`] marks the expected, side-effect-free refusals
//! (consent missing, position unsafe, ceiling hit, ...) while
//! [`Error::is_fatal`] marks conditions that indicate a bug or a corrupted
//! state and should never occur in normal operation.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type alias for breakwater operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the breakwater ledger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Ledger Rejections
    // ═══════════════════════════════════════════════════════════════════

    /// Sender lacks consent from the account whose balances it is moving
    #[error("Not authorized: {grantor} has not consented to {actor}")]
    NotAuthorized {
        /// Account whose balances would be moved
        grantor: String,
        /// Account attempting the move
        actor: String,
    },

    /// Resulting position would not be covered by its collateral
    #[error("Undercollateralized: tab {tab} exceeds collateral value {collateral_value}")]
    Undercollateralized {
        /// Rate-adjusted debt after the change
        tab: Decimal,
        /// Collateral value at the spot price after the change
        collateral_value: Decimal,
    },

    /// A debt ceiling (per-type or system-wide) would be exceeded
    #[error("Debt ceiling exceeded: {current} over maximum {max}")]
    CeilingExceeded {
        /// Debt value after the change
        current: Decimal,
        /// Ceiling that blocks it
        max: Decimal,
    },

    /// Resulting tab would be non-zero but below the dust floor
    #[error("Tab {tab} below dust minimum {minimum}")]
    BelowDust {
        /// Rate-adjusted debt after the change
        tab: Decimal,
        /// Minimum non-zero tab allowed
        minimum: Decimal,
    },

    /// Ledger has been closed for new risk
    #[error("Market is closed")]
    MarketClosed,

    /// Token gateway has been shut and no longer accepts deposits
    #[error("Gateway for {0} is closed to deposits")]
    GatewayClosed(String),

    /// Free collateral balance cannot cover the debit
    #[error("Insufficient collateral: required {required}, available {available}")]
    InsufficientCollateral {
        /// Required collateral amount
        required: Decimal,
        /// Available collateral amount
        available: Decimal,
    },

    /// Free debt balance cannot cover the debit
    #[error("Insufficient debt balance: required {required}, available {available}")]
    InsufficientDebt {
        /// Required debt value
        required: Decimal,
        /// Available debt value
        available: Decimal,
    },

    /// Seized-debt balance cannot cover the settlement
    #[error("Insufficient seized debt: required {required}, available {available}")]
    InsufficientSeizedDebt {
        /// Required debt value
        required: Decimal,
        /// Available seized debt
        available: Decimal,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Liquidation Rejections
    // ═══════════════════════════════════════════════════════════════════

    /// Position is adequately collateralized and cannot be liquidated
    #[error("Loan {0} is healthy and cannot be liquidated")]
    LoanHealthy(String),

    /// Global or per-type auction capacity has no headroom left
    #[error("Liquidation capacity exhausted for {collateral}")]
    CapacityExhausted {
        /// Collateral type whose liquidation was refused
        collateral: String,
    },

    /// Liquidation slice would carry no collateral
    #[error("Liquidation would seize zero collateral")]
    NullAuction,

    // ═══════════════════════════════════════════════════════════════════
    // Auction Rejections
    // ═══════════════════════════════════════════════════════════════════

    /// No sale with this id is running
    #[error("Sale {0} not found")]
    SaleNotFound(u64),

    /// Sale price is stale; the auction needs a reset before purchases
    #[error("Sale {0} is stale and needs a reset")]
    StaleAuction(u64),

    /// Sale is still live and cannot be reset yet
    #[error("Sale {0} cannot be reset while live")]
    CannotReset(u64),

    /// Current auction price exceeds the buyer's limit
    #[error("Price {price} exceeds buyer maximum {max}")]
    TooExpensive {
        /// Current auction price
        price: Decimal,
        /// Buyer's maximum acceptable price
        max: Decimal,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Oracle Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Oracle has no usable price for this collateral type
    #[error("No price available for {0}")]
    PriceUnavailable(String),

    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Collateral type has not been registered with the ledger
    #[error("Unknown collateral type: {0}")]
    UnknownCollateral(String),

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Overflow or precision exhaustion in a checked calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Serialization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Internal accounting fault (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if this is an expected rule rejection that left state
    /// untouched, as opposed to a bug or a broken precondition.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::NotAuthorized { .. }
                | Error::Undercollateralized { .. }
                | Error::CeilingExceeded { .. }
                | Error::BelowDust { .. }
                | Error::MarketClosed
                | Error::GatewayClosed(_)
                | Error::InsufficientCollateral { .. }
                | Error::InsufficientDebt { .. }
                | Error::InsufficientSeizedDebt { .. }
                | Error::LoanHealthy(_)
                | Error::CapacityExhausted { .. }
                | Error::NullAuction
                | Error::SaleNotFound(_)
                | Error::StaleAuction(_)
                | Error::CannotReset(_)
                | Error::TooExpensive { .. }
        )
    }

    /// Returns true if this error indicates an internal fault requiring
    /// immediate attention
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Internal(_) | Error::Overflow { .. })
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Ledger rejections: 1xxx
            Error::NotAuthorized { .. } => 1001,
            Error::Undercollateralized { .. } => 1002,
            Error::CeilingExceeded { .. } => 1003,
            Error::BelowDust { .. } => 1004,
            Error::MarketClosed => 1005,
            Error::InsufficientCollateral { .. } => 1006,
            Error::InsufficientDebt { .. } => 1007,
            Error::InsufficientSeizedDebt { .. } => 1008,
            Error::GatewayClosed(_) => 1009,

            // Liquidation rejections: 2xxx
            Error::LoanHealthy(_) => 2001,
            Error::CapacityExhausted { .. } => 2002,
            Error::NullAuction => 2003,

            // Auction rejections: 3xxx
            Error::SaleNotFound(_) => 3001,
            Error::StaleAuction(_) => 3002,
            Error::CannotReset(_) => 3003,
            Error::TooExpensive { .. } => 3004,

            // Oracle errors: 4xxx
            Error::PriceUnavailable(_) => 4001,

            // Validation errors: 5xxx
            Error::UnknownCollateral(_) => 5001,
            Error::InvalidParameter { .. } => 5002,
            Error::Overflow { .. } => 5003,

            // Serialization errors: 6xxx
            Error::Serialization(_) => 6001,
            Error::Deserialization(_) => 6002,

            // Internal errors: 9xxx
            Error::Internal(_) => 9001,
        }
    }
}
