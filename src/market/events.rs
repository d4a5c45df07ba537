//! Market event log.
//!
//! Every successful state change appends one event to a bounded in-memory
//! log, oldest entries pruned first. Rejections never log.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::core::ids::{AccountId, CollateralId, SaleId};
use crate::core::units::{CollateralAmount, DebtValue, Price};

/// Default capacity of the event log
pub const DEFAULT_MAX_EVENTS: usize = 1000;

// ═══════════════════════════════════════════════════════════════════════════════
// MARKET EVENT
// ═══════════════════════════════════════════════════════════════════════════════

/// A successful market state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketEvent {
    // Ledger events
    /// Collateral type listed on the market
    CollateralAdded {
        /// New collateral type
        collateral: CollateralId,
    },
    /// Account registered with self-consent
    AccountRegistered {
        /// Registered account
        account: AccountId,
    },
    /// Consent granted to a third party
    ConsentGranted {
        /// Account whose balances open up
        grantor: AccountId,
        /// Account receiving authority
        actor: AccountId,
    },
    /// Consent withdrawn
    ConsentRevoked {
        /// Account whose balances close
        grantor: AccountId,
        /// Account losing authority
        actor: AccountId,
    },
    /// Free collateral deposited or withdrawn
    CollateralModified {
        /// Collateral type
        collateral: CollateralId,
        /// Affected account
        user: AccountId,
        /// Signed change
        delta: Decimal,
    },
    /// Free collateral moved between accounts
    CollateralTransferred {
        /// Collateral type
        collateral: CollateralId,
        /// Debited account
        from: AccountId,
        /// Credited account
        to: AccountId,
        /// Amount moved
        amount: CollateralAmount,
    },
    /// Free debt moved between accounts
    DebtTransferred {
        /// Debited account
        from: AccountId,
        /// Credited account
        to: AccountId,
        /// Value moved
        amount: DebtValue,
    },
    /// Loan collateral or debt changed
    LoanModified {
        /// Collateral type
        collateral: CollateralId,
        /// Loan owner
        owner: AccountId,
        /// Signed collateral change
        delta_collateral: Decimal,
        /// Signed debt principal change
        delta_debt: Decimal,
    },
    /// Position rebalanced between two owners
    LoanSplit {
        /// Collateral type
        collateral: CollateralId,
        /// Position debited
        source: AccountId,
        /// Position credited
        destination: AccountId,
        /// Signed collateral change
        delta_collateral: Decimal,
        /// Signed debt principal change
        delta_debt: Decimal,
    },
    /// Interest accrued on a type
    InterestAccrued {
        /// Collateral type
        collateral: CollateralId,
        /// Rate increase
        delta: Decimal,
        /// Value credited to the fee recipient
        accrued: DebtValue,
    },
    /// Spot price replaced
    SpotPriceUpdated {
        /// Collateral type
        collateral: CollateralId,
        /// New safe price
        price: Price,
    },
    /// Bad debt settled against the sink
    DebtSettled {
        /// Value retired
        amount: DebtValue,
    },

    // Liquidation events
    /// Loan seized into a Dutch auction
    Liquidated {
        /// Collateral type
        collateral: CollateralId,
        /// Seized owner
        owner: AccountId,
        /// Opened sale
        sale: SaleId,
        /// Debt value the auction must raise
        tab: DebtValue,
    },
    /// Collateral bought out of an auction
    AuctionPurchase {
        /// Collateral type
        collateral: CollateralId,
        /// Sale hit
        sale: SaleId,
        /// Collateral handed over
        collateral_bought: CollateralAmount,
        /// Value paid
        cost: DebtValue,
        /// Whether the sale finished
        concluded: bool,
    },
    /// Stale auction restarted
    AuctionReset {
        /// Collateral type
        collateral: CollateralId,
        /// Restarted sale
        sale: SaleId,
    },
    /// Auction wound down administratively
    AuctionCancelled {
        /// Collateral type
        collateral: CollateralId,
        /// Removed sale
        sale: SaleId,
    },

    // Admin events
    /// A risk parameter changed
    ParameterChanged {
        /// Parameter name
        name: String,
    },
    /// Market closed for new risk
    MarketClosed,
}

impl MarketEvent {
    /// Event type as a string, for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CollateralAdded { .. } => "CollateralAdded",
            Self::AccountRegistered { .. } => "AccountRegistered",
            Self::ConsentGranted { .. } => "ConsentGranted",
            Self::ConsentRevoked { .. } => "ConsentRevoked",
            Self::CollateralModified { .. } => "CollateralModified",
            Self::CollateralTransferred { .. } => "CollateralTransferred",
            Self::DebtTransferred { .. } => "DebtTransferred",
            Self::LoanModified { .. } => "LoanModified",
            Self::LoanSplit { .. } => "LoanSplit",
            Self::InterestAccrued { .. } => "InterestAccrued",
            Self::SpotPriceUpdated { .. } => "SpotPriceUpdated",
            Self::DebtSettled { .. } => "DebtSettled",
            Self::Liquidated { .. } => "Liquidated",
            Self::AuctionPurchase { .. } => "AuctionPurchase",
            Self::AuctionReset { .. } => "AuctionReset",
            Self::AuctionCancelled { .. } => "AuctionCancelled",
            Self::ParameterChanged { .. } => "ParameterChanged",
            Self::MarketClosed => "MarketClosed",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Bounded in-memory log of market events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    events: VecDeque<MarketEvent>,
    max_events: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EVENTS)
    }
}

impl EventLog {
    /// Create a log keeping at most `max_events` entries
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max_events,
        }
    }

    /// Append an event, pruning the oldest beyond capacity
    pub fn record(&mut self, event: MarketEvent) {
        tracing::trace!(event = event.event_type(), "market event");
        self.events.push_back(event);
        while self.events.len() > self.max_events {
            self.events.pop_front();
        }
    }

    /// All retained events, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &MarketEvent> {
        self.events.iter()
    }

    /// Most recent event
    pub fn latest(&self) -> Option<&MarketEvent> {
        self.events.back()
    }

    /// Retained events of one type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&MarketEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
