//! Debt sink interface.
//!
//! Seized debt is recognized against a sink account: the ledger books the bad
//! debt there and auction proceeds flow back to the same account. The sink's
//! own resolution machinery (deficit and surplus auctions) is external; this
//! module carries only the queued-bad-debt bookkeeping the trigger needs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::ids::AccountId;
use crate::core::ledger::Ledger;
use crate::core::units::DebtValue;
use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// SINK TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Account against which bad debt is recognized
pub trait DebtSink: Send + Sync {
    /// The sink's ledger account
    fn account(&self) -> AccountId;

    /// Note freshly seized debt; the ledger has already booked it
    fn record_bad_debt(&mut self, amount: DebtValue, now: u64) -> Result<()>;

    /// Burn the sink's free debt against its seized debt
    fn settle(&mut self, ledger: &mut Ledger, amount: DebtValue) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEBT BUFFER
// ═══════════════════════════════════════════════════════════════════════════════

/// Sink that holds seized debt in a maturation queue
///
/// Freshly seized debt cannot be settled until `maturation_delay` seconds have
/// passed, giving the matching auction time to raise proceeds first. Settling
/// is capped at the matured share of the sink's seized-debt balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtBuffer {
    /// Ledger account the bad debt is booked against
    account: AccountId,
    /// Seized debt by seizure timestamp, not yet matured
    queue: BTreeMap<u64, DebtValue>,
    /// Sum of the queue
    queued_total: DebtValue,
    /// Seconds before queued debt becomes settleable
    maturation_delay: u64,
    /// Lifetime seized debt routed through this sink
    total_recorded: DebtValue,
}

impl DebtBuffer {
    /// Create a buffer booking debt against `account`
    pub fn new(account: AccountId, maturation_delay: u64) -> Self {
        Self {
            account,
            queue: BTreeMap::new(),
            queued_total: DebtValue::ZERO,
            maturation_delay,
            total_recorded: DebtValue::ZERO,
        }
    }

    /// Debt still waiting out its maturation delay
    pub fn queued_total(&self) -> DebtValue {
        self.queued_total
    }

    /// Seconds before queued debt becomes settleable
    pub fn maturation_delay(&self) -> u64 {
        self.maturation_delay
    }

    /// Lifetime seized debt routed through this sink
    pub fn total_recorded(&self) -> DebtValue {
        self.total_recorded
    }

    /// Release every queue entry older than the maturation delay
    ///
    /// Returns the total released. Idempotent between seizures.
    pub fn mature(&mut self, now: u64) -> DebtValue {
        let cutoff = match now.checked_sub(self.maturation_delay) {
            Some(c) => c,
            None => return DebtValue::ZERO,
        };
        let ready: Vec<u64> = self.queue.range(..=cutoff).map(|(&t, _)| t).collect();
        let mut released = DebtValue::ZERO;
        for timestamp in ready {
            if let Some(amount) = self.queue.remove(&timestamp) {
                released = released.checked_add(amount).unwrap_or(released);
                self.queued_total = self
                    .queued_total
                    .checked_sub(amount)
                    .unwrap_or(DebtValue::ZERO);
            }
        }
        if !released.is_zero() {
            tracing::debug!(released = %released, "queued bad debt matured");
        }
        released
    }
}

impl DebtSink for DebtBuffer {
    fn account(&self) -> AccountId {
        self.account
    }

    fn record_bad_debt(&mut self, amount: DebtValue, now: u64) -> Result<()> {
        let slot = self.queue.entry(now).or_insert(DebtValue::ZERO);
        *slot = slot.checked_add(amount).ok_or_else(|| Error::Overflow {
            operation: "queued bad debt".into(),
        })?;
        self.queued_total =
            self.queued_total
                .checked_add(amount)
                .ok_or_else(|| Error::Overflow {
                    operation: "queued bad debt total".into(),
                })?;
        self.total_recorded = self
            .total_recorded
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow {
                operation: "recorded bad debt".into(),
            })?;
        tracing::debug!(amount = %amount, timestamp = now, "bad debt queued");
        Ok(())
    }

    fn settle(&mut self, ledger: &mut Ledger, amount: DebtValue) -> Result<()> {
        let seized = ledger.seized_debt(self.account);
        let matured = seized
            .checked_sub(self.queued_total)
            .unwrap_or(DebtValue::ZERO);
        if amount > matured {
            return Err(Error::InsufficientSeizedDebt {
                required: amount.raw(),
                available: matured.raw(),
            });
        }
        ledger.settle_debt(self.account, amount)
    }
}
