//! Token gateways.
//!
//! The boundary between external token custody and ledger balances. A
//! collateral gateway turns token deposits into free collateral and back; a
//! debt gateway moves free debt between users and its own float account,
//! standing in for mint/burn of an external token. Custody itself is outside
//! the crate; the gateways only perform the ledger legs.
//!
//! Each gateway has a one-way `live` switch: a shut gateway refuses deposits
//! but always honors withdrawals, so closing the system never traps funds.

use serde::{Deserialize, Serialize};

use crate::core::ids::{AccountId, CollateralId};
use crate::core::ledger::Ledger;
use crate::core::units::{CollateralAmount, CollateralDelta, DebtValue};
use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL GATEWAY
// ═══════════════════════════════════════════════════════════════════════════════

/// Deposit/withdraw surface for one collateral type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralGateway {
    /// Collateral type this gateway services
    collateral: CollateralId,
    /// Whether deposits are still accepted
    live: bool,
    /// Lifetime deposits
    total_deposited: CollateralAmount,
    /// Lifetime withdrawals
    total_withdrawn: CollateralAmount,
}

impl CollateralGateway {
    /// Create a live gateway for a collateral type
    pub fn new(collateral: CollateralId) -> Self {
        Self {
            collateral,
            live: true,
            total_deposited: CollateralAmount::ZERO,
            total_withdrawn: CollateralAmount::ZERO,
        }
    }

    /// Collateral type this gateway services
    pub fn collateral(&self) -> CollateralId {
        self.collateral
    }

    /// Whether deposits are still accepted
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Lifetime deposits
    pub fn total_deposited(&self) -> CollateralAmount {
        self.total_deposited
    }

    /// Lifetime withdrawals
    pub fn total_withdrawn(&self) -> CollateralAmount {
        self.total_withdrawn
    }

    /// Stop accepting deposits. One-way.
    pub fn shut(&mut self) {
        if self.live {
            self.live = false;
            tracing::warn!(collateral = %self.collateral, "collateral gateway shut");
        }
    }

    /// Credit deposited tokens to the user's free collateral
    pub fn deposit(
        &mut self,
        ledger: &mut Ledger,
        user: AccountId,
        amount: CollateralAmount,
    ) -> Result<()> {
        if !self.live {
            return Err(Error::GatewayClosed(self.collateral.to_string()));
        }
        let deposited = self
            .total_deposited
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow {
                operation: "gateway deposit total".into(),
            })?;
        ledger.modify_collateral(self.collateral, user, CollateralDelta::increase(amount))?;
        self.total_deposited = deposited;
        tracing::debug!(
            collateral = %self.collateral,
            user = %user.short(),
            amount = %amount,
            "collateral deposited"
        );
        Ok(())
    }

    /// Release free collateral back toward token custody
    pub fn withdraw(
        &mut self,
        ledger: &mut Ledger,
        user: AccountId,
        amount: CollateralAmount,
    ) -> Result<()> {
        let withdrawn = self
            .total_withdrawn
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow {
                operation: "gateway withdrawal total".into(),
            })?;
        ledger.modify_collateral(self.collateral, user, CollateralDelta::decrease(amount))?;
        self.total_withdrawn = withdrawn;
        tracing::debug!(
            collateral = %self.collateral,
            user = %user.short(),
            amount = %amount,
            "collateral withdrawn"
        );
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEBT GATEWAY
// ═══════════════════════════════════════════════════════════════════════════════

/// Deposit/withdraw surface for free debt
///
/// Holds a float of free debt in its own ledger account. A deposit moves debt
/// from the float to the user (tokens burned outside); a withdrawal moves the
/// user's debt into the float (tokens minted outside). The float account must
/// be registered so it carries self-consent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtGateway {
    /// Ledger account holding the float
    account: AccountId,
    /// Whether deposits are still accepted
    live: bool,
    /// Lifetime deposits
    total_deposited: DebtValue,
    /// Lifetime withdrawals
    total_withdrawn: DebtValue,
}

impl DebtGateway {
    /// Create a live gateway floating on `account`
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            live: true,
            total_deposited: DebtValue::ZERO,
            total_withdrawn: DebtValue::ZERO,
        }
    }

    /// Ledger account holding the float
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// Whether deposits are still accepted
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Lifetime deposits
    pub fn total_deposited(&self) -> DebtValue {
        self.total_deposited
    }

    /// Lifetime withdrawals
    pub fn total_withdrawn(&self) -> DebtValue {
        self.total_withdrawn
    }

    /// Stop accepting deposits. One-way.
    pub fn shut(&mut self) {
        if self.live {
            self.live = false;
            tracing::warn!(account = %self.account.short(), "debt gateway shut");
        }
    }

    /// Credit debt from the float to the user
    pub fn deposit(
        &mut self,
        ledger: &mut Ledger,
        user: AccountId,
        amount: DebtValue,
    ) -> Result<()> {
        if !self.live {
            return Err(Error::GatewayClosed("debt".into()));
        }
        let deposited = self
            .total_deposited
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow {
                operation: "gateway deposit total".into(),
            })?;
        ledger.transfer_debt(self.account, self.account, user, amount)?;
        self.total_deposited = deposited;
        tracing::debug!(user = %user.short(), amount = %amount, "debt deposited");
        Ok(())
    }

    /// Move the user's debt into the float
    pub fn withdraw(
        &mut self,
        ledger: &mut Ledger,
        user: AccountId,
        amount: DebtValue,
    ) -> Result<()> {
        let withdrawn = self
            .total_withdrawn
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow {
                operation: "gateway withdrawal total".into(),
            })?;
        ledger.transfer_debt(user, user, self.account, amount)?;
        self.total_withdrawn = withdrawn;
        tracing::debug!(user = %user.short(), amount = %amount, "debt withdrawn");
        Ok(())
    }
}
