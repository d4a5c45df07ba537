//! The collateralized-debt ledger.
//!
//! Single-writer kernel holding every balance the system recognizes:
//! - Loans (collateral locked behind normalized debt principal), per type
//! - Free collateral and free debt balances
//! - Seized (bad) debt balances and escrowed auction collateral
//! - Per-type risk parameters and the global counters
//!
//! Every mutator validates its full rule set against a prospective state and
//! commits only when all rules pass, so a typed rejection never leaves a
//! partially-applied change behind. Authorization is a consent matrix:
//! `allows(grantor, actor)` says `actor` may move `grantor`'s balances, and
//! self-consent is populated explicitly on registration, never assumed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::core::collateral::CollateralInfo;
use crate::core::ids::{AccountId, CollateralId, EscrowId};
use crate::core::loan::Loan;
use crate::core::units::{
    CollateralAmount, CollateralDelta, DebtAmount, DebtDelta, DebtValue, Price, ValueDelta,
};
use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// The permissioned lending ledger
///
/// All maps are flat with composite keys; no balance is reachable through two
/// paths. The ledger is the only writer of loan state, per-type totals and the
/// global debt counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    infos: HashMap<CollateralId, CollateralInfo>,
    loans: HashMap<(CollateralId, AccountId), Loan>,
    free_collateral: HashMap<(CollateralId, AccountId), CollateralAmount>,
    free_debt: HashMap<AccountId, DebtValue>,
    seized_debt: HashMap<AccountId, DebtValue>,
    escrows: HashMap<(EscrowId, CollateralId), CollateralAmount>,
    next_escrow_id: u64,
    accounts: HashSet<AccountId>,
    consents: HashSet<(AccountId, AccountId)>,
    open: bool,
    system_max_debt: DebtValue,
    total_debt_issued: DebtValue,
    total_seized_debt: DebtValue,
}

impl Ledger {
    /// Create an open ledger with a system-wide debt ceiling
    pub fn new(system_max_debt: DebtValue) -> Self {
        Self {
            infos: HashMap::new(),
            loans: HashMap::new(),
            free_collateral: HashMap::new(),
            free_debt: HashMap::new(),
            seized_debt: HashMap::new(),
            escrows: HashMap::new(),
            next_escrow_id: 0,
            accounts: HashSet::new(),
            consents: HashSet::new(),
            open: true,
            system_max_debt,
            total_debt_issued: DebtValue::ZERO,
            total_seized_debt: DebtValue::ZERO,
        }
    }

    /// Whether the ledger still accepts new risk
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// System-wide debt ceiling
    pub fn system_max_debt(&self) -> DebtValue {
        self.system_max_debt
    }

    /// Total free debt in circulation
    pub fn total_debt_issued(&self) -> DebtValue {
        self.total_debt_issued
    }

    /// Total recognized bad debt
    pub fn total_seized_debt(&self) -> DebtValue {
        self.total_seized_debt
    }

    /// A user's position in one collateral type, zero if never touched
    pub fn loan(&self, collateral: CollateralId, owner: AccountId) -> Loan {
        self.loans
            .get(&(collateral, owner))
            .copied()
            .unwrap_or_default()
    }

    /// A user's unlocked collateral of one type
    pub fn free_collateral(&self, collateral: CollateralId, user: AccountId) -> CollateralAmount {
        self.free_collateral
            .get(&(collateral, user))
            .copied()
            .unwrap_or_default()
    }

    /// A user's free debt balance
    pub fn free_debt(&self, user: AccountId) -> DebtValue {
        self.free_debt.get(&user).copied().unwrap_or_default()
    }

    /// A user's recognized bad-debt balance
    pub fn seized_debt(&self, user: AccountId) -> DebtValue {
        self.seized_debt.get(&user).copied().unwrap_or_default()
    }

    /// Parameters and totals for a collateral type
    pub fn collateral_info(&self, collateral: CollateralId) -> Result<&CollateralInfo> {
        self.infos
            .get(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))
    }

    /// Registered collateral types, sorted for deterministic iteration
    pub fn collateral_ids(&self) -> Vec<CollateralId> {
        let mut ids: Vec<CollateralId> = self.infos.keys().copied().collect();
        ids.sort();
        ids
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::MarketClosed)
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCOUNTS AND CONSENT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register an account, populating its self-consent. Idempotent.
    pub fn register_account(&mut self, user: AccountId) {
        if self.accounts.insert(user) {
            self.consents.insert((user, user));
            tracing::debug!(account = %user.short(), "account registered");
        }
    }

    /// Whether an account has been registered
    pub fn is_registered(&self, user: AccountId) -> bool {
        self.accounts.contains(&user)
    }

    /// Let `actor` move `grantor`'s balances; the grantor must be registered
    pub fn grant_consent(&mut self, grantor: AccountId, actor: AccountId) -> Result<()> {
        if !self.accounts.contains(&grantor) {
            return Err(Error::InvalidParameter {
                name: "grantor".into(),
                reason: "account not registered".into(),
            });
        }
        self.consents.insert((grantor, actor));
        Ok(())
    }

    /// Withdraw a previously granted consent
    pub fn revoke_consent(&mut self, grantor: AccountId, actor: AccountId) {
        self.consents.remove(&(grantor, actor));
    }

    /// Whether `actor` may move `grantor`'s balances
    pub fn allows(&self, grantor: AccountId, actor: AccountId) -> bool {
        self.consents.contains(&(grantor, actor))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // COLLATERAL TYPES AND ADMIN
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register a collateral type; the symbol must be unused
    pub fn add_collateral_type(
        &mut self,
        collateral: CollateralId,
        info: CollateralInfo,
    ) -> Result<()> {
        if self.infos.contains_key(&collateral) {
            return Err(Error::InvalidParameter {
                name: "collateral".into(),
                reason: format!("type {} already registered", collateral),
            });
        }
        self.infos.insert(collateral, info);
        tracing::info!(collateral = %collateral, "collateral type added");
        Ok(())
    }

    /// Replace the system-wide debt ceiling
    pub fn set_system_max_debt(&mut self, ceiling: DebtValue) {
        self.system_max_debt = ceiling;
        tracing::info!(ceiling = %ceiling, "system debt ceiling updated");
    }

    /// Replace a per-type debt ceiling
    pub fn set_max_debt(&mut self, collateral: CollateralId, ceiling: DebtValue) -> Result<()> {
        let info = self
            .infos
            .get_mut(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))?;
        info.set_max_debt(ceiling);
        Ok(())
    }

    /// Replace a per-type dust floor
    pub fn set_min_debt(&mut self, collateral: CollateralId, floor: DebtValue) -> Result<()> {
        let info = self
            .infos
            .get_mut(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))?;
        info.set_min_debt(floor);
        Ok(())
    }

    /// Replace the safe spot price of a type
    pub fn set_spot_price(&mut self, collateral: CollateralId, price: Price) -> Result<()> {
        let info = self
            .infos
            .get_mut(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))?;
        info.set_spot_price(price);
        tracing::debug!(collateral = %collateral, price = %price, "spot price updated");
        Ok(())
    }

    /// Close the ledger for new risk. One-way.
    pub fn close(&mut self) {
        if self.open {
            self.open = false;
            tracing::warn!("ledger closed for new risk");
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // FREE BALANCE OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Adjust a user's free collateral. Deposit/withdraw primitive for token
    /// adapters; no solvency check, but the balance may not go negative.
    pub fn modify_collateral(
        &mut self,
        collateral: CollateralId,
        user: AccountId,
        delta: CollateralDelta,
    ) -> Result<()> {
        self.collateral_info(collateral)?;
        let balance = self.free_collateral(collateral, user);
        let updated = match balance.checked_apply(delta) {
            Some(v) => v,
            None if delta.is_decrease() => {
                return Err(Error::InsufficientCollateral {
                    required: delta.magnitude().raw(),
                    available: balance.raw(),
                })
            }
            None => {
                return Err(Error::Overflow {
                    operation: "free collateral".into(),
                })
            }
        };
        self.free_collateral.insert((collateral, user), updated);
        tracing::debug!(
            collateral = %collateral,
            user = %user.short(),
            delta = %delta,
            "free collateral adjusted"
        );
        Ok(())
    }

    /// Move free collateral between accounts on the sender's authority
    pub fn transfer_collateral(
        &mut self,
        collateral: CollateralId,
        sender: AccountId,
        from: AccountId,
        to: AccountId,
        amount: CollateralAmount,
    ) -> Result<()> {
        self.collateral_info(collateral)?;
        self.ensure_open()?;
        if !self.allows(from, sender) {
            return Err(Error::NotAuthorized {
                grantor: from.short(),
                actor: sender.short(),
            });
        }
        let source = self.free_collateral(collateral, from);
        let debited = source
            .checked_sub(amount)
            .ok_or_else(|| Error::InsufficientCollateral {
                required: amount.raw(),
                available: source.raw(),
            })?;
        // a self-transfer is the identity once validated
        if from == to {
            return Ok(());
        }
        let credited = self
            .free_collateral(collateral, to)
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow {
                operation: "free collateral transfer".into(),
            })?;
        self.free_collateral.insert((collateral, from), debited);
        self.free_collateral.insert((collateral, to), credited);
        tracing::debug!(
            collateral = %collateral,
            from = %from.short(),
            to = %to.short(),
            amount = %amount,
            "collateral transferred"
        );
        Ok(())
    }

    /// Move free debt between accounts on the sender's authority
    pub fn transfer_debt(
        &mut self,
        sender: AccountId,
        from: AccountId,
        to: AccountId,
        amount: DebtValue,
    ) -> Result<()> {
        self.ensure_open()?;
        if !self.allows(from, sender) {
            return Err(Error::NotAuthorized {
                grantor: from.short(),
                actor: sender.short(),
            });
        }
        let source = self.free_debt(from);
        let debited = source
            .checked_sub(amount)
            .ok_or_else(|| Error::InsufficientDebt {
                required: amount.raw(),
                available: source.raw(),
            })?;
        if from == to {
            return Ok(());
        }
        let credited = self
            .free_debt(to)
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow {
                operation: "free debt transfer".into(),
            })?;
        self.free_debt.insert(from, debited);
        self.free_debt.insert(to, credited);
        tracing::debug!(
            from = %from.short(),
            to = %to.short(),
            amount = %amount,
            "debt transferred"
        );
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LOAN OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Pure de-risking: collateral does not fall and debt does not rise
    fn is_pure_derisking(delta_collateral: CollateralDelta, delta_debt: DebtDelta) -> bool {
        !delta_collateral.is_decrease() && !delta_debt.is_increase()
    }

    /// Blanket consent: any risk-adding move needs the owner's consent
    fn owner_consents(
        &self,
        owner: AccountId,
        sender: AccountId,
        delta_collateral: CollateralDelta,
        delta_debt: DebtDelta,
    ) -> bool {
        Self::is_pure_derisking(delta_collateral, delta_debt) || self.allows(owner, sender)
    }

    /// Releasing loan collateral needs the owner's consent
    fn collateral_release_consented(
        &self,
        owner: AccountId,
        sender: AccountId,
        delta_collateral: CollateralDelta,
    ) -> bool {
        !delta_collateral.is_decrease() || self.allows(owner, sender)
    }

    /// Drawing fresh debt to the owner needs the owner's consent
    fn debt_draw_consented(
        &self,
        owner: AccountId,
        sender: AccountId,
        delta_debt: DebtDelta,
    ) -> bool {
        !delta_debt.is_increase() || self.allows(owner, sender)
    }

    /// Repaying spends the owner's free debt, which needs the owner's consent
    fn debt_repayment_consented(
        &self,
        owner: AccountId,
        sender: AccountId,
        delta_debt: DebtDelta,
    ) -> bool {
        !delta_debt.is_decrease() || self.allows(owner, sender)
    }

    /// The single loan mutator
    ///
    /// Applies `delta_collateral` and `delta_debt` to the owner's loan,
    /// debiting the sender's free collateral and crediting the owner's free
    /// debt by `delta_debt × rate`. Succeeds only if every rule passes:
    /// ceilings, collateralization, consent and dust, in that order. A
    /// rejection leaves all state untouched.
    pub fn modify_loan(
        &mut self,
        collateral: CollateralId,
        owner: AccountId,
        sender: AccountId,
        delta_collateral: CollateralDelta,
        delta_debt: DebtDelta,
    ) -> Result<()> {
        let info = self.collateral_info(collateral)?;
        let rate = info.rate();
        let spot = info.spot_price();
        let max_debt = info.max_debt();
        let min_debt = info.min_debt();
        let type_total = info.total_debt();

        self.ensure_open()?;

        let loan = self.loan(collateral, owner);
        let new_collateral = match loan.collateral_amount.checked_apply(delta_collateral) {
            Some(v) => v,
            None if delta_collateral.is_decrease() => {
                return Err(Error::InsufficientCollateral {
                    required: delta_collateral.magnitude().raw(),
                    available: loan.collateral_amount.raw(),
                })
            }
            None => {
                return Err(Error::Overflow {
                    operation: "loan collateral".into(),
                })
            }
        };
        let new_debt = match loan.debt_amount.checked_apply(delta_debt) {
            Some(v) => v,
            None if delta_debt.is_decrease() => {
                return Err(Error::InsufficientDebt {
                    required: delta_debt.magnitude().raw(),
                    available: loan.debt_amount.raw(),
                })
            }
            None => {
                return Err(Error::Overflow {
                    operation: "loan debt".into(),
                })
            }
        };
        let new_type_total = match type_total.checked_apply(delta_debt) {
            Some(v) => v,
            None if delta_debt.is_decrease() => {
                return Err(Error::Internal(format!(
                    "type total below loan debt for {}",
                    collateral
                )))
            }
            None => {
                return Err(Error::Overflow {
                    operation: "type total debt".into(),
                })
            }
        };
        let new_tab = new_debt.value_at(rate).ok_or_else(|| Error::Overflow {
            operation: "tab".into(),
        })?;
        let tab_delta = delta_debt
            .value_at(rate)
            .ok_or_else(|| Error::Overflow {
                operation: "tab delta".into(),
            })?;
        let new_issued = match self.total_debt_issued.checked_apply(tab_delta) {
            Some(v) => v,
            None if tab_delta.is_decrease() => {
                return Err(Error::Internal("debt issued below owner balance".into()))
            }
            None => {
                return Err(Error::Overflow {
                    operation: "total debt issued".into(),
                })
            }
        };

        // (a) ceilings bind only when debt increases
        if delta_debt.is_increase() {
            let type_value =
                new_type_total
                    .value_at(rate)
                    .ok_or_else(|| Error::Overflow {
                        operation: "type debt value".into(),
                    })?;
            if type_value > max_debt {
                return Err(Error::CeilingExceeded {
                    current: type_value.raw(),
                    max: max_debt.raw(),
                });
            }
            if new_issued > self.system_max_debt {
                return Err(Error::CeilingExceeded {
                    current: new_issued.raw(),
                    max: self.system_max_debt.raw(),
                });
            }
        }

        // (b) the resulting position must be covered unless purely de-risking
        if !Self::is_pure_derisking(delta_collateral, delta_debt) {
            let collateral_value =
                new_collateral
                    .value_at(spot)
                    .ok_or_else(|| Error::Overflow {
                        operation: "collateral value".into(),
                    })?;
            if new_tab > collateral_value {
                return Err(Error::Undercollateralized {
                    tab: new_tab.raw(),
                    collateral_value: collateral_value.raw(),
                });
            }
        }

        // (c) consent, as four named rules
        if !self.owner_consents(owner, sender, delta_collateral, delta_debt)
            || !self.collateral_release_consented(owner, sender, delta_collateral)
            || !self.debt_draw_consented(owner, sender, delta_debt)
            || !self.debt_repayment_consented(owner, sender, delta_debt)
        {
            return Err(Error::NotAuthorized {
                grantor: owner.short(),
                actor: sender.short(),
            });
        }

        // (d) dust
        if !new_tab.is_zero() && new_tab < min_debt {
            return Err(Error::BelowDust {
                tab: new_tab.raw(),
                minimum: min_debt.raw(),
            });
        }

        // balance legs
        let sender_free = self.free_collateral(collateral, sender);
        let new_sender_free = match sender_free.checked_apply(delta_collateral.negated()) {
            Some(v) => v,
            None if delta_collateral.is_increase() => {
                return Err(Error::InsufficientCollateral {
                    required: delta_collateral.magnitude().raw(),
                    available: sender_free.raw(),
                })
            }
            None => {
                return Err(Error::Overflow {
                    operation: "sender free collateral".into(),
                })
            }
        };
        let owner_debt = self.free_debt(owner);
        let new_owner_debt = match owner_debt.checked_apply(tab_delta) {
            Some(v) => v,
            None if tab_delta.is_decrease() => {
                return Err(Error::InsufficientDebt {
                    required: tab_delta.magnitude().raw(),
                    available: owner_debt.raw(),
                })
            }
            None => {
                return Err(Error::Overflow {
                    operation: "owner free debt".into(),
                })
            }
        };

        // commit
        let info = self
            .infos
            .get_mut(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))?;
        info.set_total_debt(new_type_total);
        self.loans
            .insert((collateral, owner), Loan::new(new_collateral, new_debt));
        self.free_collateral
            .insert((collateral, sender), new_sender_free);
        self.free_debt.insert(owner, new_owner_debt);
        self.total_debt_issued = new_issued;
        tracing::debug!(
            collateral = %collateral,
            owner = %owner.short(),
            delta_collateral = %delta_collateral,
            delta_debt = %delta_debt,
            "loan modified"
        );
        Ok(())
    }

    /// Atomically rebalance two positions of one type
    ///
    /// Positive deltas move from `source` to `destination`. Both parties must
    /// have consented to the sender, both resulting positions must be covered,
    /// and each resulting tab must be zero or above the dust floor. Free
    /// balances and the per-type total are unchanged.
    pub fn split_loan(
        &mut self,
        collateral: CollateralId,
        sender: AccountId,
        source: AccountId,
        destination: AccountId,
        delta_collateral: CollateralDelta,
        delta_debt: DebtDelta,
    ) -> Result<()> {
        let info = self.collateral_info(collateral)?;
        let rate = info.rate();
        let spot = info.spot_price();
        let min_debt = info.min_debt();

        self.ensure_open()?;

        if source == destination {
            return Err(Error::InvalidParameter {
                name: "destination".into(),
                reason: "source and destination are the same account".into(),
            });
        }
        if !self.allows(source, sender) {
            return Err(Error::NotAuthorized {
                grantor: source.short(),
                actor: sender.short(),
            });
        }
        if !self.allows(destination, sender) {
            return Err(Error::NotAuthorized {
                grantor: destination.short(),
                actor: sender.short(),
            });
        }

        let src = self.loan(collateral, source);
        let dst = self.loan(collateral, destination);

        let src_collateral = src
            .collateral_amount
            .checked_apply(delta_collateral.negated())
            .ok_or_else(|| Error::InsufficientCollateral {
                required: delta_collateral.magnitude().raw(),
                available: src.collateral_amount.raw(),
            })?;
        let dst_collateral = dst
            .collateral_amount
            .checked_apply(delta_collateral)
            .ok_or_else(|| Error::InsufficientCollateral {
                required: delta_collateral.magnitude().raw(),
                available: dst.collateral_amount.raw(),
            })?;
        let src_debt = src
            .debt_amount
            .checked_apply(delta_debt.negated())
            .ok_or_else(|| Error::InsufficientDebt {
                required: delta_debt.magnitude().raw(),
                available: src.debt_amount.raw(),
            })?;
        let dst_debt = dst
            .debt_amount
            .checked_apply(delta_debt)
            .ok_or_else(|| Error::InsufficientDebt {
                required: delta_debt.magnitude().raw(),
                available: dst.debt_amount.raw(),
            })?;

        for (new_collateral, new_debt) in [(src_collateral, src_debt), (dst_collateral, dst_debt)]
        {
            let tab = new_debt.value_at(rate).ok_or_else(|| Error::Overflow {
                operation: "tab".into(),
            })?;
            let value = new_collateral
                .value_at(spot)
                .ok_or_else(|| Error::Overflow {
                    operation: "collateral value".into(),
                })?;
            if tab > value {
                return Err(Error::Undercollateralized {
                    tab: tab.raw(),
                    collateral_value: value.raw(),
                });
            }
            if !tab.is_zero() && tab < min_debt {
                return Err(Error::BelowDust {
                    tab: tab.raw(),
                    minimum: min_debt.raw(),
                });
            }
        }

        self.loans
            .insert((collateral, source), Loan::new(src_collateral, src_debt));
        self.loans.insert(
            (collateral, destination),
            Loan::new(dst_collateral, dst_debt),
        );
        tracing::debug!(
            collateral = %collateral,
            source = %source.short(),
            destination = %destination.short(),
            "loan split"
        );
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SEIZURE AND SETTLEMENT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Seize part of a position for liquidation
    ///
    /// Applies the non-positive deltas to the loan and the per-type total,
    /// moves the seized collateral into the escrow, and recognizes
    /// `|Δdebt| × rate` of bad debt against the sink. `total_debt_issued` is
    /// unchanged: the owner keeps what was drawn, the sink owes it instead.
    /// Works on a closed ledger; the liquidation trigger enforces policy.
    pub(crate) fn seize_debt(
        &mut self,
        collateral: CollateralId,
        owner: AccountId,
        escrow: EscrowId,
        sink: AccountId,
        delta_collateral: CollateralDelta,
        delta_debt: DebtDelta,
    ) -> Result<()> {
        if delta_collateral.is_increase() || delta_debt.is_increase() {
            return Err(Error::InvalidParameter {
                name: "delta".into(),
                reason: "seizure deltas must be non-positive".into(),
            });
        }
        if escrow.0 >= self.next_escrow_id {
            return Err(Error::InvalidParameter {
                name: "escrow".into(),
                reason: format!("unknown escrow {}", escrow),
            });
        }
        let info = self.collateral_info(collateral)?;
        let rate = info.rate();
        let type_total = info.total_debt();

        let loan = self.loan(collateral, owner);
        let new_collateral = loan
            .collateral_amount
            .checked_apply(delta_collateral)
            .ok_or_else(|| Error::InsufficientCollateral {
                required: delta_collateral.magnitude().raw(),
                available: loan.collateral_amount.raw(),
            })?;
        let new_debt = loan
            .debt_amount
            .checked_apply(delta_debt)
            .ok_or_else(|| Error::InsufficientDebt {
                required: delta_debt.magnitude().raw(),
                available: loan.debt_amount.raw(),
            })?;
        let new_type_total = type_total
            .checked_apply(delta_debt)
            .ok_or_else(|| Error::Internal("type total below seized debt".into()))?;
        let seized_value = delta_debt
            .magnitude()
            .value_at(rate)
            .ok_or_else(|| Error::Overflow {
                operation: "seized value".into(),
            })?;
        let escrow_balance = self
            .escrow_balance(escrow, collateral)
            .checked_add(delta_collateral.magnitude())
            .ok_or_else(|| Error::Overflow {
                operation: "escrow balance".into(),
            })?;
        let sink_seized = self
            .seized_debt(sink)
            .checked_add(seized_value)
            .ok_or_else(|| Error::Overflow {
                operation: "sink seized debt".into(),
            })?;
        let total_seized = self
            .total_seized_debt
            .checked_add(seized_value)
            .ok_or_else(|| Error::Overflow {
                operation: "total seized debt".into(),
            })?;

        let info = self
            .infos
            .get_mut(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))?;
        info.set_total_debt(new_type_total);
        self.loans
            .insert((collateral, owner), Loan::new(new_collateral, new_debt));
        self.escrows.insert((escrow, collateral), escrow_balance);
        self.seized_debt.insert(sink, sink_seized);
        self.total_seized_debt = total_seized;
        tracing::info!(
            collateral = %collateral,
            owner = %owner.short(),
            seized_collateral = %delta_collateral.magnitude(),
            seized_value = %seized_value,
            "position seized"
        );
        Ok(())
    }

    /// Burn free debt against the payer's seized debt, retiring both
    pub fn settle_debt(&mut self, payer: AccountId, amount: DebtValue) -> Result<()> {
        let seized = self.seized_debt(payer);
        let new_seized =
            seized
                .checked_sub(amount)
                .ok_or_else(|| Error::InsufficientSeizedDebt {
                    required: amount.raw(),
                    available: seized.raw(),
                })?;
        let free = self.free_debt(payer);
        let new_free = free
            .checked_sub(amount)
            .ok_or_else(|| Error::InsufficientDebt {
                required: amount.raw(),
                available: free.raw(),
            })?;
        let total_seized = self
            .total_seized_debt
            .checked_sub(amount)
            .ok_or_else(|| Error::Internal("total seized below payer balance".into()))?;
        let issued = self
            .total_debt_issued
            .checked_sub(amount)
            .ok_or_else(|| Error::Internal("debt issued below payer balance".into()))?;

        self.seized_debt.insert(payer, new_seized);
        self.free_debt.insert(payer, new_free);
        self.total_seized_debt = total_seized;
        self.total_debt_issued = issued;
        tracing::debug!(payer = %payer.short(), amount = %amount, "bad debt settled");
        Ok(())
    }

    /// Mint free debt to the recipient against the source's seized debt
    pub fn add_debt(
        &mut self,
        source: AccountId,
        recipient: AccountId,
        amount: DebtValue,
    ) -> Result<()> {
        let source_seized = self
            .seized_debt(source)
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow {
                operation: "source seized debt".into(),
            })?;
        let recipient_free = self
            .free_debt(recipient)
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow {
                operation: "recipient free debt".into(),
            })?;
        let total_seized = self
            .total_seized_debt
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow {
                operation: "total seized debt".into(),
            })?;
        let issued = self
            .total_debt_issued
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow {
                operation: "total debt issued".into(),
            })?;

        self.seized_debt.insert(source, source_seized);
        self.free_debt.insert(recipient, recipient_free);
        self.total_seized_debt = total_seized;
        self.total_debt_issued = issued;
        tracing::debug!(
            source = %source.short(),
            recipient = %recipient.short(),
            amount = %amount,
            "debt added"
        );
        Ok(())
    }

    /// O(1) interest accrual for one type
    ///
    /// Raises the cumulative rate by `delta` and credits the accrued value
    /// (`total_debt × delta`) to the fee recipient, so every outstanding tab
    /// of the type grows in a single step.
    pub fn modify_interest_rate(
        &mut self,
        collateral: CollateralId,
        fee_recipient: AccountId,
        delta: Decimal,
    ) -> Result<()> {
        let info = self.collateral_info(collateral)?;
        let rate = info.rate();
        let type_total = info.total_debt();

        self.ensure_open()?;
        if delta < Decimal::ZERO {
            return Err(Error::InvalidParameter {
                name: "rate_delta".into(),
                reason: format!("must not be negative, got {}", delta),
            });
        }
        let new_rate = rate.checked_increase(delta).ok_or_else(|| Error::Overflow {
            operation: "rate".into(),
        })?;
        let accrued = type_total
            .scaled_value(delta)
            .ok_or_else(|| Error::Overflow {
                operation: "accrued interest".into(),
            })?;
        let recipient_free =
            self.free_debt(fee_recipient)
                .checked_add(accrued)
                .ok_or_else(|| Error::Overflow {
                    operation: "fee recipient debt".into(),
                })?;
        let issued = self
            .total_debt_issued
            .checked_add(accrued)
            .ok_or_else(|| Error::Overflow {
                operation: "total debt issued".into(),
            })?;

        let info = self
            .infos
            .get_mut(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))?;
        info.set_rate(new_rate);
        self.free_debt.insert(fee_recipient, recipient_free);
        self.total_debt_issued = issued;
        tracing::info!(
            collateral = %collateral,
            delta = %delta,
            accrued = %accrued,
            "interest accrued"
        );
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ESCROWS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Allocate an escrow for seized collateral
    pub fn create_escrow(&mut self) -> EscrowId {
        let id = EscrowId(self.next_escrow_id);
        self.next_escrow_id += 1;
        id
    }

    /// Collateral of one type held by an escrow
    pub fn escrow_balance(&self, escrow: EscrowId, collateral: CollateralId) -> CollateralAmount {
        self.escrows
            .get(&(escrow, collateral))
            .copied()
            .unwrap_or_default()
    }

    /// Release escrowed collateral into a user's free balance
    pub(crate) fn escrow_release(
        &mut self,
        collateral: CollateralId,
        escrow: EscrowId,
        to: AccountId,
        amount: CollateralAmount,
    ) -> Result<()> {
        self.collateral_info(collateral)?;
        let held = self.escrow_balance(escrow, collateral);
        let remaining = held
            .checked_sub(amount)
            .ok_or_else(|| Error::InsufficientCollateral {
                required: amount.raw(),
                available: held.raw(),
            })?;
        let credited = self
            .free_collateral(collateral, to)
            .checked_add(amount)
            .ok_or_else(|| Error::Overflow {
                operation: "released collateral".into(),
            })?;
        self.escrows.insert((escrow, collateral), remaining);
        self.free_collateral.insert((collateral, to), credited);
        tracing::debug!(
            escrow = %escrow,
            collateral = %collateral,
            to = %to.short(),
            amount = %amount,
            "escrow released"
        );
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SNAPSHOTS AND INVARIANTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Check the debt conservation identities
    ///
    /// 1. `total_debt_issued` equals the sum of free debt balances.
    /// 2. `total_seized_debt` equals the sum of seized debt balances.
    /// 3. `total_debt_issued` equals `total_seized_debt` plus the
    ///    rate-adjusted debt of every type.
    pub fn verify_accounting(&self) -> bool {
        let mut free_sum = DebtValue::ZERO;
        for balance in self.free_debt.values() {
            free_sum = match free_sum.checked_add(*balance) {
                Some(v) => v,
                None => return false,
            };
        }
        if free_sum != self.total_debt_issued {
            return false;
        }

        let mut seized_sum = DebtValue::ZERO;
        for balance in self.seized_debt.values() {
            seized_sum = match seized_sum.checked_add(*balance) {
                Some(v) => v,
                None => return false,
            };
        }
        if seized_sum != self.total_seized_debt {
            return false;
        }

        let mut backed = self.total_seized_debt;
        for info in self.infos.values() {
            let type_value = match info.total_value() {
                Some(v) => v,
                None => return false,
            };
            backed = match backed.checked_add(type_value) {
                Some(v) => v,
                None => return false,
            };
        }
        backed == self.total_debt_issued
    }

    /// Serialize the full ledger state
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Restore a ledger from serialized state
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}
