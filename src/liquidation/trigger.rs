//! Liquidation trigger.
//!
//! Watches loans against their type's spot price and, when one is no longer
//! covered, seizes as much of the position as liquidation capacity allows and
//! opens a Dutch auction sized by the penalty. Capacity is the debt value
//! simultaneously under auction, bounded globally and per type; it is freed
//! again as auctions retire debt.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::ids::{AccountId, CollateralId, SaleId};
use crate::core::ledger::Ledger;
use crate::core::units::{CollateralDelta, DebtAmount, DebtDelta, DebtValue};
use crate::error::{Error, Result};
use crate::liquidation::engine::AuctionEngine;
use crate::oracle::PriceOracle;
use crate::sink::DebtSink;

// ═══════════════════════════════════════════════════════════════════════════════
// PER-TYPE LIQUIDATION PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Liquidation tuning of one collateral type
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AuctionCollateral {
    /// Penalty multiplier on seized debt, `>= 1`
    penalty: Decimal,
    /// Ceiling on this type's debt value under auction
    max_cost: DebtValue,
    /// Debt value of this type currently under auction
    cost: DebtValue,
}

impl AuctionCollateral {
    /// Penalty multiplier on seized debt
    pub fn penalty(&self) -> Decimal {
        self.penalty
    }

    /// Ceiling on this type's debt value under auction
    pub fn max_cost(&self) -> DebtValue {
        self.max_cost
    }

    /// Debt value of this type currently under auction
    pub fn cost(&self) -> DebtValue {
        self.cost
    }

    /// Capacity left before this type's ceiling
    pub fn headroom(&self) -> DebtValue {
        self.max_cost
            .checked_sub(self.cost)
            .unwrap_or(DebtValue::ZERO)
    }
}

fn validate_penalty(penalty: Decimal) -> Result<()> {
    if penalty < Decimal::ONE {
        return Err(Error::InvalidParameter {
            name: "penalty".into(),
            reason: format!("must be at least 1, got {}", penalty),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION TRIGGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Opens auctions against undercollateralized loans
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationTrigger {
    /// Per-type parameters and running cost
    collaterals: HashMap<CollateralId, AuctionCollateral>,
    /// Global ceiling on debt value under auction
    max_cost: DebtValue,
    /// Global debt value currently under auction
    cost: DebtValue,
    /// Lifetime liquidations performed
    total_liquidations: u64,
    /// Lifetime debt value seized
    total_debt_liquidated: DebtValue,
}

impl LiquidationTrigger {
    /// Create a trigger with a global capacity ceiling
    pub fn new(max_cost: DebtValue) -> Self {
        Self {
            collaterals: HashMap::new(),
            max_cost,
            cost: DebtValue::ZERO,
            total_liquidations: 0,
            total_debt_liquidated: DebtValue::ZERO,
        }
    }

    /// Register liquidation parameters for a collateral type
    pub fn register_collateral(
        &mut self,
        collateral: CollateralId,
        penalty: Decimal,
        max_cost: DebtValue,
    ) -> Result<()> {
        validate_penalty(penalty)?;
        if self.collaterals.contains_key(&collateral) {
            return Err(Error::InvalidParameter {
                name: "collateral".into(),
                reason: format!("type {} already registered", collateral),
            });
        }
        self.collaterals.insert(
            collateral,
            AuctionCollateral {
                penalty,
                max_cost,
                cost: DebtValue::ZERO,
            },
        );
        tracing::info!(collateral = %collateral, penalty = %penalty, "liquidation parameters set");
        Ok(())
    }

    /// Parameters of one collateral type
    pub fn collateral(&self, collateral: CollateralId) -> Result<&AuctionCollateral> {
        self.collaterals
            .get(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))
    }

    /// Replace a type's penalty multiplier
    pub fn set_penalty(&mut self, collateral: CollateralId, penalty: Decimal) -> Result<()> {
        validate_penalty(penalty)?;
        let entry = self
            .collaterals
            .get_mut(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))?;
        entry.penalty = penalty;
        Ok(())
    }

    /// Replace a type's capacity ceiling
    pub fn set_collateral_max_cost(
        &mut self,
        collateral: CollateralId,
        max_cost: DebtValue,
    ) -> Result<()> {
        let entry = self
            .collaterals
            .get_mut(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))?;
        entry.max_cost = max_cost;
        Ok(())
    }

    /// Replace the global capacity ceiling
    pub fn set_max_cost(&mut self, max_cost: DebtValue) {
        self.max_cost = max_cost;
    }

    /// Global ceiling on debt value under auction
    pub fn max_cost(&self) -> DebtValue {
        self.max_cost
    }

    /// Global debt value currently under auction
    pub fn cost(&self) -> DebtValue {
        self.cost
    }

    /// Capacity left before the global ceiling
    pub fn global_headroom(&self) -> DebtValue {
        self.max_cost
            .checked_sub(self.cost)
            .unwrap_or(DebtValue::ZERO)
    }

    /// Capacity left for one type, bounded by the global ceiling
    pub fn headroom(&self, collateral: CollateralId) -> Result<DebtValue> {
        let entry = self.collateral(collateral)?;
        Ok(entry.headroom().min(self.global_headroom()))
    }

    /// Lifetime liquidations performed
    pub fn total_liquidations(&self) -> u64 {
        self.total_liquidations
    }

    /// Lifetime debt value seized
    pub fn total_debt_liquidated(&self) -> DebtValue {
        self.total_debt_liquidated
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate an undercollateralized loan into a Dutch auction
    ///
    /// Seizes up to the capacity headroom of principal (scaled down by rate
    /// and penalty), books the seized value against the sink, and opens an
    /// auction for `due × penalty` with the keeper incentivized. A position
    /// whose residual would fall below the dust floor is taken whole, which
    /// may overshoot the ceilings by that one tab. Every rejection leaves all
    /// state untouched; the oracle is read before any mutation.
    #[allow(clippy::too_many_arguments)]
    pub fn liquidate<O, S>(
        &mut self,
        ledger: &mut Ledger,
        engine: &mut AuctionEngine,
        oracle: &O,
        sink: &mut S,
        collateral: CollateralId,
        owner: AccountId,
        keeper: AccountId,
        now: u64,
    ) -> Result<SaleId>
    where
        O: PriceOracle + ?Sized,
        S: DebtSink + ?Sized,
    {
        let info = ledger.collateral_info(collateral)?;
        let spot = info.spot_price();
        let rate = info.rate();
        let min_debt = info.min_debt();
        let entry = self.collateral(collateral)?;
        let penalty = entry.penalty;

        if !ledger.is_open() {
            return Err(Error::MarketClosed);
        }

        let loan = ledger.loan(collateral, owner);
        let collateral_value = loan
            .collateral_value(spot)
            .ok_or_else(|| Error::Overflow {
                operation: "collateral value".into(),
            })?;
        let tab_now = loan.tab(rate).ok_or_else(|| Error::Overflow {
            operation: "tab".into(),
        })?;
        if collateral_value >= tab_now {
            return Err(Error::LoanHealthy(format!(
                "{}/{}",
                collateral,
                owner.short()
            )));
        }

        let room = entry.headroom().min(self.global_headroom());
        if !room.is_positive() {
            return Err(Error::CapacityExhausted {
                collateral: collateral.to_string(),
            });
        }

        // capacity is denominated in tab; convert to principal
        let room_principal = room
            .raw()
            .checked_div(rate.raw())
            .and_then(|r| r.checked_div(penalty))
            .ok_or_else(|| Error::Overflow {
                operation: "liquidation sizing".into(),
            })?;
        let mut delta_debt = DebtAmount::new(loan.debt_amount.raw().min(room_principal))?;

        if delta_debt < loan.debt_amount {
            let residual = loan
                .debt_amount
                .checked_sub(delta_debt)
                .ok_or_else(|| Error::Overflow {
                    operation: "residual debt".into(),
                })?;
            let residual_tab = residual.value_at(rate).ok_or_else(|| Error::Overflow {
                operation: "residual tab".into(),
            })?;
            if residual_tab < min_debt {
                // a partial seizure would strand a dusty loan; take it whole
                delta_debt = loan.debt_amount;
            } else {
                let slice_tab = delta_debt.value_at(rate).ok_or_else(|| Error::Overflow {
                    operation: "slice tab".into(),
                })?;
                if slice_tab < min_debt {
                    return Err(Error::BelowDust {
                        tab: slice_tab.raw(),
                        minimum: min_debt.raw(),
                    });
                }
            }
        }

        let ratio = delta_debt
            .ratio_of(loan.debt_amount)
            .ok_or_else(|| Error::Overflow {
                operation: "seizure ratio".into(),
            })?;
        let delta_collateral =
            loan.collateral_amount
                .scaled(ratio)
                .ok_or_else(|| Error::Overflow {
                    operation: "seized collateral".into(),
                })?;
        if delta_collateral.is_zero() {
            return Err(Error::NullAuction);
        }

        let due = delta_debt.value_at(rate).ok_or_else(|| Error::Overflow {
            operation: "seized value".into(),
        })?;
        let tab = due.scaled(penalty).ok_or_else(|| Error::Overflow {
            operation: "auction tab".into(),
        })?;
        let new_global_cost = self.cost.checked_add(tab).ok_or_else(|| Error::Overflow {
            operation: "global auction cost".into(),
        })?;
        let new_type_cost = entry.cost.checked_add(tab).ok_or_else(|| Error::Overflow {
            operation: "type auction cost".into(),
        })?;

        // oracle read completes before any mutation
        let feed_price = oracle.safe_price(collateral)?;
        if !feed_price.is_positive() {
            return Err(Error::PriceUnavailable(collateral.to_string()));
        }

        ledger.seize_debt(
            collateral,
            owner,
            engine.escrow(),
            sink.account(),
            CollateralDelta::decrease(delta_collateral),
            DebtDelta::decrease(delta_debt),
        )?;
        sink.record_bad_debt(due, now)?;
        self.cost = new_global_cost;
        if let Some(entry) = self.collaterals.get_mut(&collateral) {
            entry.cost = new_type_cost;
        }
        let sale = engine.start(
            ledger,
            feed_price,
            tab,
            delta_collateral,
            owner,
            keeper,
            now,
        )?;

        self.total_liquidations += 1;
        self.total_debt_liquidated = self
            .total_debt_liquidated
            .checked_add(due)
            .unwrap_or(self.total_debt_liquidated);
        tracing::info!(
            collateral = %collateral,
            owner = %owner.short(),
            seized_collateral = %delta_collateral,
            due = %due,
            tab = %tab,
            sale = %sale,
            "loan liquidated"
        );
        Ok(sale)
    }

    /// Return capacity as an auction retires debt
    pub(crate) fn release_capacity(
        &mut self,
        collateral: CollateralId,
        amount: DebtValue,
    ) -> Result<()> {
        let entry = self
            .collaterals
            .get_mut(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))?;
        entry.cost = entry
            .cost
            .checked_sub(amount)
            .ok_or_else(|| Error::Internal("type auction cost below release".into()))?;
        self.cost = self
            .cost
            .checked_sub(amount)
            .ok_or_else(|| Error::Internal("global auction cost below release".into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collateral::CollateralInfo;
    use crate::core::units::{CollateralAmount, Price, Rate};
    use crate::liquidation::decay::LinearDecrease;
    use crate::liquidation::engine::AuctionParams;
    use crate::oracle::StaticOracle;
    use crate::sink::DebtBuffer;
    use rust_decimal_macros::dec;

    fn coll(v: &str) -> CollateralAmount {
        CollateralAmount::new(v.parse().unwrap()).unwrap()
    }

    fn debt(v: &str) -> DebtAmount {
        DebtAmount::new(v.parse().unwrap()).unwrap()
    }

    fn value(v: &str) -> DebtValue {
        DebtValue::new(v.parse().unwrap()).unwrap()
    }

    fn price(v: &str) -> Price {
        Price::new(v.parse().unwrap()).unwrap()
    }

    struct Setup {
        ledger: Ledger,
        trigger: LiquidationTrigger,
        engine: AuctionEngine,
        oracle: StaticOracle,
        sink: DebtBuffer,
        eth: CollateralId,
        alice: AccountId,
        keeper: AccountId,
    }

    impl Setup {
        fn liquidate(&mut self) -> Result<SaleId> {
            self.trigger.liquidate(
                &mut self.ledger,
                &mut self.engine,
                &self.oracle,
                &mut self.sink,
                self.eth,
                self.alice,
                self.keeper,
                50,
            )
        }
    }

    /// Alice holds 5 collateral against 10 debt; the spot has dropped to 1.5
    /// so the tab of 10 is no longer covered.
    fn setup(penalty: Decimal, type_max_cost: &str, min_debt: &str) -> Setup {
        let eth = CollateralId::new("ETH").unwrap();
        let alice = AccountId::named("alice");
        let keeper = AccountId::named("keeper");
        let sink_account = AccountId::named("sink");

        let mut ledger = Ledger::new(value("10000"));
        ledger
            .add_collateral_type(
                eth,
                CollateralInfo::new(
                    price("2"),
                    value("10000"),
                    value(min_debt),
                    Rate::ONE,
                ),
            )
            .unwrap();
        ledger.register_account(alice);
        ledger.register_account(keeper);
        ledger.register_account(sink_account);
        ledger
            .modify_collateral(eth, alice, CollateralDelta::increase(coll("5")))
            .unwrap();
        ledger
            .modify_loan(
                eth,
                alice,
                alice,
                CollateralDelta::increase(coll("5")),
                DebtDelta::increase(debt("10")),
            )
            .unwrap();
        ledger.set_spot_price(eth, price("1.5")).unwrap();

        let mut trigger = LiquidationTrigger::new(value("1000"));
        trigger
            .register_collateral(eth, penalty, value(type_max_cost))
            .unwrap();

        let escrow = ledger.create_escrow();
        let engine = AuctionEngine::new(
            eth,
            escrow,
            Box::new(LinearDecrease::new(7200).unwrap()),
            AuctionParams {
                price_buffer: dec!(1),
                ..AuctionParams::default()
            },
            sink_account,
        )
        .unwrap();

        let mut oracle = StaticOracle::new();
        oracle.set_price(eth, price("3"));
        let sink = DebtBuffer::new(sink_account, 60);

        Setup {
            ledger,
            trigger,
            engine,
            oracle,
            sink,
            eth,
            alice,
            keeper,
        }
    }

    #[test]
    fn test_registration_and_penalty_validation() {
        let eth = CollateralId::new("ETH").unwrap();
        let mut trigger = LiquidationTrigger::new(value("100"));
        assert!(trigger
            .register_collateral(eth, dec!(0.99), value("50"))
            .is_err());
        trigger.register_collateral(eth, dec!(1.1), value("50")).unwrap();
        assert!(trigger
            .register_collateral(eth, dec!(1.1), value("50"))
            .is_err());

        assert_eq!(trigger.collateral(eth).unwrap().penalty(), dec!(1.1));
        assert_eq!(trigger.headroom(eth).unwrap(), value("50"));
        trigger.set_collateral_max_cost(eth, value("200")).unwrap();
        // the global ceiling binds once the type ceiling exceeds it
        assert_eq!(trigger.headroom(eth).unwrap(), value("100"));
        assert!(trigger.set_penalty(eth, dec!(0.5)).is_err());
    }

    #[test]
    fn test_full_liquidation_and_idempotent_retry() {
        let mut setup = setup(dec!(1), "1000", "0");
        let id = setup.liquidate().unwrap();

        assert!(setup.ledger.loan(setup.eth, setup.alice).is_empty());
        let sale = setup.engine.sale(id).unwrap();
        assert_eq!(sale.tab, value("10"));
        assert_eq!(sale.collateral_to_sell, coll("5"));
        assert_eq!(setup.trigger.cost(), value("10"));
        assert_eq!(
            setup.ledger.escrow_balance(setup.engine.escrow(), setup.eth),
            coll("5")
        );
        assert_eq!(
            setup.ledger.seized_debt(AccountId::named("sink")),
            value("10")
        );
        assert_eq!(setup.sink.queued_total(), value("10"));
        assert_eq!(setup.trigger.total_liquidations(), 1);
        assert!(setup.ledger.verify_accounting());

        // the drained loan is now healthy: retrying changes nothing
        let err = setup.liquidate().unwrap_err();
        assert!(matches!(err, Error::LoanHealthy(_)));
        assert_eq!(setup.trigger.cost(), value("10"));
        assert_eq!(setup.engine.sale_count(), 1);
    }

    #[test]
    fn test_healthy_loan_rejected() {
        let mut setup = setup(dec!(1), "1000", "0");
        // restore a covering price
        setup.ledger.set_spot_price(setup.eth, price("2")).unwrap();
        let err = setup.liquidate().unwrap_err();
        assert!(matches!(err, Error::LoanHealthy(_)));
        assert_eq!(setup.engine.sale_count(), 0);
    }

    #[test]
    fn test_partial_liquidation_under_capacity() {
        let mut setup = setup(dec!(1), "6", "0");
        let id = setup.liquidate().unwrap();

        // room 6 at rate 1, penalty 1: seize 6 of 10 debt, 3 of 5 collateral
        let sale = setup.engine.sale(id).unwrap();
        assert_eq!(sale.tab, value("6"));
        assert_eq!(sale.collateral_to_sell, coll("3"));
        assert_eq!(
            setup.ledger.loan(setup.eth, setup.alice),
            crate::core::loan::Loan::new(coll("2"), debt("4"))
        );
        assert_eq!(setup.trigger.headroom(setup.eth).unwrap(), DebtValue::ZERO);

        // no capacity left for the rest
        let err = setup.liquidate().unwrap_err();
        assert!(matches!(err, Error::CapacityExhausted { .. }));
    }

    #[test]
    fn test_dusty_residual_takes_full_position() {
        let mut setup = setup(dec!(1), "7", "5");
        let id = setup.liquidate().unwrap();

        // room 7 would leave residual 3 < dust 5, so the whole loan goes,
        // overshooting the type ceiling by one tab
        let sale = setup.engine.sale(id).unwrap();
        assert_eq!(sale.tab, value("10"));
        assert!(setup.ledger.loan(setup.eth, setup.alice).is_empty());
        assert_eq!(setup.trigger.collateral(setup.eth).unwrap().cost(), value("10"));
    }

    #[test]
    fn test_dusty_slice_rejected() {
        let mut setup = setup(dec!(1), "1", "2");
        // room 1 allows a slice of tab 1, below dust 2, while the residual 9
        // stays above dust: nothing sensible can be seized
        let err = setup.liquidate().unwrap_err();
        assert_eq!(
            err,
            Error::BelowDust {
                tab: dec!(1),
                minimum: dec!(2),
            }
        );
        assert_eq!(setup.ledger.loan(setup.eth, setup.alice).debt_amount, debt("10"));
    }

    #[test]
    fn test_penalty_scales_the_tab() {
        let mut setup = setup(dec!(1.13), "1000", "0");
        let id = setup.liquidate().unwrap();
        let sale = setup.engine.sale(id).unwrap();
        assert_eq!(sale.tab, value("11.3"));
        // seized value excludes the penalty
        assert_eq!(
            setup.ledger.seized_debt(AccountId::named("sink")),
            value("10")
        );
        assert_eq!(setup.trigger.cost(), value("11.3"));
    }

    #[test]
    fn test_oracle_failure_is_a_clean_rejection() {
        let mut setup = setup(dec!(1), "1000", "0");
        setup.oracle.clear_price(setup.eth);
        let err = setup.liquidate().unwrap_err();
        assert!(matches!(err, Error::PriceUnavailable(_)));

        // nothing moved
        assert_eq!(setup.ledger.loan(setup.eth, setup.alice).debt_amount, debt("10"));
        assert_eq!(setup.trigger.cost(), DebtValue::ZERO);
        assert_eq!(setup.engine.sale_count(), 0);
        assert_eq!(setup.sink.queued_total(), DebtValue::ZERO);
    }

    #[test]
    fn test_collateralless_debt_is_a_null_auction() {
        let mut setup = setup(dec!(1), "1000", "0");
        // strip the collateral while keeping the debt on the books
        let escrow = setup.ledger.create_escrow();
        setup
            .ledger
            .seize_debt(
                setup.eth,
                setup.alice,
                escrow,
                AccountId::named("sink"),
                CollateralDelta::decrease(coll("5")),
                DebtDelta::ZERO,
            )
            .unwrap();

        let err = setup.liquidate().unwrap_err();
        assert_eq!(err, Error::NullAuction);
    }

    #[test]
    fn test_closed_ledger_blocks_liquidation() {
        let mut setup = setup(dec!(1), "1000", "0");
        setup.ledger.close();
        let err = setup.liquidate().unwrap_err();
        assert_eq!(err, Error::MarketClosed);
    }
}
