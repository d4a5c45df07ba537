//! Market composition root.
//!
//! A [`Market`] wires the ledger, the liquidation trigger, one auction engine
//! per collateral type, a price oracle and a debt sink into one value with a
//! single `&mut self` entry point per operation, so every state change is
//! atomic and serializable. All collaborators are explicit injected state;
//! the oracle and sink are type parameters so tests and production wire
//! different implementations without touching the market code.

use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::core::collateral::CollateralInfo;
use crate::core::ids::{AccountId, CollateralId, SaleId};
use crate::core::ledger::Ledger;
use crate::core::units::{
    CollateralAmount, CollateralDelta, DebtDelta, DebtValue, Price,
};
use crate::error::{Error, Result};
use crate::liquidation::decay::PriceCalculator;
use crate::liquidation::engine::{AuctionEngine, AuctionParams, AuctionStatus, Purchase};
use crate::liquidation::trigger::LiquidationTrigger;
use crate::market::events::{EventLog, MarketEvent};
use crate::oracle::{PriceOracle, StaticOracle};
use crate::sink::{DebtBuffer, DebtSink};

// ═══════════════════════════════════════════════════════════════════════════════
// MARKET
// ═══════════════════════════════════════════════════════════════════════════════

/// The assembled lending market
pub struct Market<O = StaticOracle, S = DebtBuffer>
where
    O: PriceOracle,
    S: DebtSink,
{
    /// Balance and loan bookkeeping
    ledger: Ledger,
    /// Liquidation policy and capacity
    trigger: LiquidationTrigger,
    /// One auction engine per listed collateral type
    engines: HashMap<CollateralId, AuctionEngine>,
    /// Price source
    oracle: O,
    /// Bad-debt sink
    sink: S,
    /// Bounded log of successful state changes
    events: EventLog,
}

impl<O, S> Market<O, S>
where
    O: PriceOracle,
    S: DebtSink,
{
    /// Assemble a market around an oracle and a sink
    pub fn new(
        system_max_debt: DebtValue,
        auction_capacity: DebtValue,
        oracle: O,
        sink: S,
    ) -> Self {
        let mut ledger = Ledger::new(system_max_debt);
        ledger.register_account(sink.account());
        Self {
            ledger,
            trigger: LiquidationTrigger::new(auction_capacity),
            engines: HashMap::new(),
            oracle,
            sink,
            events: EventLog::default(),
        }
    }

    /// Balance and loan bookkeeping
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Liquidation policy and capacity
    pub fn trigger(&self) -> &LiquidationTrigger {
        &self.trigger
    }

    /// Auction engine of one collateral type
    pub fn engine(&self, collateral: CollateralId) -> Result<&AuctionEngine> {
        self.engines
            .get(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))
    }

    /// Price source
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Price source, mutable
    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    /// Bad-debt sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Bad-debt sink, mutable
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Log of successful state changes
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LISTING AND ADMIN
    // ═══════════════════════════════════════════════════════════════════════════

    /// List a collateral type across the ledger, trigger and a new engine
    #[allow(clippy::too_many_arguments)]
    pub fn add_collateral(
        &mut self,
        collateral: CollateralId,
        info: CollateralInfo,
        penalty: Decimal,
        max_auction_cost: DebtValue,
        calculator: Box<dyn PriceCalculator>,
        params: AuctionParams,
    ) -> Result<()> {
        if self.engines.contains_key(&collateral) {
            return Err(Error::InvalidParameter {
                name: "collateral".into(),
                reason: format!("type {} already listed", collateral),
            });
        }
        let escrow = self.ledger.create_escrow();
        let engine = AuctionEngine::new(
            collateral,
            escrow,
            calculator,
            params,
            self.sink.account(),
        )?;
        self.trigger
            .register_collateral(collateral, penalty, max_auction_cost)?;
        self.ledger.add_collateral_type(collateral, info)?;
        self.engines.insert(collateral, engine);
        self.sync_min_sale_target(collateral)?;
        self.events
            .record(MarketEvent::CollateralAdded { collateral });
        Ok(())
    }

    /// Replace the system-wide debt ceiling
    pub fn set_system_max_debt(&mut self, ceiling: DebtValue) {
        self.ledger.set_system_max_debt(ceiling);
        self.events.record(MarketEvent::ParameterChanged {
            name: "system_max_debt".into(),
        });
    }

    /// Replace a type's debt ceiling
    pub fn set_max_debt(&mut self, collateral: CollateralId, ceiling: DebtValue) -> Result<()> {
        self.ledger.set_max_debt(collateral, ceiling)?;
        self.events.record(MarketEvent::ParameterChanged {
            name: format!("{}/max_debt", collateral),
        });
        Ok(())
    }

    /// Replace a type's dust floor, keeping the engine's sale floor in step
    pub fn set_min_debt(&mut self, collateral: CollateralId, floor: DebtValue) -> Result<()> {
        self.ledger.set_min_debt(collateral, floor)?;
        self.sync_min_sale_target(collateral)?;
        self.events.record(MarketEvent::ParameterChanged {
            name: format!("{}/min_debt", collateral),
        });
        Ok(())
    }

    /// Replace a type's liquidation penalty, keeping the sale floor in step
    pub fn set_penalty(&mut self, collateral: CollateralId, penalty: Decimal) -> Result<()> {
        self.trigger.set_penalty(collateral, penalty)?;
        self.sync_min_sale_target(collateral)?;
        self.events.record(MarketEvent::ParameterChanged {
            name: format!("{}/penalty", collateral),
        });
        Ok(())
    }

    /// Replace a type's auction capacity ceiling
    pub fn set_auction_capacity(
        &mut self,
        collateral: CollateralId,
        max_cost: DebtValue,
    ) -> Result<()> {
        self.trigger.set_collateral_max_cost(collateral, max_cost)?;
        self.events.record(MarketEvent::ParameterChanged {
            name: format!("{}/max_auction_cost", collateral),
        });
        Ok(())
    }

    /// Replace the global auction capacity ceiling
    pub fn set_global_auction_capacity(&mut self, max_cost: DebtValue) {
        self.trigger.set_max_cost(max_cost);
        self.events.record(MarketEvent::ParameterChanged {
            name: "max_auction_cost".into(),
        });
    }

    /// Replace a type's spot price directly
    pub fn set_spot_price(&mut self, collateral: CollateralId, price: Price) -> Result<()> {
        self.ledger.set_spot_price(collateral, price)?;
        self.events
            .record(MarketEvent::SpotPriceUpdated { collateral, price });
        Ok(())
    }

    /// Pull the oracle price into the ledger spot
    pub fn refresh_price(&mut self, collateral: CollateralId) -> Result<Price> {
        let price = self.oracle.safe_price(collateral)?;
        self.ledger.set_spot_price(collateral, price)?;
        self.events
            .record(MarketEvent::SpotPriceUpdated { collateral, price });
        Ok(price)
    }

    /// Close the market for new risk. One-way.
    pub fn close(&mut self) {
        self.ledger.close();
        self.events.record(MarketEvent::MarketClosed);
    }

    /// The engine's partial-sale floor is the ledger dust scaled by penalty
    fn sync_min_sale_target(&mut self, collateral: CollateralId) -> Result<()> {
        let min_debt = self.ledger.collateral_info(collateral)?.min_debt();
        let penalty = self.trigger.collateral(collateral)?.penalty();
        let target = min_debt.scaled(penalty).ok_or_else(|| Error::Overflow {
            operation: "min sale target".into(),
        })?;
        if let Some(engine) = self.engines.get_mut(&collateral) {
            engine.set_min_sale_target(target);
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCOUNTS AND BALANCES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register an account with self-consent
    pub fn register_account(&mut self, user: AccountId) {
        self.ledger.register_account(user);
        self.events
            .record(MarketEvent::AccountRegistered { account: user });
    }

    /// Let `actor` move `grantor`'s balances
    pub fn grant_consent(&mut self, grantor: AccountId, actor: AccountId) -> Result<()> {
        self.ledger.grant_consent(grantor, actor)?;
        self.events
            .record(MarketEvent::ConsentGranted { grantor, actor });
        Ok(())
    }

    /// Withdraw a consent
    pub fn revoke_consent(&mut self, grantor: AccountId, actor: AccountId) {
        self.ledger.revoke_consent(grantor, actor);
        self.events
            .record(MarketEvent::ConsentRevoked { grantor, actor });
    }

    /// Deposit or withdraw free collateral
    pub fn modify_collateral(
        &mut self,
        collateral: CollateralId,
        user: AccountId,
        delta: CollateralDelta,
    ) -> Result<()> {
        self.ledger.modify_collateral(collateral, user, delta)?;
        self.events.record(MarketEvent::CollateralModified {
            collateral,
            user,
            delta: delta.raw(),
        });
        Ok(())
    }

    /// Move free collateral between accounts
    pub fn transfer_collateral(
        &mut self,
        collateral: CollateralId,
        sender: AccountId,
        from: AccountId,
        to: AccountId,
        amount: CollateralAmount,
    ) -> Result<()> {
        self.ledger
            .transfer_collateral(collateral, sender, from, to, amount)?;
        self.events.record(MarketEvent::CollateralTransferred {
            collateral,
            from,
            to,
            amount,
        });
        Ok(())
    }

    /// Move free debt between accounts
    pub fn transfer_debt(
        &mut self,
        sender: AccountId,
        from: AccountId,
        to: AccountId,
        amount: DebtValue,
    ) -> Result<()> {
        self.ledger.transfer_debt(sender, from, to, amount)?;
        self.events
            .record(MarketEvent::DebtTransferred { from, to, amount });
        Ok(())
    }

    /// Change a loan's collateral and debt
    pub fn modify_loan(
        &mut self,
        collateral: CollateralId,
        owner: AccountId,
        sender: AccountId,
        delta_collateral: CollateralDelta,
        delta_debt: DebtDelta,
    ) -> Result<()> {
        self.ledger
            .modify_loan(collateral, owner, sender, delta_collateral, delta_debt)?;
        self.events.record(MarketEvent::LoanModified {
            collateral,
            owner,
            delta_collateral: delta_collateral.raw(),
            delta_debt: delta_debt.raw(),
        });
        Ok(())
    }

    /// Move part of a position between owners
    #[allow(clippy::too_many_arguments)]
    pub fn split_loan(
        &mut self,
        collateral: CollateralId,
        sender: AccountId,
        source: AccountId,
        destination: AccountId,
        delta_collateral: CollateralDelta,
        delta_debt: DebtDelta,
    ) -> Result<()> {
        self.ledger.split_loan(
            collateral,
            sender,
            source,
            destination,
            delta_collateral,
            delta_debt,
        )?;
        self.events.record(MarketEvent::LoanSplit {
            collateral,
            source,
            destination,
            delta_collateral: delta_collateral.raw(),
            delta_debt: delta_debt.raw(),
        });
        Ok(())
    }

    /// Accrue interest on a type, crediting the fee recipient
    pub fn modify_interest_rate(
        &mut self,
        collateral: CollateralId,
        fee_recipient: AccountId,
        delta: Decimal,
    ) -> Result<()> {
        self.ledger
            .modify_interest_rate(collateral, fee_recipient, delta)?;
        let accrued = self
            .ledger
            .collateral_info(collateral)?
            .total_debt()
            .scaled_value(delta)
            .unwrap_or(DebtValue::ZERO);
        self.events.record(MarketEvent::InterestAccrued {
            collateral,
            delta,
            accrued,
        });
        Ok(())
    }

    /// Settle matured bad debt from the sink's free debt
    pub fn settle_debt(&mut self, amount: DebtValue) -> Result<()> {
        self.sink.settle(&mut self.ledger, amount)?;
        self.events.record(MarketEvent::DebtSettled { amount });
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION AND AUCTIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate an undercollateralized loan into a Dutch auction
    pub fn liquidate(
        &mut self,
        collateral: CollateralId,
        owner: AccountId,
        keeper: AccountId,
        now: u64,
    ) -> Result<SaleId> {
        let engine = self
            .engines
            .get_mut(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))?;
        let sale = self.trigger.liquidate(
            &mut self.ledger,
            engine,
            &self.oracle,
            &mut self.sink,
            collateral,
            owner,
            keeper,
            now,
        )?;
        let tab = engine
            .sale(sale)
            .map(|s| s.tab)
            .unwrap_or(DebtValue::ZERO);
        self.events.record(MarketEvent::Liquidated {
            collateral,
            owner,
            sale,
            tab,
        });
        Ok(sale)
    }

    /// Buy collateral out of a running auction
    #[allow(clippy::too_many_arguments)]
    pub fn auction_buy(
        &mut self,
        collateral: CollateralId,
        sale: SaleId,
        max_lot: CollateralAmount,
        max_price: Price,
        receiver: AccountId,
        now: u64,
    ) -> Result<Purchase> {
        let engine = self
            .engines
            .get_mut(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))?;
        let purchase = engine.buy(
            &mut self.ledger,
            &mut self.trigger,
            sale,
            max_lot,
            max_price,
            receiver,
            now,
        )?;
        self.events.record(MarketEvent::AuctionPurchase {
            collateral,
            sale,
            collateral_bought: purchase.collateral_bought,
            cost: purchase.cost,
            concluded: purchase.concluded,
        });
        Ok(purchase)
    }

    /// Restart a stale auction from a fresh oracle read
    pub fn auction_reset(
        &mut self,
        collateral: CollateralId,
        sale: SaleId,
        keeper: AccountId,
        now: u64,
    ) -> Result<()> {
        let feed_price = self.oracle.safe_price(collateral)?;
        let engine = self
            .engines
            .get_mut(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))?;
        engine.reset(&mut self.ledger, feed_price, sale, keeper, now)?;
        self.events
            .record(MarketEvent::AuctionReset { collateral, sale });
        Ok(())
    }

    /// Wind an auction down, sending its collateral to `receiver`
    pub fn auction_cancel(
        &mut self,
        collateral: CollateralId,
        sale: SaleId,
        receiver: AccountId,
    ) -> Result<()> {
        let engine = self
            .engines
            .get_mut(&collateral)
            .ok_or_else(|| Error::UnknownCollateral(collateral.to_string()))?;
        engine.cancel(&mut self.ledger, &mut self.trigger, sale, receiver)?;
        self.events
            .record(MarketEvent::AuctionCancelled { collateral, sale });
        Ok(())
    }

    /// Point-in-time view of an auction
    pub fn auction_status(
        &self,
        collateral: CollateralId,
        sale: SaleId,
        now: u64,
    ) -> Result<AuctionStatus> {
        self.engine(collateral)?.status(sale, now)
    }

    /// Ids of the running auctions of one type
    pub fn active_auctions(&self, collateral: CollateralId) -> Result<Vec<SaleId>> {
        Ok(self.engine(collateral)?.active_sales().to_vec())
    }
}
