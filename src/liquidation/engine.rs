//! Dutch-auction engine.
//!
//! One engine runs the auctions of a single collateral type. Each sale starts
//! at an oracle-derived price scaled by a buffer and decays along the engine's
//! price calculator. Buyers take any slice of the lot at the current price;
//! stale sales are reset with a fresh feed read; an administrative cancel
//! winds a sale down. Seized collateral sits in the engine's escrow until a
//! purchase releases it or the leftover returns to the original owner.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::ids::{AccountId, CollateralId, EscrowId, SaleId};
use crate::core::ledger::Ledger;
use crate::core::units::{CollateralAmount, DebtValue, Price};
use crate::error::{Error, Result};
use crate::liquidation::decay::PriceCalculator;
use crate::liquidation::trigger::LiquidationTrigger;

// ═══════════════════════════════════════════════════════════════════════════════
// AUCTION PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Tuning knobs of one auction engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuctionParams {
    /// Multiplier on the feed price to form the starting price, `> 0`
    pub price_buffer: Decimal,
    /// Seconds before a sale becomes stale regardless of price
    pub time_before_reset: u64,
    /// Fractional price drop that makes a sale stale, in `(-1, 0]`;
    /// the floor ratio is `1 + reset_price_drop`
    pub reset_price_drop: Decimal,
    /// Flat debt incentive minted to the keeper per start/reset
    pub incentive_flat: Decimal,
    /// Incentive proportional to the sale's tab, `>= 0`
    pub incentive_rate: Decimal,
}

impl Default for AuctionParams {
    fn default() -> Self {
        Self {
            price_buffer: Decimal::new(125, 2),
            time_before_reset: 3600,
            reset_price_drop: Decimal::new(-6, 1),
            incentive_flat: Decimal::ZERO,
            incentive_rate: Decimal::ZERO,
        }
    }
}

impl AuctionParams {
    /// Validate every knob
    pub fn validate(&self) -> Result<()> {
        if self.price_buffer <= Decimal::ZERO {
            return Err(Error::InvalidParameter {
                name: "price_buffer".into(),
                reason: format!("must be positive, got {}", self.price_buffer),
            });
        }
        if self.time_before_reset == 0 {
            return Err(Error::InvalidParameter {
                name: "time_before_reset".into(),
                reason: "must be positive".into(),
            });
        }
        if self.reset_price_drop > Decimal::ZERO || self.reset_price_drop <= Decimal::NEGATIVE_ONE
        {
            return Err(Error::InvalidParameter {
                name: "reset_price_drop".into(),
                reason: format!("must be within (-1, 0], got {}", self.reset_price_drop),
            });
        }
        if self.incentive_flat < Decimal::ZERO {
            return Err(Error::InvalidParameter {
                name: "incentive_flat".into(),
                reason: format!("must not be negative, got {}", self.incentive_flat),
            });
        }
        if self.incentive_rate < Decimal::ZERO {
            return Err(Error::InvalidParameter {
                name: "incentive_rate".into(),
                reason: format!("must not be negative, got {}", self.incentive_rate),
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SALE
// ═══════════════════════════════════════════════════════════════════════════════

/// A running Dutch auction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    /// Position in the engine's active list
    pub index: usize,
    /// Debt value still to be raised
    pub tab: DebtValue,
    /// Collateral still on offer
    pub collateral_to_sell: CollateralAmount,
    /// Owner of the seized position; receives any leftover collateral
    pub original_owner: AccountId,
    /// Timestamp of the start or latest reset
    pub start_time: u64,
    /// Price the decay curve starts from
    pub start_price: Price,
}

/// Result of one purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Purchase {
    /// Sale the purchase hit
    pub sale: SaleId,
    /// Collateral handed to the receiver
    pub collateral_bought: CollateralAmount,
    /// Debt value paid to the sink
    pub cost: DebtValue,
    /// Clearing price
    pub price: Price,
    /// Tab remaining after the purchase
    pub tab_remaining: DebtValue,
    /// Lot remaining after the purchase
    pub collateral_remaining: CollateralAmount,
    /// Whether the sale was removed
    pub concluded: bool,
}

/// Point-in-time view of a sale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuctionStatus {
    /// Whether the sale needs a reset before purchases
    pub needs_reset: bool,
    /// Current asking price
    pub price: Price,
    /// Collateral still on offer
    pub collateral_to_sell: CollateralAmount,
    /// Debt value still to be raised
    pub tab: DebtValue,
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUCTION ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Dutch-auction engine for one collateral type
#[derive(Debug)]
pub struct AuctionEngine {
    /// Collateral type this engine sells
    collateral: CollateralId,
    /// Escrow holding the collateral under auction
    escrow: EscrowId,
    /// Price decay curve
    calculator: Box<dyn PriceCalculator>,
    /// Multiplier on the feed price to form the starting price
    price_buffer: Decimal,
    /// Seconds before a sale becomes stale regardless of price
    time_before_reset: u64,
    /// Price ratio below which a sale is stale
    floor_ratio: Decimal,
    /// Flat keeper incentive
    incentive_flat: DebtValue,
    /// Tab-proportional keeper incentive
    incentive_rate: Decimal,
    /// Minimum tab a partial purchase may leave behind
    min_sale_target: DebtValue,
    /// Account auction proceeds and incentives are booked against
    sink: AccountId,
    /// Sales by id
    sales: HashMap<SaleId, Sale>,
    /// Ids of running sales; removal swaps with the tail
    active: Vec<SaleId>,
    /// Next sale id
    next_id: u64,
    /// Lifetime sales started
    total_sales_started: u64,
    /// Lifetime debt value recovered through purchases
    total_debt_recovered: DebtValue,
}

impl AuctionEngine {
    /// Create an engine selling `collateral` out of `escrow`
    pub fn new(
        collateral: CollateralId,
        escrow: EscrowId,
        calculator: Box<dyn PriceCalculator>,
        params: AuctionParams,
        sink: AccountId,
    ) -> Result<Self> {
        params.validate()?;
        let incentive_flat =
            DebtValue::new(params.incentive_flat).map_err(|_| Error::InvalidParameter {
                name: "incentive_flat".into(),
                reason: "must not be negative".into(),
            })?;
        Ok(Self {
            collateral,
            escrow,
            calculator,
            price_buffer: params.price_buffer,
            time_before_reset: params.time_before_reset,
            floor_ratio: Decimal::ONE + params.reset_price_drop,
            incentive_flat,
            incentive_rate: params.incentive_rate,
            min_sale_target: DebtValue::ZERO,
            sink,
            sales: HashMap::new(),
            active: Vec::new(),
            next_id: 0,
            total_sales_started: 0,
            total_debt_recovered: DebtValue::ZERO,
        })
    }

    /// Collateral type this engine sells
    pub fn collateral(&self) -> CollateralId {
        self.collateral
    }

    /// Escrow holding the collateral under auction
    pub fn escrow(&self) -> EscrowId {
        self.escrow
    }

    /// Minimum tab a partial purchase may leave behind
    pub fn min_sale_target(&self) -> DebtValue {
        self.min_sale_target
    }

    /// Refresh the partial-purchase floor (ledger dust × trigger penalty)
    pub(crate) fn set_min_sale_target(&mut self, target: DebtValue) {
        self.min_sale_target = target;
    }

    /// A sale by id, if running
    pub fn sale(&self, id: SaleId) -> Option<&Sale> {
        self.sales.get(&id)
    }

    /// Ids of all running sales
    pub fn active_sales(&self) -> &[SaleId] {
        &self.active
    }

    /// Number of running sales
    pub fn sale_count(&self) -> usize {
        self.sales.len()
    }

    /// Lifetime sales started
    pub fn total_sales_started(&self) -> u64 {
        self.total_sales_started
    }

    /// Lifetime debt value recovered through purchases
    pub fn total_debt_recovered(&self) -> DebtValue {
        self.total_debt_recovered
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Open a sale raising `tab` from `lot` collateral
    ///
    /// The starting price is `feed_price × price_buffer`. Leftover collateral
    /// goes back to `original_owner`, who must be registered. Mints the
    /// configured incentive to the keeper against the sink.
    pub fn start(
        &mut self,
        ledger: &mut Ledger,
        feed_price: Price,
        tab: DebtValue,
        lot: CollateralAmount,
        original_owner: AccountId,
        keeper: AccountId,
        now: u64,
    ) -> Result<SaleId> {
        if !tab.is_positive() {
            return Err(Error::InvalidParameter {
                name: "tab".into(),
                reason: "must be positive".into(),
            });
        }
        if !lot.is_positive() {
            return Err(Error::InvalidParameter {
                name: "lot".into(),
                reason: "must be positive".into(),
            });
        }
        if !feed_price.is_positive() {
            return Err(Error::InvalidParameter {
                name: "feed_price".into(),
                reason: "must be positive".into(),
            });
        }
        if !ledger.is_registered(original_owner) {
            return Err(Error::InvalidParameter {
                name: "original_owner".into(),
                reason: "account not registered".into(),
            });
        }
        if !ledger.is_open() {
            return Err(Error::MarketClosed);
        }
        let start_price = feed_price
            .scaled(self.price_buffer)
            .ok_or_else(|| Error::Overflow {
                operation: "start price".into(),
            })?;
        let incentive = self.incentive_for(tab)?;

        let id = SaleId(self.next_id);
        self.next_id += 1;
        self.sales.insert(
            id,
            Sale {
                index: self.active.len(),
                tab,
                collateral_to_sell: lot,
                original_owner,
                start_time: now,
                start_price,
            },
        );
        self.active.push(id);
        self.total_sales_started += 1;

        if !incentive.is_zero() {
            ledger.add_debt(self.sink, keeper, incentive)?;
        }
        tracing::info!(
            collateral = %self.collateral,
            sale = %id,
            tab = %tab,
            lot = %lot,
            start_price = %start_price,
            "auction started"
        );
        Ok(id)
    }

    /// Asking price of a sale at `now`
    pub fn price_at(&self, sale: &Sale, now: u64) -> Price {
        let elapsed = now.saturating_sub(sale.start_time);
        self.calculator.price(sale.start_price, elapsed)
    }

    /// Whether a sale has run too long or its price fell through the floor
    pub fn needs_reset(&self, sale: &Sale, now: u64) -> bool {
        let elapsed = now.saturating_sub(sale.start_time);
        if elapsed > self.time_before_reset {
            return true;
        }
        let price = self.calculator.price(sale.start_price, elapsed);
        let ratio = price
            .raw()
            .checked_div(sale.start_price.raw())
            .unwrap_or(Decimal::ZERO);
        ratio < self.floor_ratio
    }

    /// Point-in-time view of a sale
    pub fn status(&self, id: SaleId, now: u64) -> Result<AuctionStatus> {
        let sale = self
            .sales
            .get(&id)
            .ok_or(Error::SaleNotFound(id.raw()))?;
        Ok(AuctionStatus {
            needs_reset: self.needs_reset(sale, now),
            price: self.price_at(sale, now),
            collateral_to_sell: sale.collateral_to_sell,
            tab: sale.tab,
        })
    }

    /// Restart a stale sale from a fresh feed read
    ///
    /// Pays the keeper incentive again only when the remaining tab and the
    /// lot's feed value both clear `min_sale_target`.
    pub fn reset(
        &mut self,
        ledger: &mut Ledger,
        feed_price: Price,
        id: SaleId,
        keeper: AccountId,
        now: u64,
    ) -> Result<()> {
        let sale = self
            .sales
            .get(&id)
            .ok_or(Error::SaleNotFound(id.raw()))?;
        if !self.needs_reset(sale, now) {
            return Err(Error::CannotReset(id.raw()));
        }
        if !feed_price.is_positive() {
            return Err(Error::InvalidParameter {
                name: "feed_price".into(),
                reason: "must be positive".into(),
            });
        }
        if !ledger.is_open() {
            return Err(Error::MarketClosed);
        }
        let start_price = feed_price
            .scaled(self.price_buffer)
            .ok_or_else(|| Error::Overflow {
                operation: "start price".into(),
            })?;
        let lot_value = sale
            .collateral_to_sell
            .value_at(feed_price)
            .ok_or_else(|| Error::Overflow {
                operation: "lot value".into(),
            })?;
        let re_incentivize =
            sale.tab >= self.min_sale_target && lot_value >= self.min_sale_target;
        let incentive = if re_incentivize {
            self.incentive_for(sale.tab)?
        } else {
            DebtValue::ZERO
        };

        let sale = self
            .sales
            .get_mut(&id)
            .ok_or(Error::SaleNotFound(id.raw()))?;
        sale.start_price = start_price;
        sale.start_time = now;

        if !incentive.is_zero() {
            ledger.add_debt(self.sink, keeper, incentive)?;
        }
        tracing::info!(
            collateral = %self.collateral,
            sale = %id,
            start_price = %start_price,
            "auction reset"
        );
        Ok(())
    }

    /// Buy up to `max_lot` collateral at the current price
    ///
    /// The cost is clamped to the remaining tab; a partial purchase may not
    /// leave a residual tab below `min_sale_target`. The receiver pays from
    /// its free debt (self-consent required) and gets the collateral; freed
    /// capacity is returned to the trigger. When the tab is cleared, leftover
    /// collateral goes back to the original owner.
    #[allow(clippy::too_many_arguments)]
    pub fn buy(
        &mut self,
        ledger: &mut Ledger,
        trigger: &mut LiquidationTrigger,
        id: SaleId,
        max_lot: CollateralAmount,
        max_price: Price,
        receiver: AccountId,
        now: u64,
    ) -> Result<Purchase> {
        if !max_lot.is_positive() {
            return Err(Error::InvalidParameter {
                name: "max_lot".into(),
                reason: "must be positive".into(),
            });
        }
        let sale = *self
            .sales
            .get(&id)
            .ok_or(Error::SaleNotFound(id.raw()))?;
        if self.needs_reset(&sale, now) {
            return Err(Error::StaleAuction(id.raw()));
        }
        let price = self.price_at(&sale, now);
        if price > max_price {
            return Err(Error::TooExpensive {
                price: price.raw(),
                max: max_price.raw(),
            });
        }

        let mut slice = sale.collateral_to_sell.min(max_lot);
        let mut owe = slice.value_at(price).ok_or_else(|| Error::Overflow {
            operation: "purchase cost".into(),
        })?;
        if owe > sale.tab {
            // pay at most the tab and resize the slice
            owe = sale.tab;
            slice = owe.collateral_at(price).ok_or_else(|| Error::Overflow {
                operation: "purchase sizing".into(),
            })?;
        } else if owe < sale.tab && slice < sale.collateral_to_sell {
            let residual = sale
                .tab
                .checked_sub(owe)
                .ok_or_else(|| Error::Overflow {
                    operation: "residual tab".into(),
                })?;
            if residual < self.min_sale_target {
                if sale.tab <= self.min_sale_target {
                    return Err(Error::BelowDust {
                        tab: sale.tab.raw(),
                        minimum: self.min_sale_target.raw(),
                    });
                }
                // leave exactly the minimum viable tab behind
                owe = sale
                    .tab
                    .checked_sub(self.min_sale_target)
                    .ok_or_else(|| Error::Overflow {
                        operation: "clamped cost".into(),
                    })?;
                slice = owe.collateral_at(price).ok_or_else(|| Error::Overflow {
                    operation: "purchase sizing".into(),
                })?;
            }
        }

        // every ledger leg is validated before any state moves
        if !ledger.is_open() {
            return Err(Error::MarketClosed);
        }
        if !ledger.allows(receiver, receiver) {
            return Err(Error::NotAuthorized {
                grantor: receiver.short(),
                actor: receiver.short(),
            });
        }
        let funds = ledger.free_debt(receiver);
        if funds < owe {
            return Err(Error::InsufficientDebt {
                required: owe.raw(),
                available: funds.raw(),
            });
        }
        let held = ledger.escrow_balance(self.escrow, self.collateral);
        if held < slice {
            return Err(Error::Internal(format!(
                "escrow {} holds {} but sale {} offers {}",
                self.escrow, held, id, slice
            )));
        }

        let new_tab = sale.tab.checked_sub(owe).ok_or_else(|| Error::Overflow {
            operation: "tab".into(),
        })?;
        let new_lot = sale
            .collateral_to_sell
            .checked_sub(slice)
            .ok_or_else(|| Error::Overflow {
                operation: "lot".into(),
            })?;

        ledger.escrow_release(self.collateral, self.escrow, receiver, slice)?;
        if !owe.is_zero() {
            ledger.transfer_debt(receiver, receiver, self.sink, owe)?;
        }

        let concluded;
        let released;
        if new_lot.is_zero() {
            // out of collateral; the unraised remainder is written off
            released = new_tab.checked_add(owe).ok_or_else(|| Error::Overflow {
                operation: "released capacity".into(),
            })?;
            self.remove_sale(id);
            concluded = true;
        } else if new_tab.is_zero() {
            ledger.escrow_release(self.collateral, self.escrow, sale.original_owner, new_lot)?;
            released = owe;
            self.remove_sale(id);
            concluded = true;
        } else {
            released = owe;
            if let Some(live) = self.sales.get_mut(&id) {
                live.tab = new_tab;
                live.collateral_to_sell = new_lot;
            }
            concluded = false;
        }
        trigger.release_capacity(self.collateral, released)?;
        self.total_debt_recovered = self
            .total_debt_recovered
            .checked_add(owe)
            .unwrap_or(self.total_debt_recovered);

        tracing::info!(
            collateral = %self.collateral,
            sale = %id,
            bought = %slice,
            cost = %owe,
            price = %price,
            concluded,
            "auction purchase"
        );
        Ok(Purchase {
            sale: id,
            collateral_bought: slice,
            cost: owe,
            price,
            tab_remaining: new_tab,
            collateral_remaining: if concluded {
                CollateralAmount::ZERO
            } else {
                new_lot
            },
            concluded,
        })
    }

    /// Wind a sale down, sending its collateral to `receiver`
    ///
    /// Frees the sale's full remaining tab of trigger capacity. Cancelling a
    /// sale that already concluded is a no-op.
    pub fn cancel(
        &mut self,
        ledger: &mut Ledger,
        trigger: &mut LiquidationTrigger,
        id: SaleId,
        receiver: AccountId,
    ) -> Result<()> {
        let sale = match self.sales.get(&id) {
            Some(sale) => *sale,
            None => return Ok(()),
        };
        trigger.release_capacity(self.collateral, sale.tab)?;
        if !sale.collateral_to_sell.is_zero() {
            ledger.escrow_release(
                self.collateral,
                self.escrow,
                receiver,
                sale.collateral_to_sell,
            )?;
        }
        self.remove_sale(id);
        tracing::warn!(
            collateral = %self.collateral,
            sale = %id,
            tab = %sale.tab,
            "auction cancelled"
        );
        Ok(())
    }

    /// Keeper incentive for a tab
    fn incentive_for(&self, tab: DebtValue) -> Result<DebtValue> {
        let proportional = tab
            .scaled(self.incentive_rate)
            .ok_or_else(|| Error::Overflow {
                operation: "incentive".into(),
            })?;
        self.incentive_flat
            .checked_add(proportional)
            .ok_or_else(|| Error::Overflow {
                operation: "incentive".into(),
            })
    }

    /// Swap-remove a sale from the active list, patching the moved index
    fn remove_sale(&mut self, id: SaleId) {
        if let Some(sale) = self.sales.remove(&id) {
            let last = self.active.len() - 1;
            if sale.index != last {
                let moved = self.active[last];
                self.active[sale.index] = moved;
                if let Some(m) = self.sales.get_mut(&moved) {
                    m.index = sale.index;
                }
            }
            self.active.pop();
        }
    }
}
