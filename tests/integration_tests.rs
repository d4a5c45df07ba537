//! Integration tests for the breakwater market.
//!
//! These tests drive complete lifecycles through the assembled [`Market`]:
//! loans, liquidations, Dutch auctions, configuration files, and the
//! conservation identities under randomized operation sequences.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use breakwater::config::{CollateralConfig, CurveConfig, MarketConfig, SinkConfig};
use breakwater::core::collateral::CollateralInfo;
use breakwater::core::ids::{AccountId, CollateralId};
use breakwater::core::units::{
    CollateralAmount, CollateralDelta, DebtAmount, DebtDelta, DebtValue, Price, Rate,
};
use breakwater::error::Error;
use breakwater::liquidation::decay::{
    ExponentialDecrease, LinearDecrease, PriceCalculator, StairstepExponentialDecrease,
};
use breakwater::liquidation::engine::AuctionParams;
use breakwater::market::Market;
use breakwater::oracle::{PriceOracle, StaticOracle};
use breakwater::sink::{DebtBuffer, DebtSink};

// ═══════════════════════════════════════════════════════════════════════════════
// TEST HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

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

fn eth() -> CollateralId {
    CollateralId::new("ETH").unwrap()
}

/// A market with one listed type at spot 2, no penalty, no price buffer,
/// and a slow linear curve, so auction numbers read off directly.
fn test_market() -> Market {
    let mut oracle = StaticOracle::new();
    oracle.set_price(eth(), price("2"));
    let mut market = Market::new(
        value("10000"),
        value("1000"),
        oracle,
        DebtBuffer::new(AccountId::named("sink"), 0),
    );
    market
        .add_collateral(
            eth(),
            CollateralInfo::new(price("2"), value("10000"), DebtValue::ZERO, Rate::ONE),
            dec!(1),
            value("1000"),
            Box::new(LinearDecrease::new(7200).unwrap()),
            AuctionParams {
                price_buffer: dec!(1),
                ..AuctionParams::default()
            },
        )
        .unwrap();
    market
}

/// Register an account and give it a funded loan: locked collateral plus
/// drawn free debt.
fn fund(market: &mut Market, user: AccountId, collateral: &str, drawn: &str) {
    market.register_account(user);
    market
        .modify_collateral(eth(), user, CollateralDelta::increase(coll(collateral)))
        .unwrap();
    market
        .modify_loan(
            eth(),
            user,
            user,
            CollateralDelta::increase(coll(collateral)),
            DebtDelta::increase(debt(drawn)),
        )
        .unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOAN LIFECYCLE TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_full_loan_lifecycle() {
    let mut market = test_market();
    let alice = AccountId::named("alice");
    market.register_account(alice);

    // Step 1: deposit and lock collateral, draw debt
    market
        .modify_collateral(eth(), alice, CollateralDelta::increase(coll("10")))
        .unwrap();
    market
        .modify_loan(
            eth(),
            alice,
            alice,
            CollateralDelta::increase(coll("10")),
            DebtDelta::increase(debt("12")),
        )
        .unwrap();
    assert_eq!(market.ledger().free_debt(alice), value("12"));
    assert!(market.ledger().verify_accounting());

    // Step 2: repay half
    market
        .modify_loan(
            eth(),
            alice,
            alice,
            CollateralDelta::ZERO,
            DebtDelta::decrease(debt("6")),
        )
        .unwrap();

    // Step 3: withdraw what the remaining debt no longer needs
    market
        .modify_loan(
            eth(),
            alice,
            alice,
            CollateralDelta::decrease(coll("6")),
            DebtDelta::ZERO,
        )
        .unwrap();
    assert_eq!(market.ledger().free_collateral(eth(), alice), coll("6"));

    // Step 4: repay the rest and unwind completely
    market
        .modify_loan(
            eth(),
            alice,
            alice,
            CollateralDelta::decrease(coll("4")),
            DebtDelta::decrease(debt("6")),
        )
        .unwrap();
    let loan = market.ledger().loan(eth(), alice);
    assert!(loan.is_empty());
    assert_eq!(market.ledger().free_collateral(eth(), alice), coll("10"));
    assert_eq!(market.ledger().total_debt_issued(), DebtValue::ZERO);
    assert!(market.ledger().verify_accounting());
}

#[test]
fn test_unsafe_withdrawal_rejected_and_loan_unchanged() {
    let mut market = test_market();
    market.set_spot_price(eth(), price("1")).unwrap();
    let bob = AccountId::named("bob");
    fund(&mut market, bob, "3", "2");

    let err = market
        .modify_loan(
            eth(),
            bob,
            bob,
            CollateralDelta::decrease(coll("2.95")),
            DebtDelta::ZERO,
        )
        .unwrap_err();
    assert_eq!(
        err,
        Error::Undercollateralized {
            tab: dec!(2),
            collateral_value: dec!(0.05),
        }
    );

    let loan = market.ledger().loan(eth(), bob);
    assert_eq!(loan.collateral_amount, coll("3"));
    assert_eq!(loan.debt_amount, debt("2"));
    assert_eq!(
        market.ledger().free_collateral(eth(), bob),
        CollateralAmount::ZERO
    );
}

#[test]
fn test_third_party_loan_management_follows_consent() {
    let mut market = test_market();
    let alice = AccountId::named("alice");
    let manager = AccountId::named("manager");
    fund(&mut market, alice, "10", "4");
    market.register_account(manager);

    // without consent the manager cannot touch alice's position
    let err = market
        .modify_loan(
            eth(),
            alice,
            manager,
            CollateralDelta::ZERO,
            DebtDelta::increase(debt("1")),
        )
        .unwrap_err();
    assert!(matches!(err, Error::NotAuthorized { .. }));

    market.grant_consent(alice, manager).unwrap();
    market
        .modify_loan(
            eth(),
            alice,
            manager,
            CollateralDelta::ZERO,
            DebtDelta::increase(debt("1")),
        )
        .unwrap();
    assert_eq!(market.ledger().loan(eth(), alice).debt_amount, debt("5"));

    market.revoke_consent(alice, manager);
    let err = market
        .modify_loan(
            eth(),
            alice,
            manager,
            CollateralDelta::ZERO,
            DebtDelta::increase(debt("1")),
        )
        .unwrap_err();
    assert!(matches!(err, Error::NotAuthorized { .. }));
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION AND AUCTION LIFECYCLE TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_liquidation_auction_settlement_lifecycle() {
    let mut market = test_market();
    let alice = AccountId::named("alice");
    let keeper = AccountId::named("keeper");
    fund(&mut market, alice, "5", "10");
    fund(&mut market, keeper, "50", "20");

    // spot drops below break-even while the feed still reads 3
    market.oracle_mut().set_price(eth(), price("3"));
    market.set_spot_price(eth(), price("1.5")).unwrap();
    let sale = market.liquidate(eth(), alice, keeper, 100).unwrap();

    // tab 10 for 5 ETH starting at the raw feed of 3
    let opened = *market.engine(eth()).unwrap().sale(sale).unwrap();
    assert_eq!(opened.tab, value("10"));
    assert_eq!(opened.collateral_to_sell, coll("5"));
    assert_eq!(opened.start_price, price("3"));
    assert_eq!(market.trigger().cost(), value("10"));

    // a greedy bid clamps to the tab; the rest returns to the owner
    let purchase = market
        .auction_buy(eth(), sale, coll("5"), price("3"), keeper, 100)
        .unwrap();
    assert!(purchase.concluded);
    assert_eq!(purchase.cost, value("10"));
    assert_eq!(purchase.collateral_bought.raw(), dec!(10) / dec!(3));
    assert_eq!(
        market.ledger().free_collateral(eth(), alice).raw(),
        dec!(5) - dec!(10) / dec!(3)
    );
    assert_eq!(market.trigger().cost(), DebtValue::ZERO);
    assert!(market.active_auctions(eth()).unwrap().is_empty());
    assert!(matches!(
        market.auction_status(eth(), sale, 100),
        Err(Error::SaleNotFound(_))
    ));

    // auction proceeds retire the seized debt
    assert_eq!(market.sink_mut().mature(100), value("10"));
    market.settle_debt(value("10")).unwrap();
    assert_eq!(
        market.ledger().seized_debt(AccountId::named("sink")),
        DebtValue::ZERO
    );
    assert!(market.ledger().verify_accounting());
}

#[test]
fn test_reliquidation_of_seized_loan_rejected() {
    let mut market = test_market();
    let alice = AccountId::named("alice");
    let keeper = AccountId::named("keeper");
    fund(&mut market, alice, "5", "10");
    fund(&mut market, keeper, "50", "20");

    market.oracle_mut().set_price(eth(), price("1.5"));
    market.refresh_price(eth()).unwrap();
    market.liquidate(eth(), alice, keeper, 100).unwrap();

    let snapshot = market.ledger().to_bytes().unwrap();
    let err = market.liquidate(eth(), alice, keeper, 101).unwrap_err();
    assert!(matches!(err, Error::LoanHealthy(_)));
    assert_eq!(market.ledger().to_bytes().unwrap(), snapshot);
}

#[test]
fn test_stale_auction_reset_and_late_buy() {
    let mut market = test_market();
    let alice = AccountId::named("alice");
    let keeper = AccountId::named("keeper");
    fund(&mut market, alice, "5", "10");
    fund(&mut market, keeper, "50", "20");

    market.oracle_mut().set_price(eth(), price("2.5"));
    market.set_spot_price(eth(), price("1.5")).unwrap();
    let sale = market.liquidate(eth(), alice, keeper, 0).unwrap();

    // past time_before_reset the sale only accepts a reset
    let stale_at = 3601;
    assert!(market
        .auction_status(eth(), sale, stale_at)
        .unwrap()
        .needs_reset);
    let err = market
        .auction_buy(eth(), sale, coll("1"), price("99"), keeper, stale_at)
        .unwrap_err();
    assert!(matches!(err, Error::StaleAuction(_)));

    // the feed recovered; the reset restarts the clock from it
    market.oracle_mut().set_price(eth(), price("2"));
    market.auction_reset(eth(), sale, keeper, stale_at).unwrap();
    let status = market.auction_status(eth(), sale, stale_at).unwrap();
    assert!(!status.needs_reset);
    assert_eq!(status.price, price("2"));

    let purchase = market
        .auction_buy(eth(), sale, coll("5"), price("2"), keeper, stale_at)
        .unwrap();
    assert!(purchase.concluded);
    assert_eq!(purchase.cost, value("10"));
    assert!(market.ledger().verify_accounting());
}

#[test]
fn test_capacity_bounds_concurrent_auctions() {
    let mut market = test_market();
    market.set_auction_capacity(eth(), value("15")).unwrap();
    let alice = AccountId::named("alice");
    let bob = AccountId::named("bob");
    let keeper = AccountId::named("keeper");
    fund(&mut market, alice, "5", "10");
    fund(&mut market, bob, "5", "10");
    fund(&mut market, keeper, "50", "20");

    market.oracle_mut().set_price(eth(), price("1.5"));
    market.refresh_price(eth()).unwrap();

    // the first seizure takes 10 of the 15-capacity; the second only fits 5,
    // and a 5 residual is fine with no dust floor
    market.liquidate(eth(), alice, keeper, 0).unwrap();
    market.liquidate(eth(), bob, keeper, 0).unwrap();
    assert_eq!(market.trigger().cost(), value("15"));
    assert_eq!(market.ledger().loan(eth(), bob).debt_amount, debt("5"));

    let err = market.liquidate(eth(), bob, keeper, 0).unwrap_err();
    assert!(matches!(err, Error::CapacityExhausted { .. }));
    assert_eq!(market.active_auctions(eth()).unwrap().len(), 2);

    // cancelling one auction frees room for the rest of bob's position
    let sales = market.active_auctions(eth()).unwrap();
    market.auction_cancel(eth(), sales[0], keeper).unwrap();
    assert_eq!(market.trigger().cost(), value("5"));
    market.liquidate(eth(), bob, keeper, 0).unwrap();
    assert!(market.ledger().verify_accounting());
}

#[test]
fn test_interest_accrual_inflates_tab() {
    let mut market = test_market();
    let alice = AccountId::named("alice");
    let treasury = AccountId::named("treasury");
    fund(&mut market, alice, "5", "4");
    market.register_account(treasury);

    market
        .modify_interest_rate(eth(), treasury, dec!(0.25))
        .unwrap();
    assert_eq!(market.ledger().free_debt(treasury), value("1"));

    // alice now owes 4 × 1.25 = 5; withdrawing below that fails
    let err = market
        .modify_loan(
            eth(),
            alice,
            alice,
            CollateralDelta::decrease(coll("2.6")),
            DebtDelta::ZERO,
        )
        .unwrap_err();
    assert!(matches!(err, Error::Undercollateralized { .. }));
    assert!(market.ledger().verify_accounting());
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKET CLOSE TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_closed_market_blocks_new_risk_allows_unwind() {
    let mut market = test_market();
    let alice = AccountId::named("alice");
    fund(&mut market, alice, "10", "4");
    market.close();

    let err = market
        .modify_loan(
            eth(),
            alice,
            alice,
            CollateralDelta::ZERO,
            DebtDelta::decrease(debt("1")),
        )
        .unwrap_err();
    assert_eq!(err, Error::MarketClosed);

    let err = market.liquidate(eth(), alice, alice, 0).unwrap_err();
    assert_eq!(err, Error::MarketClosed);

    // free balances still unwind
    market
        .modify_collateral(eth(), alice, CollateralDelta::increase(coll("1")))
        .unwrap();
    market
        .modify_collateral(eth(), alice, CollateralDelta::decrease(coll("1")))
        .unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION TESTS
// ═══════════════════════════════════════════════════════════════════════════════

fn sample_config() -> MarketConfig {
    MarketConfig {
        system_max_debt: dec!(100000),
        max_auction_cost: dec!(10000),
        sink: SinkConfig {
            account: "buffer".into(),
            maturation_delay_secs: 120,
        },
        collaterals: vec![CollateralConfig {
            symbol: "WSTETH".into(),
            spot_price: dec!(2400),
            max_debt: dec!(60000),
            min_debt: dec!(500),
            penalty: dec!(1.13),
            max_auction_cost: dec!(8000),
            curve: CurveConfig::Stairstep {
                step_secs: 90,
                factor: dec!(0.99),
            },
            auction: AuctionParams::default(),
        }],
    }
}

#[test]
fn test_config_file_round_trip_builds_market() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("market").join("config.json");

    sample_config().save(&path).unwrap();
    let loaded = MarketConfig::load(&path).unwrap();
    assert_eq!(loaded, sample_config());

    let market = Market::from_config(&loaded).unwrap();
    let wsteth = CollateralId::new("WSTETH").unwrap();
    assert_eq!(
        market.oracle().safe_price(wsteth).unwrap(),
        Price::new(dec!(2400)).unwrap()
    );
    assert_eq!(
        market.engine(wsteth).unwrap().min_sale_target(),
        DebtValue::new(dec!(565)).unwrap()
    );
    assert_eq!(market.sink().account(), AccountId::named("buffer"));
}

#[test]
fn test_config_load_rejects_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = MarketConfig::load(&path).unwrap_err();
    assert!(matches!(err, Error::Deserialization(_)));
}

#[test]
fn test_config_load_rejects_invalid_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let mut config = sample_config();
    config.collaterals[0].penalty = dec!(0.5);
    let json = serde_json::to_string_pretty(&config).unwrap();
    std::fs::write(&path, json).unwrap();

    let err = MarketConfig::load(&path).unwrap_err();
    assert!(matches!(err, Error::InvalidParameter { .. }));
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPERTY TESTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Total collateral of one type across free balances, locked loan
/// balances, and the auction escrow.
fn total_collateral(market: &Market, accounts: &[AccountId]) -> Decimal {
    let escrow = market.engine(eth()).unwrap().escrow();
    let mut total = market.ledger().escrow_balance(escrow, eth()).raw();
    for &user in accounts {
        total += market.ledger().free_collateral(eth(), user).raw();
        total += market.ledger().loan(eth(), user).collateral_amount.raw();
    }
    total
}

proptest! {
    /// Debt and collateral conservation survive arbitrary loan activity,
    /// a price crash, liquidations, and auction purchases, whether the
    /// individual operations succeed or reject.
    #[test]
    fn conservation_holds_under_random_activity(
        positions in proptest::collection::vec((1u32..=50, 0u32..=40), 1..6),
        crash_bps in 100u32..=9999,
        bid in 1u32..=60,
    ) {
        let mut market = test_market();
        let whale = AccountId::named("whale");
        fund(&mut market, whale, "10000", "5000");

        let mut accounts = vec![whale, AccountId::named("sink")];
        let mut deposited = dec!(10000);
        for (i, &(lock, draw)) in positions.iter().enumerate() {
            let user = AccountId::named(&format!("user-{}", i));
            accounts.push(user);
            market.register_account(user);
            let lock = Decimal::from(lock);
            market
                .modify_collateral(eth(), user, CollateralDelta::new(lock))
                .unwrap();
            deposited += lock;
            // draws may reject on safety; rejections must change nothing
            let _ = market.modify_loan(
                eth(),
                user,
                user,
                CollateralDelta::new(lock),
                DebtDelta::new(Decimal::from(draw)),
            );
            prop_assert!(market.ledger().verify_accounting());
            prop_assert_eq!(total_collateral(&market, &accounts), deposited);
        }

        // crash the market and liquidate whatever became unsafe
        let crashed = dec!(2) * Decimal::from(crash_bps) / dec!(10000);
        market.oracle_mut().set_price(eth(), Price::new(crashed).unwrap());
        market.refresh_price(eth()).unwrap();
        for &user in &accounts {
            let _ = market.liquidate(eth(), user, whale, 0);
            prop_assert!(market.ledger().verify_accounting());
            prop_assert_eq!(total_collateral(&market, &accounts), deposited);
        }

        // the whale bids on every open auction at the starting price
        for sale in market.active_auctions(eth()).unwrap() {
            let _ = market.auction_buy(
                eth(),
                sale,
                CollateralAmount::new(Decimal::from(bid)).unwrap(),
                price("1000000"),
                whale,
                0,
            );
            prop_assert!(market.ledger().verify_accounting());
            prop_assert_eq!(total_collateral(&market, &accounts), deposited);
        }
    }

    /// Every decay curve is monotone non-increasing in elapsed time.
    #[test]
    fn decay_curves_never_increase(
        start in 1u32..=1_000_000,
        earlier in 0u64..100_000,
        gap in 0u64..100_000,
        step_secs in 1u64..10_000,
        factor_bps in 0u32..=10_000,
    ) {
        let start = Price::new(Decimal::from(start)).unwrap();
        let factor = Decimal::from(factor_bps) / dec!(10000);
        let later = earlier + gap;

        let curves: Vec<Box<dyn PriceCalculator>> = vec![
            Box::new(LinearDecrease::new(7200).unwrap()),
            Box::new(StairstepExponentialDecrease::new(step_secs, factor).unwrap()),
            Box::new(ExponentialDecrease::new(factor).unwrap()),
        ];
        for curve in &curves {
            prop_assert!(curve.price(start, later) <= curve.price(start, earlier));
            prop_assert!(curve.price(start, 0) <= start);
        }
    }
}
