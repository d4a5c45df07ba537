//! Breakwater CLI
//!
//! Command-line interface for inspecting decay curves, managing market
//! configuration files, and running a deterministic end-to-end simulation
//! of the lending ledger and its Dutch-auction liquidations.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::{style, Term};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use breakwater::config::{CollateralConfig, CurveConfig, MarketConfig, SinkConfig};
use breakwater::core::ids::{AccountId, CollateralId};
use breakwater::core::units::{CollateralAmount, CollateralDelta, DebtAmount, DebtDelta, Price};
use breakwater::liquidation::decay::PriceCalculator;
use breakwater::liquidation::engine::AuctionParams;
use breakwater::market::Market;
use breakwater::sink::DebtSink;

/// Breakwater CLI - Over-collateralized lending with Dutch-auction liquidations
#[derive(Parser)]
#[command(name = "breakwater")]
#[command(author = "Breakwater Team")]
#[command(version = breakwater::VERSION)]
#[command(about = "Command-line interface for the breakwater market", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a deterministic liquidation scenario end to end
    Simulate {
        /// Seconds between simulation steps
        #[arg(long, default_value = "720")]
        interval: u64,

        /// Maximum number of steps before giving up on the auction
        #[arg(long, default_value = "10")]
        max_steps: u64,
    },

    /// Print a price-decay table for one curve
    #[command(subcommand)]
    Curves(CurveCommands),

    /// Market configuration files
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum CurveCommands {
    /// Linear decay to zero over a fixed duration
    Linear {
        /// Seconds from start price to zero
        #[arg(long, default_value = "3600")]
        max_duration: u64,

        /// Starting price
        #[arg(long, default_value = "100")]
        start: Decimal,

        /// Seconds between table rows
        #[arg(long, default_value = "300")]
        interval: u64,
    },

    /// Multiplicative decay applied once per whole step
    Stairstep {
        /// Seconds between price cuts
        #[arg(long, default_value = "60")]
        step_secs: u64,

        /// Multiplier applied per step
        #[arg(long, default_value = "0.99")]
        factor: Decimal,

        /// Starting price
        #[arg(long, default_value = "100")]
        start: Decimal,

        /// Seconds covered by the table
        #[arg(long, default_value = "3600")]
        horizon: u64,

        /// Seconds between table rows
        #[arg(long, default_value = "300")]
        interval: u64,
    },

    /// Multiplicative decay applied every second
    Exponential {
        /// Multiplier applied per second
        #[arg(long, default_value = "0.999")]
        factor: Decimal,

        /// Starting price
        #[arg(long, default_value = "100")]
        start: Decimal,

        /// Seconds covered by the table
        #[arg(long, default_value = "3600")]
        horizon: u64,

        /// Seconds between table rows
        #[arg(long, default_value = "300")]
        interval: u64,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a sample market configuration
    Init {
        /// Destination path
        #[arg(short, long, default_value = "breakwater.json")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Load a configuration and print a summary
    Show {
        /// Configuration file to read
        #[arg(short, long, default_value = "breakwater.json")]
        path: PathBuf,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════════════════════

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let term = Term::stdout();

    if let Err(e) = run_command(&cli, &term) {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run_command(cli: &Cli, term: &Term) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Simulate {
            interval,
            max_steps,
        } => cmd_simulate(cli, *interval, *max_steps, term),
        Commands::Curves(cmd) => cmd_curves(cmd, term),
        Commands::Config(cmd) => cmd_config(cmd, term),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIMULATION
// ═══════════════════════════════════════════════════════════════════════════════

/// The built-in scenario: one ETH-like collateral type with a generous
/// auction capacity and the stock linear curve.
fn scenario_config() -> MarketConfig {
    MarketConfig {
        system_max_debt: dec!(100000),
        max_auction_cost: dec!(20000),
        sink: SinkConfig {
            account: "sink".into(),
            maturation_delay_secs: 0,
        },
        collaterals: vec![CollateralConfig {
            symbol: "ETH".into(),
            spot_price: dec!(2000),
            max_debt: dec!(50000),
            min_debt: dec!(100),
            penalty: dec!(1.13),
            max_auction_cost: dec!(20000),
            curve: CurveConfig::Linear {
                max_duration_secs: 7200,
            },
            auction: AuctionParams::default(),
        }],
    }
}

fn cmd_simulate(cli: &Cli, interval: u64, max_steps: u64, term: &Term) -> anyhow::Result<()> {
    let base_time = chrono::Utc::now();
    let clock = |t: u64| (base_time + chrono::Duration::seconds(t as i64)).format("%H:%M:%S");

    let _ = term.write_line(&format!(
        "{} Building market from the built-in scenario...",
        style("→").cyan()
    ));

    let config = scenario_config();
    let mut market = Market::from_config(&config)?;
    let eth = CollateralId::new("ETH")?;

    let alice = AccountId::named("alice");
    let keeper = AccountId::named("keeper");
    market.register_account(alice);
    market.register_account(keeper);

    // Alice borrows close to her limit; the keeper keeps a deep buffer
    market.modify_collateral(eth, alice, CollateralDelta::increase(amount(dec!(10))?))?;
    market.modify_loan(
        eth,
        alice,
        alice,
        CollateralDelta::increase(amount(dec!(10))?),
        DebtDelta::increase(DebtAmount::new(dec!(12000))?),
    )?;
    market.modify_collateral(eth, keeper, CollateralDelta::increase(amount(dec!(40))?))?;
    market.modify_loan(
        eth,
        keeper,
        keeper,
        CollateralDelta::increase(amount(dec!(40))?),
        DebtDelta::increase(DebtAmount::new(dec!(20000))?),
    )?;

    let _ = term.write_line(&format!(
        "  {} {} borrowed 12000 against 10 ETH at spot 2000",
        style("✓").green(),
        alice.short()
    ));
    let _ = term.write_line(&format!(
        "  {} {} borrowed 20000 against 40 ETH",
        style("✓").green(),
        keeper.short()
    ));

    // The feed crashes below Alice's break-even of 1200
    market.oracle_mut().set_price(eth, Price::new(dec!(1150))?);
    market.refresh_price(eth)?;
    let _ = term.write_line(&format!(
        "{} [{}] ETH feed crashed to {}",
        style("⚠").yellow(),
        clock(0),
        style("1150").red()
    ));

    let sale = market.liquidate(eth, alice, keeper, 0)?;
    let opened = market
        .engine(eth)?
        .sale(sale)
        .ok_or_else(|| anyhow::anyhow!("sale vanished after liquidation"))?;
    let _ = term.write_line(&format!(
        "{} [{}] Liquidated {}: tab {} for {} ETH, start price {}",
        style("→").cyan(),
        clock(0),
        alice.short(),
        style(fmt_dec(opened.tab.raw())).red(),
        fmt_dec(opened.collateral_to_sell.raw()),
        fmt_dec(opened.start_price.raw())
    ));

    // The keeper bids 3 ETH per step once the price falls under 1200
    let bid_cap = Price::new(dec!(1200))?;
    let mut concluded = false;
    for step in 1..=max_steps {
        let now = step * interval;
        let status = market.auction_status(eth, sale, now)?;
        if cli.verbose {
            let _ = term.write_line(&format!(
                "  [{}] price {} | tab {} | lot {}",
                clock(now),
                fmt_dec(status.price.raw()),
                fmt_dec(status.tab.raw()),
                fmt_dec(status.collateral_to_sell.raw())
            ));
        }
        if status.needs_reset {
            market.auction_reset(eth, sale, keeper, now)?;
            let _ = term.write_line(&format!(
                "{} [{}] Auction went stale and was reset",
                style("⚠").yellow(),
                clock(now)
            ));
            continue;
        }
        if status.price > bid_cap {
            continue;
        }
        let purchase = market.auction_buy(eth, sale, amount(dec!(3))?, bid_cap, keeper, now)?;
        let _ = term.write_line(&format!(
            "{} [{}] Bought {} ETH at {} for {}",
            style("→").cyan(),
            clock(now),
            fmt_dec(purchase.collateral_bought.raw()),
            fmt_dec(purchase.price.raw()),
            fmt_dec(purchase.cost.raw())
        ));
        if purchase.concluded {
            let _ = term.write_line(&format!(
                "{} [{}] Auction concluded with {} unrecovered",
                style("✓").green(),
                clock(now),
                fmt_dec(purchase.tab_remaining.raw())
            ));
            concluded = true;
            break;
        }
    }
    if !concluded {
        let _ = term.write_line(&format!(
            "{} Auction still open after {} steps",
            style("⚠").yellow(),
            max_steps
        ));
    }

    // Retire what the auction raised against the seized debt
    let raised = market.ledger().free_debt(market.sink().account());
    let matured = market.sink_mut().mature(max_steps * interval);
    let settled = raised.min(matured);
    if settled.is_positive() {
        market.settle_debt(settled)?;
    }

    let _ = term.write_line("");
    let _ = term.write_line(&format!("{} Final state", style("→").cyan()));
    let _ = term.write_line(&format!(
        "  Liquidations: {} | debt liquidated: {}",
        market.trigger().total_liquidations(),
        fmt_dec(market.trigger().total_debt_liquidated().raw())
    ));
    let _ = term.write_line(&format!(
        "  Auction debt recovered: {}",
        fmt_dec(market.engine(eth)?.total_debt_recovered().raw())
    ));
    let _ = term.write_line(&format!(
        "  Residual bad debt: {}",
        fmt_dec(market.ledger().seized_debt(market.sink().account()).raw())
    ));
    let _ = term.write_line(&format!(
        "  Events recorded: {}",
        market.events().len()
    ));
    if market.ledger().verify_accounting() {
        let _ = term.write_line(&format!(
            "  {} Conservation identities hold",
            style("✓").green()
        ));
    } else {
        anyhow::bail!("conservation identities violated");
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// CURVE TABLES
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_curves(cmd: &CurveCommands, term: &Term) -> anyhow::Result<()> {
    let (config, start, horizon, interval) = match cmd {
        CurveCommands::Linear {
            max_duration,
            start,
            interval,
        } => (
            CurveConfig::Linear {
                max_duration_secs: *max_duration,
            },
            *start,
            *max_duration,
            *interval,
        ),
        CurveCommands::Stairstep {
            step_secs,
            factor,
            start,
            horizon,
            interval,
        } => (
            CurveConfig::Stairstep {
                step_secs: *step_secs,
                factor: *factor,
            },
            *start,
            *horizon,
            *interval,
        ),
        CurveCommands::Exponential {
            factor,
            start,
            horizon,
            interval,
        } => (
            CurveConfig::Exponential { factor: *factor },
            *start,
            *horizon,
            *interval,
        ),
    };
    if interval == 0 {
        anyhow::bail!("interval must be positive");
    }

    let calculator = config.build()?;
    let start_price = Price::new(start)?;

    let _ = term.write_line(&format!(
        "{} {:?} from {}",
        style("→").cyan(),
        config,
        fmt_dec(start)
    ));
    let _ = term.write_line(&format!(
        "  {:>10}  {:>24}",
        style("elapsed").bold(),
        style("price").bold()
    ));
    let mut elapsed = 0;
    while elapsed <= horizon {
        let price = calculator.price(start_price, elapsed);
        let _ = term.write_line(&format!("  {:>9}s  {:>24}", elapsed, fmt_dec(price.raw())));
        elapsed += interval;
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG FILES
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_config(cmd: &ConfigCommands, term: &Term) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Init { path, force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration already exists: {}. Use --force to overwrite.",
                    path.display()
                );
            }
            let config = scenario_config();
            config.save(path)?;
            let _ = term.write_line(&format!(
                "{} Sample configuration written to {}",
                style("✓").green(),
                path.display()
            ));
            Ok(())
        }
        ConfigCommands::Show { path } => {
            let config = MarketConfig::load(path)?;
            let _ = term.write_line(&format!(
                "{} {} ({} collateral types)",
                style("→").cyan(),
                path.display(),
                config.collaterals.len()
            ));
            let _ = term.write_line(&format!(
                "  System ceiling: {} | auction capacity: {}",
                fmt_dec(config.system_max_debt),
                fmt_dec(config.max_auction_cost)
            ));
            let _ = term.write_line(&format!(
                "  Sink: {} (maturation {}s)",
                config.sink.account, config.sink.maturation_delay_secs
            ));
            for entry in &config.collaterals {
                let _ = term.write_line(&format!(
                    "  {} spot {} | ceiling {} | dust {} | penalty {}",
                    style(&entry.symbol).yellow(),
                    fmt_dec(entry.spot_price),
                    fmt_dec(entry.max_debt),
                    fmt_dec(entry.min_debt),
                    entry.penalty
                ));
            }
            Ok(())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn amount(value: Decimal) -> anyhow::Result<CollateralAmount> {
    Ok(CollateralAmount::new(value)?)
}

fn fmt_dec(value: Decimal) -> String {
    value.round_dp(4).normalize().to_string()
}
