//! WOWSNIPER: block monitor and buy trigger for Wow tokens on Base.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the transaction store and node connection, then either runs the
//! block monitor until Ctrl+C or performs a one-shot portfolio/trade command.

use std::fs::OpenOptions;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing::{error, info, warn};

use wowsniper::config::{AppConfig, LoggingConfig};
use wowsniper::dashboard::{spawn_dashboard, DashboardState};
use wowsniper::engine::executor::TradeExecutor;
use wowsniper::engine::monitor::Monitor;
use wowsniper::engine::portfolio;
use wowsniper::ledger::alloy_ledger::AlloyLedger;
use wowsniper::ledger::TokenMarket;
use wowsniper::storage::{SqliteStore, TransactionStore};
use wowsniper::types::{format_eth, parse_eth};

const BANNER: &str = r#"
 _      ______ _      _______  ________  _______  _______
| | /| / / __ \ | /| / / __/ |/ /  _/ _ \/ __/ _ \
| |/ |/ / /_/ / |/ |/ /\ \/    // // ___/ _// , _/
|__/|__/\____/|__/|__/___/_/|_/___/_/  /___/_/|_|

  Wow token block monitor & buy trigger (Base)
"#;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Operation to perform (defaults to `monitor`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch new blocks and buy tokens behind large inbound transactions
    Monitor,
    /// Print balance, spend and worth of held tokens
    Info {
        /// Token contract address
        #[arg(short, long)]
        contract: Option<Address>,

        /// Report every contract listed under [portfolio]
        #[arg(short, long)]
        all: bool,
    },
    /// Buy a token for the configured (or given) ETH amount
    Buy {
        #[arg(short, long)]
        contract: Address,

        /// ETH to spend, e.g. "0.00012" (defaults to buy_value_eth)
        #[arg(short, long)]
        value: Option<String>,
    },
    /// Sell an amount of a token
    Sell {
        #[arg(short, long)]
        contract: Address,

        /// Token amount, e.g. "1500.5"
        #[arg(short, long)]
        amount: String,
    },
    /// Sell the whole wallet balance of a token
    SellAll {
        #[arg(short, long)]
        contract: Address,
    },
    /// Delete every stored transaction record
    ResetDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    init_logging(&cfg.logging)?;

    let store = Arc::new(SqliteStore::open(&cfg.storage.database_path).await?);

    let result = match cli.command.unwrap_or(Commands::Monitor) {
        Commands::ResetDb => reset_db(&*store).await,
        command => {
            let ledger = Arc::new(connect(&cfg).await?);
            run_command(command, &cfg, ledger, Arc::clone(&store)).await
        }
    };

    store.close().await;
    result
}

async fn run_command(
    command: Commands,
    cfg: &AppConfig,
    ledger: Arc<AlloyLedger>,
    store: Arc<SqliteStore>,
) -> Result<()> {
    let policy = cfg.policy()?;
    let executor = TradeExecutor::new(ledger.clone(), store.clone(), policy.confirmation_timeout);

    match command {
        Commands::Monitor => run_monitor(cfg, ledger, store, executor).await,
        Commands::Info { contract, all } => {
            let contracts = match (contract, all) {
                (_, true) => cfg.portfolio.contracts.clone(),
                (Some(contract), false) => vec![contract],
                (None, false) => Vec::new(),
            };
            if contracts.is_empty() {
                bail!("No contracts provided: pass --contract ADDR or --all");
            }
            report_positions(cfg, ledger.as_ref(), &contracts).await;
            Ok(())
        }
        Commands::Buy { contract, value } => {
            let value = match value {
                Some(v) => parse_eth(&v)?,
                None => policy.buy_value,
            };
            let fill = executor.buy(contract, value).await?;
            println!("Bought {} ETH of {contract}: {fill}", format_eth(value));
            Ok(())
        }
        Commands::Sell { contract, amount } => {
            let amount = parse_eth(&amount)?;
            let fill = executor.sell(contract, amount).await?;
            println!("Sold {} of {contract}: {fill}", format_eth(amount));
            Ok(())
        }
        Commands::SellAll { contract } => {
            match executor.sell_all(contract).await? {
                Some(fill) => println!("Sold all of {contract}: {fill}"),
                None => println!("No {contract} tokens to sell"),
            }
            Ok(())
        }
        Commands::ResetDb => reset_db(&*store).await,
    }
}

async fn reset_db(store: &dyn TransactionStore) -> Result<()> {
    let deleted = store.delete_all().await?;
    println!("Deleted {deleted} transaction records");
    Ok(())
}

/// Run the block monitor until Ctrl+C, then drain queued blocks.
async fn run_monitor(
    cfg: &AppConfig,
    ledger: Arc<AlloyLedger>,
    store: Arc<SqliteStore>,
    executor: TradeExecutor,
) -> Result<()> {
    println!("{BANNER}");
    let policy = cfg.policy()?;
    info!(
        contract = %policy.tracked_contract,
        min_value = %format_eth(policy.min_value),
        buy_value = %format_eth(policy.buy_value),
        buy_enabled = policy.buy_enabled,
        "WOWSNIPER starting up"
    );
    if !policy.buy_enabled {
        warn!("Buying is disabled, qualifying transactions will only be logged");
    }

    let monitor = Monitor::new(ledger, store.clone(), Arc::new(executor), policy.clone());

    if cfg.dashboard.enabled {
        let state = DashboardState::new(monitor.stats(), store, policy);
        spawn_dashboard(Arc::new(state), cfg.dashboard.port);
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received.");
    };

    info!("Entering block loop. Press Ctrl+C to stop.");
    let stats = monitor.run_until(cfg.monitor.queue_capacity, shutdown).await?;

    info!(
        last_height = ?stats.last_height,
        blocks = stats.blocks_processed,
        matched = stats.txs_matched,
        buys = stats.buys_succeeded,
        buys_failed = stats.buys_failed,
        "WOWSNIPER shut down cleanly."
    );
    Ok(())
}

/// Print a position report for each contract, with the token's latest
/// trade. Per-token failures are logged and the report moves on.
async fn report_positions(cfg: &AppConfig, ledger: &AlloyLedger, contracts: &[Address]) {
    let spent = portfolio::total_spent(
        ledger,
        ledger.wallet(),
        contracts,
        cfg.portfolio.spend_from_block,
    )
    .await;

    for contract in contracts {
        let spent_on = spent.get(contract).copied().unwrap_or_default();
        println!("{}", "-".repeat(60));
        match portfolio::position(ledger, *contract, spent_on).await {
            Ok(mut position) => {
                match portfolio::last_activity(ledger, *contract, cfg.portfolio.spend_from_block).await {
                    Ok(last) => position.last_activity = last,
                    Err(e) => warn!(token = %contract, error = %format!("{e:#}"), "Failed to read last transaction"),
                }
                println!("{position}");
            }
            Err(e) => error!(token = %contract, error = %format!("{e:#}"), "Error calculating token worth"),
        }
    }
}

/// Connect to the node with the configured wallet.
async fn connect(cfg: &AppConfig) -> Result<AlloyLedger> {
    let key = cfg.private_key()?;
    let signer = PrivateKeySigner::from_str(key.expose_secret())
        .context("Wallet private key is not a valid secp256k1 key")?;
    let url = cfg.ws_url()?;
    AlloyLedger::connect(url.expose_secret(), signer).await
}

/// Initialise the `tracing` subscriber.
fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wowsniper=info"));

    let json_logging = cfg.json || std::env::var("WOWSNIPER_LOG_JSON").is_ok();

    let stdout = if json_logging {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let file = match &cfg.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {path}"))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout)
        .with(file)
        .init();
    Ok(())
}
