//! CLI command implementations

use anyhow::{Context, Result};
use dialoguer::Confirm;
use solana_sdk::signature::Signer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::{Engine, EngineParts};
use crate::market::{CoinGeckoClient, GeckoTerminalClient, JupiterPriceClient, PriceProvider, Throttle};
use crate::metrics::Metrics;
use crate::notify::{format, LogNotifier, Notifier, TelegramNotifier};
use crate::position::{PositionManager, PositionStore, TrendStateStore};
use crate::signal::MarketHealthEvaluator;
use crate::trading::jupiter::keypair_from_env;
use crate::trading::{ExecutionGateway, JupiterVenue, PaperVenue, TradeVenue};

/// Where state lives; dry runs keep theirs apart from live positions
fn data_paths(config: &Config, dry_run: bool) -> (PathBuf, PathBuf) {
    if dry_run {
        let dir = PathBuf::from(&config.persistence.data_dir).join("paper");
        (dir.join("positions.json"), dir.join("asset_states.json"))
    } else {
        (
            config.persistence.positions_path(),
            config.persistence.trend_states_path(),
        )
    }
}

fn price_client(config: &Config) -> Result<JupiterPriceClient> {
    Ok(JupiterPriceClient::new(
        &config.jupiter.price_url,
        Duration::from_millis(config.market_data.request_timeout_ms),
        Throttle::from_millis(config.market_data.min_interval_ms),
    )?)
}

fn health_evaluator(config: &Config) -> Result<MarketHealthEvaluator> {
    let coingecko = CoinGeckoClient::new(
        &config.market_data.coingecko_url,
        Duration::from_millis(config.market_data.request_timeout_ms),
        Throttle::from_millis(config.market_data.min_interval_ms),
    )?
    .with_retry(config.market_data.retry);
    Ok(MarketHealthEvaluator::new(
        Arc::new(coingecko),
        config.market_health.clone(),
    ))
}

/// Wire up providers, venues, gateway and engine from configuration
async fn build_engine(config: &Config, dry_run: bool) -> Result<(Arc<Engine>, Option<Arc<TelegramNotifier>>)> {
    let timeout = Duration::from_millis(config.market_data.request_timeout_ms);
    let series = GeckoTerminalClient::new(
        &config.market_data.geckoterminal_url,
        &config.market_data.network,
        timeout,
        Throttle::from_millis(config.market_data.min_interval_ms),
    )?
    .with_retry(config.market_data.retry);
    let prices = price_client(config)?;

    let telegram = if config.telegram.is_configured() {
        Some(Arc::new(TelegramNotifier::new(&config.telegram)?))
    } else {
        info!("Telegram not configured, notifications go to the log");
        None
    };
    let notifier: Arc<dyn Notifier> = match &telegram {
        Some(telegram) => telegram.clone(),
        None => Arc::new(LogNotifier),
    };

    let (positions_path, trend_states_path) = data_paths(config, dry_run);
    let positions = Arc::new(PositionManager::new(
        config.exit.clone(),
        Some(PositionStore::new(&positions_path)),
    ));
    let trend_store = TrendStateStore::new(&trend_states_path);
    let strategy = config.strategy.build();
    let metrics = Arc::new(Metrics::new());

    let (primary, fallback): (Arc<dyn TradeVenue>, Option<Arc<dyn TradeVenue>>) = if dry_run {
        let paper = PaperVenue::new(
            &config.trading.quote_mint,
            config.trading.quote_decimals,
            config.trading.trade_amount * config.trading.max_concurrent_positions as f64,
        );
        // Restored paper positions need tokens to sell
        for position in PositionStore::new(&positions_path).load().await? {
            paper.credit(&position.asset, position.notional / position.entry_price);
        }
        (Arc::new(paper), None)
    } else {
        let keypair = Arc::new(keypair_from_env().context("Live trading needs PRIVATE_KEY")?);
        info!("Trading wallet: {}", keypair.pubkey());

        let rpc_timeout = Duration::from_millis(config.rpc.timeout_ms);
        let primary = JupiterVenue::new(&config.jupiter, &config.rpc.endpoint, rpc_timeout, keypair.clone())?;
        let fallback = match &config.rpc.fallback_endpoint {
            Some(endpoint) => {
                let venue: Arc<dyn TradeVenue> =
                    Arc::new(JupiterVenue::new(&config.jupiter, endpoint, rpc_timeout, keypair)?);
                Some(venue)
            }
            None => None,
        };
        (Arc::new(primary), fallback)
    };

    let mut gateway = ExecutionGateway::new(
        primary,
        positions,
        notifier.clone(),
        config.trading.clone(),
        config.jupiter.slippage_bps,
        config.execution.clone(),
    )
    .with_metrics(metrics.clone())
    .with_strategy(strategy.clone(), Some(trend_store.clone()));
    if let Some(fallback) = fallback {
        gateway = gateway.with_fallback(fallback);
    }

    let engine = Engine::new(EngineParts {
        config: config.clone(),
        health: health_evaluator(config)?,
        strategy,
        series: Arc::new(series),
        prices: Arc::new(prices),
        gateway: Arc::new(gateway),
        notifier,
        metrics,
        trend_store: Some(trend_store),
    });

    let commands = telegram.filter(|_| config.telegram.commands_enabled);
    Ok((Arc::new(engine), commands))
}

/// Start the trader
pub async fn start(config: &Config, dry_run: bool) -> Result<()> {
    if dry_run {
        warn!("Running in DRY-RUN mode - swaps are simulated at the expected price");
    }

    info!(
        "Starting {:?} trader: {} assets, {} per entry, max {} positions",
        config.strategy.kind,
        config.trading.assets.len(),
        config.trading.trade_amount,
        config.trading.max_concurrent_positions
    );

    let (engine, commands) = build_engine(config, dry_run).await?;
    engine.run(commands).await
}

/// Show persisted positions with current P&L
pub async fn status(config: &Config, dry_run: bool) -> Result<()> {
    let (positions_path, _) = data_paths(config, dry_run);
    let positions = PositionStore::new(&positions_path)
        .load()
        .await
        .context("Failed to load positions")?;
    let prices = price_client(config)?;

    println!("\n=== TRADER STATUS ===\n");
    println!("Positions file: {}", positions_path.display());
    println!(
        "Open positions: {}/{}",
        positions.len(),
        config.trading.max_concurrent_positions
    );

    if positions.is_empty() {
        println!("\nNo open positions.");
        return Ok(());
    }

    // Health is unknown outside the engine; stepped trailing shows its neutral step
    let trail_pct = config.exit.trailing.pct_for(0.0);
    let mut total_pnl = 0.0;

    println!();
    for position in &positions {
        let name = config.trading.asset_name(&position.asset);
        let price = prices.current_price(&position.asset).await;
        if let Some(price) = price {
            total_pnl += position.pnl_value(price);
        }
        println!("{}", format::position_line(name, position, price, trail_pct));
    }
    println!("\nUnrealized P&L: {:+.2}", total_pnl);

    Ok(())
}

/// Open a position now at the current price
pub async fn buy(config: &Config, asset: &str, dry_run: bool) -> Result<()> {
    let (engine, _) = build_engine(config, dry_run).await?;
    engine.restore().await?;

    let reply = engine.manual_buy(asset).await?;
    println!("{}", reply);
    Ok(())
}

/// Close a position now
pub async fn sell(config: &Config, asset: &str, force: bool, dry_run: bool) -> Result<()> {
    let (engine, _) = build_engine(config, dry_run).await?;
    engine.restore().await?;

    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Sell the whole {} position? This cannot be undone.", asset))
            .default(false)
            .interact()?;

        if !confirmed {
            info!("Sell cancelled by user");
            return Ok(());
        }
    }

    let reply = engine.manual_sell(asset).await?;
    println!("{}", reply);
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check providers, RPC and keypair, and print one health evaluation
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== SYSTEM HEALTH CHECK ===\n");

    let mut all_healthy = true;

    print!("RPC Endpoint... ");
    match check_rpc(&config.rpc.endpoint, config.rpc.timeout_ms).await {
        Ok(latency) => println!("OK ({}ms)", latency),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    if let Some(fallback) = &config.rpc.fallback_endpoint {
        print!("Fallback RPC... ");
        match check_rpc(fallback, config.rpc.timeout_ms).await {
            Ok(latency) => println!("OK ({}ms)", latency),
            Err(e) => {
                println!("FAILED: {}", e);
                all_healthy = false;
            }
        }
    }

    print!("Keypair... ");
    match keypair_from_env() {
        Ok(keypair) => println!("OK ({})", keypair.pubkey()),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Telegram... ");
    if config.telegram.is_configured() {
        println!("CONFIGURED");
    } else {
        println!("DISABLED (log only)");
    }

    println!("\nMarket health ({}):", config.market_health.timeframe);
    let score = health_evaluator(config)?.evaluate().await;
    for contribution in &score.contributions {
        if contribution.available {
            println!(
                "  {:<12} weight {:.2}  distance {:+.2}%",
                contribution.asset_id, contribution.weight, contribution.distance_pct
            );
        } else {
            println!("  {:<12} weight {:.2}  NO DATA", contribution.asset_id, contribution.weight);
            all_healthy = false;
        }
    }
    println!(
        "  Score: {:+.2}{}",
        score.raw_value,
        if score.tradable { "" } else { " (strict policy: trading skipped)" }
    );

    let prices = price_client(config)?;
    println!("\nSpot prices:");
    for asset in &config.trading.assets {
        match prices.current_price(&asset.mint).await {
            Some(price) => println!("  {:<8} {:.8}", asset.name, price),
            None => {
                println!("  {:<8} UNAVAILABLE", asset.name);
                all_healthy = false;
            }
        }
    }

    println!();
    if all_healthy {
        println!("All systems healthy!");
    } else {
        println!("Some systems are unhealthy. Check the errors above.");
    }

    Ok(())
}

/// RPC round-trip latency in milliseconds
async fn check_rpc(endpoint: &str, timeout_ms: u64) -> Result<u64> {
    let client = solana_client::nonblocking::rpc_client::RpcClient::new_with_timeout(
        endpoint.to_string(),
        Duration::from_millis(timeout_ms),
    );

    let start = Instant::now();
    client.get_slot().await?;
    Ok(start.elapsed().as_millis() as u64)
}
