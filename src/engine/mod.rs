//! Trading engine
//!
//! Two loops on independent schedules share one [`EngineState`]:
//! - analysis (slow): market health -> signal history -> adjusted score,
//!   summary and periodic heartbeat
//! - monitor (fast): reprice every open position and sell on exit signals,
//!   then scan assets for entries while below the position cap
//!
//! Shutdown (Ctrl-C, SIGTERM or a cancelled token) gives the running cycles
//! a grace period to finish, aborts what is left, then flushes positions and
//! trend states to disk.

pub mod state;

use anyhow::Context;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, TradeAssetConfig};
use crate::control::{CommandHandler, CommandListener};
use crate::error::{Error, Result};
use crate::market::{PriceProvider, SeriesProvider};
use crate::metrics::Metrics;
use crate::notify::{format, Notifier, TelegramNotifier};
use crate::position::TrendStateStore;
use crate::signal::MarketHealthEvaluator;
use crate::strategy::{DataRequest, EntryStrategy, SignalInput};
use crate::trading::ExecutionGateway;

pub use state::{EngineState, HealthSnapshot};

/// Collaborators the engine is assembled from
pub struct EngineParts {
    pub config: Config,
    pub health: MarketHealthEvaluator,
    pub strategy: Arc<dyn EntryStrategy>,
    /// Per-asset series, looked up by pool address
    pub series: Arc<dyn SeriesProvider>,
    /// Spot prices, looked up by mint
    pub prices: Arc<dyn PriceProvider>,
    pub gateway: Arc<ExecutionGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub metrics: Arc<Metrics>,
    pub trend_store: Option<TrendStateStore>,
}

/// Market data for one asset in one cycle
#[derive(Debug, Default)]
struct AssetData {
    prices: Vec<f64>,
    volumes: Option<Vec<f64>>,
    spot: Option<f64>,
}

pub struct Engine {
    config: Config,
    state: EngineState,
    health: MarketHealthEvaluator,
    strategy: Arc<dyn EntryStrategy>,
    series: Arc<dyn SeriesProvider>,
    prices: Arc<dyn PriceProvider>,
    gateway: Arc<ExecutionGateway>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    trend_store: Option<TrendStateStore>,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(parts: EngineParts) -> Self {
        let state = EngineState::new(
            parts.config.market_health.history_window,
            parts.config.market_health.momentum_weight,
        );

        Self {
            config: parts.config,
            state,
            health: parts.health,
            strategy: parts.strategy,
            series: parts.series,
            prices: parts.prices,
            gateway: parts.gateway,
            notifier: parts.notifier,
            metrics: parts.metrics,
            trend_store: parts.trend_store,
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn gateway(&self) -> &Arc<ExecutionGateway> {
        &self.gateway
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Restore positions and trend states from disk
    pub async fn restore(&self) -> Result<usize> {
        let restored = self.gateway.positions().load().await?;

        if let Some(store) = &self.trend_store {
            let states = store.load().await?;
            if !states.is_empty() {
                info!("Restored {} trend states", states.len());
                self.strategy.restore_trend_states(states);
            }
        }

        Ok(restored)
    }

    /// Run both loops (and the command listener, if given) until shutdown
    pub async fn run(self: Arc<Self>, commands: Option<Arc<TelegramNotifier>>) -> anyhow::Result<()> {
        let restored = self.restore().await.context("Failed to restore state")?;
        self.warn_missing_pools();

        self.notifier
            .send(&format!(
                "🚀 Trader started ({} strategy, {} assets, {} open positions)",
                self.strategy.name(),
                self.config.trading.assets.len(),
                restored
            ))
            .await;

        let mut tasks = vec![
            tokio::spawn(self.clone().analysis_loop()),
            tokio::spawn(self.clone().monitor_loop()),
        ];
        if let Some(telegram) = commands {
            let listener = CommandListener::new(telegram, CommandHandler::new(self.clone()));
            tasks.push(tokio::spawn(listener.run(self.cancel.clone())));
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Interrupt received"),
            _ = terminated() => info!("SIGTERM received"),
            _ = self.cancel.cancelled() => info!("Shutdown requested"),
        }
        self.cancel.cancel();

        let grace = Duration::from_secs(self.config.scheduler.shutdown_grace_secs);
        if !join_with_grace(tasks, grace).await {
            warn!("Engine tasks still running after {:?}, aborted them", grace);
        }

        self.shutdown().await
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        info!("Flushing state...");
        self.gateway
            .positions()
            .save()
            .await
            .context("Final position save failed")?;
        self.persist_trend_states().await;

        self.notifier
            .send(&format!(
                "🛑 Trader stopped ({} open positions)",
                self.gateway.positions().count().await
            ))
            .await;
        Ok(())
    }

    async fn analysis_loop(self: Arc<Self>) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.scheduler.analysis_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_analysis_cycle().await;
                }
            }
        }
        debug!("Analysis loop stopped");
    }

    async fn monitor_loop(self: Arc<Self>) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.scheduler.monitor_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_monitor_cycle().await;
                }
            }
        }
        debug!("Monitor loop stopped");
    }

    /// Evaluate market health and publish the adjusted score
    pub async fn run_analysis_cycle(&self) -> HealthSnapshot {
        let score = self.health.evaluate().await;
        for contribution in &score.contributions {
            self.metrics.record_api_call(contribution.available);
        }

        let snapshot = self.state.record_health(&score);
        let cycle = self.metrics.record_cycle();
        let open = self.gateway.positions().count().await;

        info!(
            "Cycle {}: health raw={:+.2} momentum={:+.3} adjusted={:+.2}{}",
            cycle,
            snapshot.raw,
            snapshot.momentum,
            snapshot.adjusted,
            if snapshot.tradable { "" } else { " (trading skipped)" }
        );

        self.notifier
            .send(&format::analysis_summary(
                snapshot.raw,
                snapshot.momentum,
                snapshot.adjusted,
                snapshot.degraded,
                open,
                self.config.trading.max_concurrent_positions,
            ))
            .await;

        let every = self.config.scheduler.heartbeat_cycles;
        if every > 0 && cycle % every == 0 {
            self.notifier
                .send(&format::heartbeat(
                    &format::uptime(self.metrics.started_at(), Utc::now()),
                    cycle,
                    open,
                    snapshot.adjusted,
                    self.metrics.api_success_rate(),
                    self.metrics.realized_pnl(),
                ))
                .await;
        }

        snapshot
    }

    /// Exits first, then entries
    pub async fn run_monitor_cycle(&self) {
        self.check_exits().await;
        self.scan_entries().await;
    }

    async fn check_exits(&self) {
        let health = self.state.health().adjusted;
        let positions = self.gateway.positions();

        for position in positions.all().await {
            if positions.is_closing(position.id) {
                continue;
            }
            let name = self.config.trading.asset_name(&position.asset);

            let Some(price) = self.spot_price(&position.asset).await else {
                warn!("{}: no price, position #{} not repriced", name, position.id);
                continue;
            };

            let outcome = match positions.reprice(position.id, price, health).await {
                Ok(Some(outcome)) => outcome,
                Ok(None) => continue,
                Err(e) => {
                    error!("Reprice of #{} failed: {}", position.id, e);
                    continue;
                }
            };

            debug!(
                "{}: {}",
                name,
                format::position_line(name, &outcome.position, Some(price), outcome.trail_pct)
            );

            if let Some(exit) = outcome.exit {
                info!(
                    "{}: {} at {} (trigger {:.8})",
                    name, exit.reason, price, exit.trigger_price
                );
                match self
                    .gateway
                    .sell(position.id, Some(price), &exit.reason.to_string())
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => warn!("{}: sell failed, position #{} stays open", name, position.id),
                    Err(e) => error!("{}: sell rejected: {}", name, e),
                }
            }
        }
    }

    async fn scan_entries(&self) {
        if self.state.is_paused() {
            debug!("Paused, skipping entry scan");
            return;
        }

        let health = self.state.health();
        if !health.tradable {
            debug!("No tradable health reading, skipping entry scan");
            return;
        }
        if !self.strategy.should_scan(health.adjusted) {
            info!("Market health {:+.2} too weak, skipping entry scan", health.adjusted);
            return;
        }

        let request = self.strategy.data_request();
        let max_open = self.config.trading.max_concurrent_positions;
        let positions = self.gateway.positions();

        for asset in &self.config.trading.assets {
            if positions.count().await >= max_open {
                debug!("Position cap {} reached", max_open);
                break;
            }
            if positions.has_asset(&asset.mint).await {
                continue;
            }

            let data = self.fetch_asset_data(asset, &request).await;
            let decision = self.strategy.evaluate(&SignalInput {
                asset_id: &asset.mint,
                prices: &data.prices,
                volumes: data.volumes.as_deref(),
                current_price: data.spot,
                health: health.adjusted,
            });
            info!("{}: {} - {}", asset.name, decision.action, decision.reason);

            if !decision.is_buy() {
                continue;
            }
            let spot = match data.spot {
                Some(spot) => Some(spot),
                None => self.spot_price(&asset.mint).await,
            };
            let Some(price) = spot.or_else(|| data.prices.last().copied()) else {
                warn!("{}: BUY signal without a price, skipped", asset.name);
                continue;
            };

            match self
                .gateway
                .buy(&asset.mint, self.config.trading.trade_amount, price, &decision.reason)
                .await
            {
                Ok(true) => {}
                Ok(false) => warn!("{}: buy failed", asset.name),
                Err(e) if e.is_validation() => warn!("{}: buy rejected: {}", asset.name, e),
                Err(e) => error!("{}: buy error: {}", asset.name, e),
            }
        }

        self.persist_trend_states().await;
    }

    async fn fetch_asset_data(&self, asset: &TradeAssetConfig, request: &DataRequest) -> AssetData {
        let mut data = AssetData::default();

        if let Some(pool) = &asset.pool {
            if request.needs_volume {
                let series = self
                    .series
                    .get_series_with_volume(pool, request.timeframe, request.limit)
                    .await;
                self.metrics.record_api_call(!series.is_empty());
                data.prices = series.prices;
                data.volumes = Some(series.volumes);
            } else {
                data.prices = self
                    .series
                    .get_series(pool, request.timeframe, request.limit)
                    .await;
                self.metrics.record_api_call(!data.prices.is_empty());
            }
        }

        if request.needs_spot {
            data.spot = self.spot_price(&asset.mint).await;
        }
        data
    }

    async fn spot_price(&self, mint: &str) -> Option<f64> {
        let price = self.prices.current_price(mint).await;
        self.metrics.record_api_call(price.is_some());
        price
    }

    async fn persist_trend_states(&self) {
        if let Err(e) = self.gateway.persist_trend_states().await {
            error!("Failed to persist trend states: {}", e);
        }
    }

    fn warn_missing_pools(&self) {
        let request = self.strategy.data_request();
        for asset in self.config.trading.assets.iter().filter(|a| a.pool.is_none()) {
            if request.needs_volume {
                warn!("{}: no pool configured, volume filter will hold", asset.name);
            } else {
                warn!("{}: no pool configured, no price history", asset.name);
            }
        }
    }

    /// Open a position in `key` (name or mint) at the current price
    pub async fn manual_buy(&self, key: &str) -> Result<String> {
        let asset = self
            .config
            .trading
            .find_asset(key)
            .ok_or_else(|| Error::validation("asset", format!("{} is not a traded asset", key)))?;

        if self.gateway.positions().has_asset(&asset.mint).await {
            return Err(Error::validation(
                "asset",
                format!("already holding {}", asset.name),
            ));
        }

        let price = self
            .spot_price(&asset.mint)
            .await
            .ok_or_else(|| Error::provider("price", format!("no current price for {}", asset.name)))?;

        let bought = self
            .gateway
            .buy(&asset.mint, self.config.trading.trade_amount, price, "MANUAL")
            .await?;

        Ok(if bought {
            format!("✅ Bought {} at ~{:.8}", asset.name, price)
        } else {
            format!("❌ Buy of {} failed, see alert", asset.name)
        })
    }

    /// Close the position in `key` (name or mint)
    pub async fn manual_sell(&self, key: &str) -> Result<String> {
        let asset = self
            .config
            .trading
            .find_asset(key)
            .ok_or_else(|| Error::validation("asset", format!("{} is not a traded asset", key)))?;

        let position = self
            .gateway
            .positions()
            .find_by_asset(&asset.mint)
            .await
            .ok_or_else(|| Error::validation("asset", format!("no open position in {}", asset.name)))?;

        let price = self.spot_price(&asset.mint).await;
        let sold = self.gateway.sell(position.id, price, "MANUAL").await?;

        Ok(if sold {
            format!("✅ Sold {} (position #{})", asset.name, position.id)
        } else {
            format!("❌ Sell of {} failed, position stays open", asset.name)
        })
    }

    /// Human-readable status: pause flag, health and open positions
    pub async fn status_report(&self) -> String {
        let health = self.state.health();
        let positions = self.gateway.positions().all().await;
        let trail_pct = self
            .gateway
            .positions()
            .exit_config()
            .trailing
            .pct_for(health.adjusted);

        let mut report = format!(
            "{} | {} strategy\nMarket health: {:+.2} (raw {:+.2}, momentum {:+.3})\nPositions: {}/{}",
            if self.state.is_paused() { "⏸️ PAUSED" } else { "▶️ RUNNING" },
            self.strategy.name(),
            health.adjusted,
            health.raw,
            health.momentum,
            positions.len(),
            self.config.trading.max_concurrent_positions
        );

        for position in &positions {
            let name = self.config.trading.asset_name(&position.asset);
            let price = self.spot_price(&position.asset).await;
            report.push('\n');
            report.push_str(&format::position_line(name, position, price, trail_pct));
        }

        report.push_str(&format!(
            "\nUptime: {}",
            format::uptime(self.metrics.started_at(), Utc::now())
        ));
        report
    }
}

/// Resolves on SIGTERM; never on platforms without it
async fn terminated() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                return;
            }
            Err(e) => warn!("Cannot listen for SIGTERM: {}", e),
        }
    }
    std::future::pending::<()>().await
}

/// Wait up to `grace` for tasks, aborting stragglers. True if all finished.
async fn join_with_grace(tasks: Vec<JoinHandle<()>>, grace: Duration) -> bool {
    let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();

    match tokio::time::timeout(grace, join_all(tasks)).await {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    error!("Engine task failed: {}", e);
                }
            }
            true
        }
        Err(_) => {
            for abort in aborts {
                abort.abort();
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{PriceVolumeSeries, Timeframe};
    use crate::notify::testing::RecordingNotifier;
    use crate::position::{ExitConfig, PositionManager};
    use crate::signal::health::FailurePolicy;
    use crate::strategy::{CrossoverConfig, StrategyKind, TrendState};
    use crate::trading::{ExecutionConfig, PaperVenue};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    const JUP: &str = "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN";

    const BEARISH: [f64; 4] = [4.0, 3.0, 2.0, 1.0];
    const BULLISH: [f64; 4] = [1.0, 2.0, 3.0, 4.0];

    /// Returns whatever series it currently holds, for any asset
    #[derive(Default)]
    struct ScriptedSeries {
        series: Mutex<Vec<f64>>,
    }

    impl ScriptedSeries {
        fn set(&self, values: &[f64]) {
            *self.series.lock().unwrap() = values.to_vec();
        }
    }

    #[async_trait]
    impl SeriesProvider for ScriptedSeries {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn get_series(&self, _asset_ref: &str, _timeframe: Timeframe, _limit: usize) -> Vec<f64> {
            self.series.lock().unwrap().clone()
        }

        async fn get_series_with_volume(
            &self,
            asset_ref: &str,
            timeframe: Timeframe,
            limit: usize,
        ) -> PriceVolumeSeries {
            let prices = self.get_series(asset_ref, timeframe, limit).await;
            PriceVolumeSeries {
                volumes: vec![1.0; prices.len()],
                prices,
            }
        }
    }

    #[derive(Default)]
    struct ScriptedPrices {
        prices: Mutex<HashMap<String, f64>>,
    }

    impl ScriptedPrices {
        fn set(&self, mint: &str, price: f64) {
            self.prices.lock().unwrap().insert(mint.to_string(), price);
        }
    }

    #[async_trait]
    impl PriceProvider for ScriptedPrices {
        async fn current_price(&self, asset_ref: &str) -> Option<f64> {
            self.prices.lock().unwrap().get(asset_ref).copied()
        }
    }

    struct Harness {
        engine: Arc<Engine>,
        series: Arc<ScriptedSeries>,
        prices: Arc<ScriptedPrices>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(failure_policy: FailurePolicy, health_series: Vec<f64>) -> Harness {
        let mut config = Config::default();
        config.trading.assets = vec![TradeAssetConfig {
            name: "JUP".into(),
            mint: JUP.into(),
            pool: Some("jup-pool".into()),
            decimals: None,
        }];
        config.trading.trade_amount = 100.0;
        config.strategy.kind = StrategyKind::Crossover;
        config.strategy.crossover = CrossoverConfig {
            short_period: 2,
            long_period: 3,
            history_limit: 4,
            ..Default::default()
        };
        config.market_health.failure_policy = failure_policy;

        let health_provider = Arc::new(ScriptedSeries::default());
        health_provider.set(&health_series);
        let series = Arc::new(ScriptedSeries::default());
        let prices = Arc::new(ScriptedPrices::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let metrics = Arc::new(Metrics::new());
        let strategy = config.strategy.build();

        let positions = Arc::new(PositionManager::new(ExitConfig::default(), None));
        let gateway = ExecutionGateway::new(
            Arc::new(PaperVenue::new(USDC, 6, 1000.0)),
            positions,
            notifier.clone(),
            config.trading.clone(),
            250,
            ExecutionConfig {
                backoff_initial_ms: 1,
                backoff_max_ms: 1,
                ..Default::default()
            },
        )
        .with_metrics(metrics.clone())
        .with_strategy(strategy.clone(), None);

        let engine = Engine::new(EngineParts {
            health: MarketHealthEvaluator::new(health_provider, config.market_health.clone()),
            config,
            strategy,
            series: series.clone(),
            prices: prices.clone(),
            gateway: Arc::new(gateway),
            notifier: notifier.clone(),
            metrics,
            trend_store: None,
        });

        Harness {
            engine: Arc::new(engine),
            series,
            prices,
            notifier,
        }
    }

    fn flat_market() -> Vec<f64> {
        vec![100.0; 50]
    }

    #[tokio::test]
    async fn test_crossover_entry_then_trailing_exit() {
        let h = harness(FailurePolicy::Degrade, flat_market());
        let positions = h.engine.gateway().positions().clone();

        let snapshot = h.engine.run_analysis_cycle().await;
        assert!(snapshot.tradable);
        assert_eq!(snapshot.adjusted, 0.0);

        h.prices.set(JUP, 1.0);
        h.series.set(&BEARISH);
        h.engine.run_monitor_cycle().await;
        assert_eq!(positions.count().await, 0);

        h.series.set(&BULLISH);
        h.engine.run_monitor_cycle().await;
        assert_eq!(positions.count().await, 1);

        // New high, then a drop below the 4% trail
        h.prices.set(JUP, 1.2);
        h.engine.run_monitor_cycle().await;
        assert_eq!(positions.all().await[0].highest_price, 1.2);

        h.series.set(&BEARISH);
        h.prices.set(JUP, 1.1);
        h.engine.run_monitor_cycle().await;
        assert_eq!(positions.count().await, 0);

        let messages = h.notifier.messages();
        let sell = messages.iter().find(|m| m.contains("SELL")).unwrap();
        assert!(sell.contains("TRAILING_STOP_HIT"));
        assert!(sell.contains("+10.00 USDC"));
    }

    #[tokio::test]
    async fn test_paused_engine_still_exits_but_never_enters() {
        let h = harness(FailurePolicy::Degrade, flat_market());
        let positions = h.engine.gateway().positions().clone();
        h.engine.run_analysis_cycle().await;

        h.prices.set(JUP, 1.0);
        h.series.set(&BULLISH);
        h.engine.state().set_paused(true);
        h.engine.run_monitor_cycle().await;
        assert_eq!(positions.count().await, 0);

        h.engine.manual_buy("JUP").await.unwrap();
        assert_eq!(positions.count().await, 1);

        h.prices.set(JUP, 0.9);
        h.engine.run_monitor_cycle().await;
        assert_eq!(positions.count().await, 0);

        h.engine.state().set_paused(false);
        h.engine.run_monitor_cycle().await;
        assert_eq!(positions.count().await, 1);
    }

    #[tokio::test]
    async fn test_strict_policy_blocks_entries() {
        let h = harness(FailurePolicy::Strict, Vec::new());

        let snapshot = h.engine.run_analysis_cycle().await;
        assert!(!snapshot.tradable);

        h.prices.set(JUP, 1.0);
        h.series.set(&BULLISH);
        h.engine.run_monitor_cycle().await;
        assert_eq!(h.engine.gateway().positions().count().await, 0);
    }

    #[tokio::test]
    async fn test_no_entries_before_first_analysis() {
        let h = harness(FailurePolicy::Degrade, flat_market());
        h.prices.set(JUP, 1.0);
        h.series.set(&BULLISH);
        h.engine.run_monitor_cycle().await;
        assert_eq!(h.engine.gateway().positions().count().await, 0);
    }

    #[tokio::test]
    async fn test_manual_trades_and_status() {
        let h = harness(FailurePolicy::Degrade, flat_market());
        h.prices.set(JUP, 2.0);

        let reply = h.engine.manual_buy("jup").await.unwrap();
        assert!(reply.contains("Bought JUP"));
        let err = h.engine.manual_buy("JUP").await.unwrap_err();
        assert!(err.is_validation());
        assert!(h.engine.manual_buy("DOGE").await.unwrap_err().is_validation());

        let status = h.engine.status_report().await;
        assert!(status.contains("RUNNING"));
        assert!(status.contains("Positions: 1/3"));
        assert!(status.contains("#1 JUP"));

        let reply = h.engine.manual_sell(JUP).await.unwrap();
        assert!(reply.contains("Sold JUP"));
        assert!(h.engine.manual_sell("JUP").await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_operator_commands() {
        use crate::control::Command;

        let h = harness(FailurePolicy::Degrade, flat_market());
        let handler = CommandHandler::new(h.engine.clone());
        h.prices.set(JUP, 1.0);

        assert!(handler.handle(Command::Stop).await.contains("paused"));
        assert!(h.engine.state().is_paused());
        assert!(handler.handle(Command::Status).await.contains("PAUSED"));
        assert!(handler.handle(Command::Start).await.contains("resumed"));
        assert!(!h.engine.state().is_paused());

        assert!(handler.handle(Command::Buy("JUP".into())).await.contains("Bought"));
        assert!(handler.handle(Command::Buy("JUP".into())).await.starts_with("❌"));
        assert!(handler.handle(Command::Sell("JUP".into())).await.contains("Sold"));

        assert!(handler.handle(Command::Logs(5)).await.contains("logging is off"));
        assert!(handler.handle(Command::Help).await.contains("/logs"));
    }

    #[tokio::test]
    async fn test_close_resets_trend_state() {
        let h = harness(FailurePolicy::Degrade, flat_market());
        h.engine.run_analysis_cycle().await;

        h.prices.set(JUP, 1.0);
        h.series.set(&BULLISH);
        h.engine.run_monitor_cycle().await;
        assert_eq!(
            h.engine.strategy.trend_states().unwrap().get(JUP),
            Some(&TrendState::Bullish)
        );

        h.engine.manual_sell("JUP").await.unwrap();
        assert_eq!(
            h.engine.strategy.trend_states().unwrap().get(JUP),
            Some(&TrendState::Bearish)
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel_and_flushes() {
        let h = harness(FailurePolicy::Degrade, flat_market());
        let cancel = h.engine.cancel_token();
        let run = tokio::spawn(h.engine.clone().run(None));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run did not stop")
            .unwrap();
        assert!(result.is_ok());

        let messages = h.notifier.messages();
        assert!(messages.first().unwrap().contains("started"));
        assert!(messages.last().unwrap().contains("stopped"));
    }

    #[tokio::test]
    async fn test_stuck_task_aborted_after_grace() {
        let finished = tokio::spawn(async {});
        let stuck = tokio::spawn(std::future::pending::<()>());
        let stuck_abort = stuck.abort_handle();

        let started = std::time::Instant::now();
        let clean = join_with_grace(vec![finished, stuck], Duration::from_millis(50)).await;

        assert!(!clean);
        assert!(started.elapsed() < Duration::from_secs(2));
        let aborted = tokio::time::timeout(Duration::from_secs(1), async {
            while !stuck_abort.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(aborted.is_ok());
    }

    #[tokio::test]
    async fn test_tasks_joined_within_grace() {
        let quick = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
        });
        assert!(join_with_grace(vec![quick], Duration::from_secs(1)).await);
    }
}
