//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// Re-export subsystem configs
pub use crate::position::trailing::{ArmingPolicy, ExitConfig, TrailingMode, TrailingStep};
pub use crate::signal::health::{FailurePolicy, HealthAssetConfig, MarketHealthConfig};
pub use crate::strategy::crossover::CrossoverConfig;
pub use crate::strategy::trend_momentum::TrendMomentumConfig;
pub use crate::strategy::{StrategyConfig, StrategyKind};
pub use crate::market::RetryPolicy;
pub use crate::trading::gateway::ExecutionConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub jupiter: JupiterConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub market_health: MarketHealthConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub exit: ExitConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    /// Secondary endpoint used after the primary exhausts its retries
    #[serde(default = "default_fallback_endpoint")]
    pub fallback_endpoint: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            fallback_endpoint: default_fallback_endpoint(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JupiterConfig {
    #[serde(default = "default_jupiter_quote_url")]
    pub quote_url: String,
    #[serde(default = "default_jupiter_swap_url")]
    pub swap_url: String,
    #[serde(default = "default_jupiter_price_url")]
    pub price_url: String,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            quote_url: default_jupiter_quote_url(),
            swap_url: default_jupiter_swap_url(),
            price_url: default_jupiter_price_url(),
            slippage_bps: default_slippage_bps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,
    #[serde(default = "default_geckoterminal_url")]
    pub geckoterminal_url: String,
    /// Network slug used for GeckoTerminal pool lookups
    #[serde(default = "default_network")]
    pub network: String,
    /// Minimum spacing between calls to the read-only providers
    #[serde(default = "default_provider_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Retries for series requests before an asset counts as unavailable
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            coingecko_url: default_coingecko_url(),
            geckoterminal_url: default_geckoterminal_url(),
            network: default_network(),
            min_interval_ms: default_provider_min_interval_ms(),
            request_timeout_ms: default_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

/// A token the bot is allowed to trade
#[derive(Debug, Clone, Deserialize)]
pub struct TradeAssetConfig {
    /// Display name (e.g. "JUP")
    pub name: String,
    /// Token mint address
    pub mint: String,
    /// Pool address for OHLCV/volume lookups
    #[serde(default)]
    pub pool: Option<String>,
    /// Token decimals, used to derive the filled price from swap amounts
    #[serde(default)]
    pub decimals: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_trade_assets")]
    pub assets: Vec<TradeAssetConfig>,
    /// Mint of the quote currency positions are bought with
    #[serde(default = "default_quote_mint")]
    pub quote_mint: String,
    #[serde(default = "default_quote_decimals")]
    pub quote_decimals: u8,
    /// Notional per entry, in quote currency
    #[serde(default = "default_trade_amount")]
    pub trade_amount: f64,
    #[serde(default = "default_min_trade_amount")]
    pub min_trade_amount: f64,
    #[serde(default = "default_max_trade_amount")]
    pub max_trade_amount: f64,
    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: usize,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            assets: default_trade_assets(),
            quote_mint: default_quote_mint(),
            quote_decimals: default_quote_decimals(),
            trade_amount: default_trade_amount(),
            min_trade_amount: default_min_trade_amount(),
            max_trade_amount: default_max_trade_amount(),
            max_concurrent_positions: default_max_concurrent_positions(),
        }
    }
}

impl TradingConfig {
    /// Look up a traded asset by display name or mint
    pub fn find_asset(&self, key: &str) -> Option<&TradeAssetConfig> {
        self.assets
            .iter()
            .find(|a| a.mint == key || a.name.eq_ignore_ascii_case(key))
    }

    /// Display name for a mint, falling back to the mint itself
    pub fn asset_name<'a>(&'a self, mint: &'a str) -> &'a str {
        self.assets
            .iter()
            .find(|a| a.mint == mint)
            .map(|a| a.name.as_str())
            .unwrap_or(mint)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Slow loop: market health + signal history
    #[serde(default = "default_analysis_interval_secs")]
    pub analysis_interval_secs: u64,
    /// Fast loop: reprice positions + entry scan
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    /// Send a heartbeat every N analysis cycles
    #[serde(default = "default_heartbeat_cycles")]
    pub heartbeat_cycles: u64,
    /// How long shutdown waits for running cycles before aborting them
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            analysis_interval_secs: default_analysis_interval_secs(),
            monitor_interval_secs: default_monitor_interval_secs(),
            heartbeat_cycles: default_heartbeat_cycles(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl PersistenceConfig {
    pub fn positions_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("positions.json")
    }

    pub fn trend_states_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("asset_states.json")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_token")]
    pub bot_token: String,
    #[serde(default = "default_telegram_chat_id")]
    pub chat_id: String,
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
    /// Listen for operator commands (/status, /stop, ...)
    #[serde(default = "default_true")]
    pub commands_enabled: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: default_telegram_token(),
            chat_id: default_telegram_chat_id(),
            api_url: default_telegram_api_url(),
            commands_enabled: true,
        }
    }
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to this file (enables the `logs` command)
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_rpc_endpoint() -> String {
    std::env::var("RPC_ENDPOINT").unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into())
}

fn default_fallback_endpoint() -> Option<String> {
    std::env::var("RPC_FALLBACK_ENDPOINT").ok().filter(|s| !s.is_empty())
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_jupiter_quote_url() -> String {
    "https://lite-api.jup.ag/swap/v1/quote".into()
}

fn default_jupiter_swap_url() -> String {
    "https://lite-api.jup.ag/swap/v1/swap".into()
}

fn default_jupiter_price_url() -> String {
    "https://lite-api.jup.ag/price/v3".into()
}

fn default_slippage_bps() -> u32 {
    250
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".into()
}

fn default_geckoterminal_url() -> String {
    "https://api.geckoterminal.com/api/v2".into()
}

fn default_network() -> String {
    "solana".into()
}

fn default_provider_min_interval_ms() -> u64 {
    1100
}

fn default_trade_assets() -> Vec<TradeAssetConfig> {
    [
        ("JUP", "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN"),
        ("JTO", "jtojtomepa8beP8AuQc6eXt5FriJwfFMwQx2v2f9mCL"),
        ("WIF", "EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm"),
        ("BONK", "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263"),
    ]
    .into_iter()
    .map(|(name, mint)| TradeAssetConfig {
        name: name.into(),
        mint: mint.into(),
        pool: None,
        decimals: None,
    })
    .collect()
}

fn default_quote_mint() -> String {
    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".into()
}

fn default_quote_decimals() -> u8 {
    6
}

fn default_trade_amount() -> f64 {
    500.0
}

fn default_min_trade_amount() -> f64 {
    0.1
}

fn default_max_trade_amount() -> f64 {
    10000.0
}

fn default_max_concurrent_positions() -> usize {
    3
}

fn default_analysis_interval_secs() -> u64 {
    300
}

fn default_monitor_interval_secs() -> u64 {
    60
}

fn default_heartbeat_cycles() -> u64 {
    24
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_data_dir() -> String {
    "data".into()
}

fn default_telegram_token() -> String {
    std::env::var("TELEGRAM_TOKEN").unwrap_or_default()
}

fn default_telegram_chat_id() -> String {
    std::env::var("TELEGRAM_CHAT_ID").unwrap_or_default()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".into()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("rpc.endpoint", default_rpc_endpoint())?
            .set_default("rpc.timeout_ms", default_timeout_ms() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix TRADER_)
            .add_source(
                config::Environment::with_prefix("TRADER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Traded assets
        if self.trading.assets.is_empty() {
            anyhow::bail!("trading.assets must not be empty");
        }
        for asset in &self.trading.assets {
            crate::trading::validation::validate_mint(&asset.mint, &asset.name)
                .with_context(|| format!("Invalid mint for trading asset {}", asset.name))?;
        }
        crate::trading::validation::validate_mint(&self.trading.quote_mint, "quote_mint")
            .context("Invalid trading.quote_mint")?;

        // Trade amounts
        if self.trading.trade_amount <= 0.0 {
            anyhow::bail!("trade_amount must be positive");
        }
        if self.trading.min_trade_amount > self.trading.max_trade_amount {
            anyhow::bail!(
                "min_trade_amount ({}) cannot exceed max_trade_amount ({})",
                self.trading.min_trade_amount,
                self.trading.max_trade_amount
            );
        }
        if self.trading.trade_amount < self.trading.min_trade_amount
            || self.trading.trade_amount > self.trading.max_trade_amount
        {
            anyhow::bail!(
                "trade_amount {} outside [{}, {}]",
                self.trading.trade_amount,
                self.trading.min_trade_amount,
                self.trading.max_trade_amount
            );
        }
        if self.trading.max_concurrent_positions == 0 {
            anyhow::bail!("max_concurrent_positions must be at least 1");
        }

        if self.jupiter.slippage_bps > 10000 {
            anyhow::bail!("slippage_bps cannot exceed 10000 (100%)");
        }

        self.market_health.validate()?;
        self.strategy.validate()?;
        self.exit.validate()?;
        self.execution.validate()?;

        if self.market_data.retry.attempts == 0 {
            anyhow::bail!("market_data.retry.attempts must be at least 1");
        }

        if self.scheduler.analysis_interval_secs == 0 || self.scheduler.monitor_interval_secs == 0 {
            anyhow::bail!("scheduler intervals must be positive");
        }

        if self.scheduler.shutdown_grace_secs == 0 {
            anyhow::bail!("scheduler.shutdown_grace_secs must be positive");
        }

        if self.rpc.fallback_endpoint.as_deref() == Some(self.rpc.endpoint.as_str()) {
            tracing::warn!("rpc.fallback_endpoint equals rpc.endpoint - failover will not help");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let assets: Vec<&str> = self.trading.assets.iter().map(|a| a.name.as_str()).collect();
        let health_assets: Vec<String> = self
            .market_health
            .assets
            .iter()
            .map(|a| format!("{}={}", a.name, a.weight))
            .collect();

        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    fallback: {}
    timeout: {}ms
  Market Health:
    assets: {:?}
    period: {} ({})
    momentum: window={} weight={}
    failure_policy: {:?}
  Strategy:
    kind: {:?}
  Trading:
    assets: {:?}
    amount: {} (min {}, max {})
    max_positions: {}
    slippage: {}bps
  Exit:
    trailing: {:?}
    arming: {:?}
    stop_loss: {}
  Execution:
    retries: {} (+{} fallback), backoff {}..{}ms
  Scheduler:
    analysis: {}s, monitor: {}s
  Telegram:
    token: {}
    chat_id: {}
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc
                .fallback_endpoint
                .as_deref()
                .map(mask_url)
                .unwrap_or_else(|| "(none)".into()),
            self.rpc.timeout_ms,
            health_assets,
            self.market_health.indicator_period,
            self.market_health.timeframe,
            self.market_health.history_window,
            self.market_health.momentum_weight,
            self.market_health.failure_policy,
            self.strategy.kind,
            assets,
            self.trading.trade_amount,
            self.trading.min_trade_amount,
            self.trading.max_trade_amount,
            self.trading.max_concurrent_positions,
            self.jupiter.slippage_bps,
            self.exit.trailing.mode,
            self.exit.arming,
            self.exit
                .stop_loss_pct
                .map(|p| format!("{}%", p))
                .unwrap_or_else(|| "(off)".into()),
            self.execution.max_retries,
            self.execution.fallback_attempts,
            self.execution.backoff_initial_ms,
            self.execution.backoff_max_ms,
            self.scheduler.analysis_interval_secs,
            self.scheduler.monitor_interval_secs,
            if self.telegram.bot_token.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            if self.telegram.chat_id.is_empty() {
                "(not set)"
            } else {
                self.telegram.chat_id.as_str()
            },
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.trading.max_concurrent_positions, 3);
        assert_eq!(config.market_health.history_window, 2);
        assert_eq!(config.execution.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_amount_bounds() {
        let mut config = Config::default();
        config.trading.min_trade_amount = 100.0;
        config.trading.max_trade_amount = 10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_mint() {
        let mut config = Config::default();
        config.trading.assets[0].mint = "not-a-mint!".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_find_asset_by_name_or_mint() {
        let config = Config::default();
        let jup = config.trading.find_asset("jup").unwrap();
        assert_eq!(jup.mint, "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN");
        assert!(config.trading.find_asset(&jup.mint).is_some());
        assert!(config.trading.find_asset("DOGE").is_none());
        assert_eq!(config.trading.asset_name("unknown"), "unknown");
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trader.toml");
        std::fs::write(
            &path,
            r#"
[trading]
trade_amount = 25.0
max_concurrent_positions = 2

[strategy]
kind = "crossover"

[exit]
stop_loss_pct = 3.0

[exit.trailing]
mode = "fixed"
fixed_pct = 2.5

[market_data.retry]
attempts = 5
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.trading.trade_amount, 25.0);
        assert_eq!(config.trading.max_concurrent_positions, 2);
        assert_eq!(config.strategy.kind, StrategyKind::Crossover);
        assert_eq!(config.exit.stop_loss_pct, Some(3.0));
        assert_eq!(config.exit.trailing.fixed_pct, 2.5);
        assert_eq!(config.market_data.retry.attempts, 5);
        assert_eq!(config.market_data.retry.initial_ms, 1000);
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://rpc.example.com?api-key=secret"),
            "https://rpc.example.com?***"
        );
        assert_eq!(mask_url("https://rpc.example.com"), "https://rpc.example.com");
    }
}
