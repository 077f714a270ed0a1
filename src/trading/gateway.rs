//! Execution gateway
//!
//! Turns BUY/SELL decisions into venue swaps:
//! validate -> round-trip on the primary venue with exponential backoff ->
//! fail over to the fallback venue -> update positions and persist ->
//! notify. Total failure raises a fatal alert and leaves positions as they
//! were. Sells claim the position first, so a second trigger for the same
//! id is a silent success that never touches the venue.
//!
//! Once a transaction is submitted it is never submitted again. A failed or
//! timed-out confirmation is resolved by polling its status; if it is still
//! unknown the gateway stops, alerts, and reads balances to decide whether
//! the swap landed.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::TradingConfig;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::notify::{format, Notifier};
use crate::position::{Position, PositionManager, TrendStateStore};
use crate::strategy::EntryStrategy;
use crate::trading::validation;
use crate::trading::venue::{
    to_raw, to_ui, ConfirmStatus, Quote, QuoteRequest, SignedSwap, SwapReceipt, TokenBalance,
    TradeVenue,
};

/// Retry and timeout settings for venue round-trips
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Extra attempts on the primary venue after the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Attempts on the fallback venue, if one is configured
    #[serde(default = "default_fallback_attempts")]
    pub fallback_attempts: u32,
    /// Bound on quote..sign, and on each submit or confirm call
    #[serde(default = "default_round_trip_timeout_ms")]
    pub round_trip_timeout_ms: u64,
    /// Status polls after the venue reports an unknown outcome
    #[serde(default = "default_confirm_poll_attempts")]
    pub confirm_poll_attempts: u32,
    #[serde(default = "default_confirm_poll_interval_ms")]
    pub confirm_poll_interval_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_initial_ms() -> u64 {
    5000
}

fn default_backoff_max_ms() -> u64 {
    20000
}

fn default_fallback_attempts() -> u32 {
    3
}

fn default_round_trip_timeout_ms() -> u64 {
    90000
}

fn default_confirm_poll_attempts() -> u32 {
    10
}

fn default_confirm_poll_interval_ms() -> u64 {
    2000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            fallback_attempts: default_fallback_attempts(),
            round_trip_timeout_ms: default_round_trip_timeout_ms(),
            confirm_poll_attempts: default_confirm_poll_attempts(),
            confirm_poll_interval_ms: default_confirm_poll_interval_ms(),
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backoff_initial_ms == 0 {
            anyhow::bail!("execution.backoff_initial_ms must be positive");
        }
        if self.backoff_max_ms < self.backoff_initial_ms {
            anyhow::bail!(
                "execution.backoff_max_ms ({}) below backoff_initial_ms ({})",
                self.backoff_max_ms,
                self.backoff_initial_ms
            );
        }
        if self.round_trip_timeout_ms == 0 {
            anyhow::bail!("execution.round_trip_timeout_ms must be positive");
        }
        Ok(())
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.backoff_initial_ms))
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(Duration::from_millis(self.backoff_max_ms))
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Releases a reserved buy slot when dropped
struct PendingSlot<'a>(&'a AtomicUsize);

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ExecutionGateway {
    primary: Arc<dyn TradeVenue>,
    fallback: Option<Arc<dyn TradeVenue>>,
    positions: Arc<PositionManager>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    trading: TradingConfig,
    slippage_bps: u32,
    config: ExecutionConfig,
    strategy: Option<Arc<dyn EntryStrategy>>,
    trend_store: Option<TrendStateStore>,
    /// Buys between validation and position open
    pending_buys: AtomicUsize,
}

impl ExecutionGateway {
    pub fn new(
        primary: Arc<dyn TradeVenue>,
        positions: Arc<PositionManager>,
        notifier: Arc<dyn Notifier>,
        trading: TradingConfig,
        slippage_bps: u32,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            primary,
            fallback: None,
            positions,
            notifier,
            metrics: Arc::new(Metrics::new()),
            trading,
            slippage_bps,
            config,
            strategy: None,
            trend_store: None,
            pending_buys: AtomicUsize::new(0),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn TradeVenue>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Strategy to notify on close, and where to persist its trend states
    pub fn with_strategy(
        mut self,
        strategy: Arc<dyn EntryStrategy>,
        trend_store: Option<TrendStateStore>,
    ) -> Self {
        self.strategy = Some(strategy);
        self.trend_store = trend_store;
        self
    }

    pub fn positions(&self) -> &Arc<PositionManager> {
        &self.positions
    }

    pub fn trading(&self) -> &TradingConfig {
        &self.trading
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Buy `notional` of quote currency worth of `asset`.
    ///
    /// `Err` only for validation or persistence failures; a trade that
    /// could not be executed returns `Ok(false)` after alerting.
    pub async fn buy(&self, asset: &str, notional: f64, expected_price: f64, reason: &str) -> Result<bool> {
        validation::validate_mint(asset, "asset")?;
        validation::validate_amount(
            notional,
            self.trading.min_trade_amount,
            self.trading.max_trade_amount,
        )?;
        validation::validate_price(expected_price)?;

        let in_flight = self.pending_buys.fetch_add(1, Ordering::SeqCst);
        let _slot = PendingSlot(&self.pending_buys);
        validation::validate_position_limit(
            self.positions.count().await + in_flight,
            self.trading.max_concurrent_positions,
        )?;

        let name = self.trading.asset_name(asset).to_string();
        info!("BUY {} for {} quote at ~{} ({})", name, notional, expected_price, reason);

        let request = QuoteRequest {
            input_mint: self.trading.quote_mint.clone(),
            output_mint: asset.to_string(),
            amount_raw: to_raw(notional, self.trading.quote_decimals),
            slippage_bps: self.slippage_bps,
            reference_price: Some(expected_price),
        };

        let held_before = self.balance(asset).await.ok();

        let receipt = match self.execute(&request).await {
            Ok(receipt) => receipt,
            Err(Error::ConfirmationUnresolved { signature, attempts }) => {
                let held_after = self.balance(asset).await.ok();
                match received(held_before, held_after) {
                    Some(out_amount) => {
                        warn!("BUY {} unconfirmed but balance grew by {} units, tracking it", name, out_amount);
                        SwapReceipt {
                            signature,
                            endpoint: UNCONFIRMED.to_string(),
                            in_amount: request.amount_raw,
                            out_amount,
                        }
                    }
                    None => {
                        let e = Error::ConfirmationUnresolved { signature, attempts };
                        self.alert("BUY", &name, &e).await;
                        return Ok(false);
                    }
                }
            }
            Err(e) => {
                self.alert("BUY", &name, &e).await;
                return Ok(false);
            }
        };

        let entry_price = self.fill_price(asset, &receipt).unwrap_or(expected_price);
        let position = self
            .positions
            .open(asset, entry_price, notional, Some(receipt.signature.clone()))
            .await?;
        self.metrics.record_open();

        self.notifier
            .send(&format::buy_message(
                &name,
                position.entry_price,
                notional,
                reason,
                &receipt.signature,
            ))
            .await;
        Ok(true)
    }

    /// Sell the whole balance behind position `id`.
    ///
    /// An id that is already closed or being sold is a silent success.
    pub async fn sell(&self, id: u64, current_price: Option<f64>, reason: &str) -> Result<bool> {
        if let Some(price) = current_price {
            validation::validate_price(price)?;
        }

        if !self.positions.begin_close(id).await {
            debug!("Sell of #{} skipped: closed or already in flight", id);
            return Ok(true);
        }
        let Some(position) = self.positions.get(id).await else {
            self.positions.release_close(id);
            return Ok(true);
        };

        match self.sell_claimed(&position, current_price, reason).await {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.positions.release_close(id);
                Ok(false)
            }
            Err(e) => {
                self.positions.release_close(id);
                Err(e)
            }
        }
    }

    async fn sell_claimed(&self, position: &Position, current_price: Option<f64>, reason: &str) -> Result<bool> {
        let name = self.trading.asset_name(&position.asset).to_string();

        let balance = match self.balance(&position.asset).await {
            Ok(balance) => balance,
            Err(e) => {
                self.alert("SELL", &name, &e).await;
                return Ok(false);
            }
        };

        if balance.is_zero() {
            warn!(
                "Position #{} in {} has no token balance, closing without a swap",
                position.id, name
            );
            self.finish_close(position).await?;
            self.notifier
                .send(&format!("⚠️ {} position #{} closed: wallet holds no tokens", name, position.id))
                .await;
            return Ok(true);
        }

        info!(
            "SELL {} ({} units) for position #{} ({})",
            name,
            balance.ui(),
            position.id,
            reason
        );

        let quote_before = self.balance(&self.trading.quote_mint).await.ok();

        let request = QuoteRequest {
            input_mint: position.asset.clone(),
            output_mint: self.trading.quote_mint.clone(),
            amount_raw: balance.raw,
            slippage_bps: self.slippage_bps,
            reference_price: current_price,
        };

        let receipt = match self.execute(&request).await {
            Ok(receipt) => receipt,
            Err(Error::ConfirmationUnresolved { signature, attempts }) => {
                let remaining = self.balance(&position.asset).await.ok();
                match remaining.filter(|r| r.raw < balance.raw) {
                    Some(remaining) => {
                        warn!("SELL {} unconfirmed but token balance dropped, treating as sold", name);
                        SwapReceipt {
                            signature,
                            endpoint: UNCONFIRMED.to_string(),
                            in_amount: balance.raw - remaining.raw,
                            out_amount: 0,
                        }
                    }
                    None => {
                        let e = Error::ConfirmationUnresolved { signature, attempts };
                        self.alert("SELL", &name, &e).await;
                        return Ok(false);
                    }
                }
            }
            Err(e) => {
                self.alert("SELL", &name, &e).await;
                return Ok(false);
            }
        };

        let quote_after = self.balance(&self.trading.quote_mint).await.ok();
        let (pnl, reconciled) = match reconcile(quote_before, quote_after) {
            Some(proceeds) => (proceeds - position.notional, true),
            None => {
                warn!("Could not reconcile proceeds for #{}, using estimate", position.id);
                let estimate = match current_price {
                    Some(price) => position.pnl_value(price),
                    None if receipt.out_amount > 0 => {
                        to_ui(receipt.out_amount, self.trading.quote_decimals) - position.notional
                    }
                    None => 0.0,
                };
                (estimate, false)
            }
        };
        let pnl_pct = pnl / position.notional * 100.0;
        let exit_price = current_price.unwrap_or(position.entry_price * (1.0 + pnl_pct / 100.0));

        self.finish_close(position).await?;
        self.metrics.record_close(pnl);

        self.notifier
            .send(&format::sell_message(&name, exit_price, reason, pnl, pnl_pct, reconciled))
            .await;
        Ok(true)
    }

    /// Remove the position, reset its trend state and persist both
    async fn finish_close(&self, position: &Position) -> Result<()> {
        self.positions.close(position.id).await?;
        if let Some(strategy) = &self.strategy {
            strategy.on_position_closed(&position.asset);
        }
        self.persist_trend_states().await
    }

    pub async fn persist_trend_states(&self) -> Result<()> {
        let (Some(strategy), Some(store)) = (&self.strategy, &self.trend_store) else {
            return Ok(());
        };
        match strategy.trend_states() {
            Some(states) => store.save(&states).await,
            None => Ok(()),
        }
    }

    /// Balance via the primary venue, then the fallback
    pub async fn balance(&self, mint: &str) -> Result<TokenBalance> {
        match self.primary.balance(mint).await {
            Ok(balance) => Ok(balance),
            Err(e) => match &self.fallback {
                Some(fallback) => {
                    warn!("Balance lookup via {} failed ({}), trying fallback", self.primary.endpoint(), e);
                    fallback.balance(mint).await
                }
                None => Err(e),
            },
        }
    }

    /// Price paid per token, when the asset's decimals are known
    fn fill_price(&self, asset: &str, receipt: &SwapReceipt) -> Option<f64> {
        let decimals = self.trading.find_asset(asset)?.decimals?;
        let tokens = to_ui(receipt.out_amount, decimals);
        (tokens > 0.0).then(|| to_ui(receipt.in_amount, self.trading.quote_decimals) / tokens)
    }

    async fn alert(&self, action: &str, name: &str, e: &Error) {
        error!("{} {} failed: {}", action, name, e);
        let (attempts, last_error) = match e {
            Error::ExecutionExhausted { attempts, last_error } => (*attempts, last_error.clone()),
            Error::ConfirmationUnresolved { attempts, .. } => (*attempts, e.to_string()),
            other => (0, other.to_string()),
        };
        self.notifier
            .send(&format::fatal_alert(action, name, attempts, &last_error))
            .await;
    }

    /// Run the round-trip on the primary venue, then the fallback
    async fn execute(&self, request: &QuoteRequest) -> Result<SwapReceipt> {
        let mut venues: Vec<(&dyn TradeVenue, u32)> =
            vec![(self.primary.as_ref(), self.config.max_retries + 1)];
        if let Some(fallback) = &self.fallback {
            venues.push((fallback.as_ref(), self.config.fallback_attempts));
        }

        let mut attempts = 0u32;
        let mut last_error = String::from("no attempt made");

        for (index, (venue, budget)) in venues.into_iter().enumerate() {
            if index > 0 {
                warn!("Failing over to {}", venue.endpoint());
            }

            let mut backoff = self.config.backoff();
            for attempt in 1..=budget {
                attempts += 1;
                let result = self.round_trip(venue, request).await;
                self.metrics.record_api_call(result.is_ok());

                match result {
                    Ok(receipt) => {
                        info!(
                            "Swap {} confirmed via {} (attempt {})",
                            receipt.signature, receipt.endpoint, attempts
                        );
                        return Ok(receipt);
                    }
                    Err(Error::ConfirmationUnresolved { signature, .. }) => {
                        error!(
                            "Swap {} via {} unresolved after polling, not retrying",
                            signature,
                            venue.endpoint()
                        );
                        return Err(Error::ConfirmationUnresolved { signature, attempts });
                    }
                    Err(e) if !e.is_retryable() => {
                        error!("Permanent swap error via {}: {}", venue.endpoint(), e);
                        return Err(Error::ExecutionExhausted {
                            attempts,
                            last_error: e.to_string(),
                        });
                    }
                    Err(e) => {
                        warn!(
                            "Swap attempt {}/{} via {} failed: {}",
                            attempt,
                            budget,
                            venue.endpoint(),
                            e
                        );
                        last_error = e.to_string();
                        if attempt < budget {
                            if let Some(delay) = backoff.next_backoff() {
                                debug!("Retrying in {:?}", delay);
                                tokio::time::sleep(delay).await;
                            }
                        }
                    }
                }
            }
        }

        Err(Error::ExecutionExhausted { attempts, last_error })
    }

    async fn round_trip(&self, venue: &dyn TradeVenue, request: &QuoteRequest) -> Result<SwapReceipt> {
        let timeout_ms = self.config.round_trip_timeout_ms;
        let limit = Duration::from_millis(timeout_ms);

        let (quote, signed) = match tokio::time::timeout(limit, prepare(venue, request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Timeout {
                    operation: format!("quote via {}", venue.endpoint()),
                    timeout_ms,
                })
            }
        };

        // From here on the transaction may land
        let signature = match tokio::time::timeout(limit, venue.submit(&signed)).await {
            Ok(Ok(signature)) => signature,
            Ok(Err(e)) => {
                // A rejected send can still have reached a leader
                return match self.status_once(venue, &signed.signature).await {
                    ConfirmStatus::Success => Ok(swap_receipt(signed.signature, venue, &quote)),
                    ConfirmStatus::Failed(reason) => Err(Error::TransactionFailed {
                        signature: signed.signature,
                        reason,
                    }),
                    ConfirmStatus::Unknown => Err(e),
                };
            }
            Err(_) => {
                warn!("Submit of {} timed out, checking status", signed.signature);
                signed.signature.clone()
            }
        };

        match self.resolve(venue, &signature).await {
            ConfirmStatus::Success => Ok(swap_receipt(signature, venue, &quote)),
            ConfirmStatus::Failed(reason) => Err(Error::TransactionFailed { signature, reason }),
            ConfirmStatus::Unknown => Err(Error::ConfirmationUnresolved { signature, attempts: 0 }),
        }
    }

    /// Confirm, falling back to status polling when the answer is unknown
    async fn resolve(&self, venue: &dyn TradeVenue, signature: &str) -> ConfirmStatus {
        let limit = Duration::from_millis(self.config.round_trip_timeout_ms);
        let first = match tokio::time::timeout(limit, venue.confirm(signature)).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!("Confirm of {} failed ({}), polling status", signature, e);
                ConfirmStatus::Unknown
            }
            Err(_) => {
                warn!("Confirm of {} timed out, polling status", signature);
                ConfirmStatus::Unknown
            }
        };

        match first {
            ConfirmStatus::Unknown => self.poll_status(venue, signature).await,
            resolved => resolved,
        }
    }

    async fn poll_status(&self, venue: &dyn TradeVenue, signature: &str) -> ConfirmStatus {
        let interval = Duration::from_millis(self.config.confirm_poll_interval_ms);
        for _ in 0..self.config.confirm_poll_attempts {
            tokio::time::sleep(interval).await;
            match self.status_once(venue, signature).await {
                ConfirmStatus::Unknown => continue,
                resolved => return resolved,
            }
        }
        ConfirmStatus::Unknown
    }

    /// One bounded status lookup; lookup errors count as unknown
    async fn status_once(&self, venue: &dyn TradeVenue, signature: &str) -> ConfirmStatus {
        let limit = Duration::from_millis(self.config.round_trip_timeout_ms);
        match tokio::time::timeout(limit, venue.signature_status(signature)).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                debug!("Status check for {} failed: {}", signature, e);
                ConfirmStatus::Unknown
            }
            Err(_) => ConfirmStatus::Unknown,
        }
    }
}

/// Endpoint label for swaps only proven by balances
const UNCONFIRMED: &str = "unconfirmed";

async fn prepare(venue: &dyn TradeVenue, request: &QuoteRequest) -> Result<(Quote, SignedSwap)> {
    let quote = venue.quote(request).await?;
    let payload = venue.build(&quote).await?;
    let signed = venue.sign(payload)?;
    Ok((quote, signed))
}

fn swap_receipt(signature: String, venue: &dyn TradeVenue, quote: &Quote) -> SwapReceipt {
    SwapReceipt {
        signature,
        endpoint: venue.endpoint().to_string(),
        in_amount: quote.in_amount,
        out_amount: quote.out_amount,
    }
}

/// Asset units gained between two balance reads
fn received(before: Option<TokenBalance>, after: Option<TokenBalance>) -> Option<u64> {
    let (before, after) = (before?, after?);
    (after.raw > before.raw).then(|| after.raw - before.raw)
}

/// Quote currency received, from balances around the swap
fn reconcile(before: Option<TokenBalance>, after: Option<TokenBalance>) -> Option<f64> {
    let (before, after) = (before?, after?);
    (after.raw > before.raw).then(|| after.ui() - before.ui())
}
