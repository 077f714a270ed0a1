//! Spot-price trend momentum with volume and overbought filters
//!
//! Keeps a rolling window of spot prices per asset (one sample per monitor
//! cycle). Once the window is full, the average period-over-period change
//! must exceed the threshold; then recent volume must surge against the
//! preceding periods and RSI must not be overbought.

use super::{DataRequest, EntryDecision, EntryStrategy, SignalInput};
use crate::market::Timeframe;
use crate::signal::indicators::{average_pct_change, rsi, volume_ratio, VolumeGap};
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct TrendMomentumConfig {
    /// Spot samples in the rolling window
    #[serde(default = "default_window")]
    pub window: usize,
    /// Average % change must be strictly above this
    #[serde(default = "default_momentum_threshold_pct")]
    pub momentum_threshold_pct: f64,
    /// k in "last k periods vs the 2k before"
    #[serde(default = "default_volume_recent_periods")]
    pub volume_recent_periods: usize,
    #[serde(default = "default_volume_ratio_min")]
    pub volume_ratio_min: f64,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
    /// Entry scanning is skipped below this adjusted health
    #[serde(default = "default_severe_bearish_health")]
    pub severe_bearish_health: f64,
    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for TrendMomentumConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            momentum_threshold_pct: default_momentum_threshold_pct(),
            volume_recent_periods: default_volume_recent_periods(),
            volume_ratio_min: default_volume_ratio_min(),
            rsi_period: default_rsi_period(),
            rsi_overbought: default_rsi_overbought(),
            severe_bearish_health: default_severe_bearish_health(),
            timeframe: default_timeframe(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_window() -> usize {
    10
}

fn default_momentum_threshold_pct() -> f64 {
    0.5
}

fn default_volume_recent_periods() -> usize {
    5
}

fn default_volume_ratio_min() -> f64 {
    1.5
}

fn default_rsi_period() -> usize {
    14
}

fn default_rsi_overbought() -> f64 {
    70.0
}

fn default_severe_bearish_health() -> f64 {
    -0.5
}

fn default_timeframe() -> Timeframe {
    Timeframe::M1
}

fn default_history_limit() -> usize {
    15
}

impl TrendMomentumConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window < 2 {
            anyhow::bail!("trend_momentum.window must be at least 2");
        }
        if self.volume_recent_periods == 0 {
            anyhow::bail!("trend_momentum.volume_recent_periods must be positive");
        }
        if self.history_limit < self.volume_recent_periods * 3 {
            anyhow::bail!(
                "trend_momentum.history_limit ({}) must cover 3 x volume_recent_periods",
                self.history_limit
            );
        }
        if !(0.0..=100.0).contains(&self.rsi_overbought) {
            anyhow::bail!("trend_momentum.rsi_overbought must be within 0..=100");
        }
        if self.volume_ratio_min <= 0.0 {
            anyhow::bail!("trend_momentum.volume_ratio_min must be positive");
        }
        Ok(())
    }
}

pub struct TrendMomentumStrategy {
    config: TrendMomentumConfig,
    windows: DashMap<String, VecDeque<f64>>,
}

impl TrendMomentumStrategy {
    pub fn new(config: TrendMomentumConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Append a spot price and return the current window
    fn push_price(&self, asset_id: &str, price: f64) -> Vec<f64> {
        let mut window = self.windows.entry(asset_id.to_string()).or_default();
        window.push_back(price);
        while window.len() > self.config.window {
            window.pop_front();
        }
        window.iter().copied().collect()
    }

    pub fn window_len(&self, asset_id: &str) -> usize {
        self.windows.get(asset_id).map(|w| w.len()).unwrap_or(0)
    }
}

impl EntryStrategy for TrendMomentumStrategy {
    fn name(&self) -> &'static str {
        "trend_momentum"
    }

    fn data_request(&self) -> DataRequest {
        DataRequest {
            timeframe: self.config.timeframe,
            limit: self.config.history_limit,
            needs_volume: true,
            needs_spot: true,
        }
    }

    fn should_scan(&self, health: f64) -> bool {
        health >= self.config.severe_bearish_health
    }

    fn evaluate(&self, input: &SignalInput<'_>) -> EntryDecision {
        let Some(price) = input.current_price.filter(|p| p.is_finite() && *p > 0.0) else {
            return EntryDecision::hold("No spot price");
        };

        let window = self.push_price(input.asset_id, price);
        if window.len() < self.config.window {
            return EntryDecision::hold(format!(
                "Building price history ({}/{})",
                window.len(),
                self.config.window
            ));
        }

        let momentum = average_pct_change(&window).unwrap_or(0.0);
        debug!("{}: trend {:+.2}% over {} samples", input.asset_id, momentum, window.len());
        if momentum <= self.config.momentum_threshold_pct {
            return EntryDecision::hold(format!(
                "No trend signal ({:.2}% <= {:.2}%)",
                momentum, self.config.momentum_threshold_pct
            ));
        }

        let Some(volumes) = input.volumes else {
            return EntryDecision::hold("Volume filter: no volume source");
        };
        let ratio = match volume_ratio(volumes, self.config.volume_recent_periods) {
            Ok(ratio) => ratio,
            Err(VolumeGap::TooShort { have, needed }) => {
                return EntryDecision::hold(format!(
                    "Volume filter: insufficient volume data ({}/{})",
                    have, needed
                ));
            }
            Err(VolumeGap::NoBaseline) => {
                return EntryDecision::hold("Volume filter: no baseline volume");
            }
        };
        if ratio < self.config.volume_ratio_min {
            return EntryDecision::hold(format!(
                "Volume filter: ratio {:.2}x < {:.1}x",
                ratio, self.config.volume_ratio_min
            ));
        }

        // Too few closes skips the filter rather than blocking
        if let Some(value) = rsi(input.prices, self.config.rsi_period) {
            if value > self.config.rsi_overbought {
                return EntryDecision::hold(format!(
                    "Overbought filter: RSI {:.2} > {:.0}",
                    value, self.config.rsi_overbought
                ));
            }
        }

        EntryDecision::buy(format!(
            "TREND ({:.2}% > {:.2}%), Vol={:.2}x",
            momentum, self.config.momentum_threshold_pct, ratio
        ))
    }
}
