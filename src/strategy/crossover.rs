//! SMA crossover with remembered trend state
//!
//! Each evaluation classifies the asset as BULLISH (short SMA above long SMA)
//! or BEARISH and compares against the state recorded on the previous
//! evaluation. Only a BEARISH -> BULLISH transition can produce a BUY. The
//! new state is written back on every evaluation that had enough data, so a
//! cross is seen at most once even when it happened between cycles.

use super::{DataRequest, EntryDecision, EntryStrategy, SignalInput};
use crate::market::Timeframe;
use crate::signal::indicators::{rsi, sma};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Last recorded trend of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendState {
    Bullish,
    Bearish,
}

impl fmt::Display for TrendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendState::Bullish => write!(f, "BULLISH"),
            TrendState::Bearish => write!(f, "BEARISH"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrossoverConfig {
    #[serde(default = "default_short_period")]
    pub short_period: usize,
    #[serde(default = "default_long_period")]
    pub long_period: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    /// RSI must be strictly above this to confirm a cross
    #[serde(default = "default_rsi_threshold")]
    pub rsi_threshold: f64,
    #[serde(default)]
    pub require_momentum_confirmation: bool,
    /// Hold when adjusted health is at or below this
    #[serde(default)]
    pub min_market_health: Option<f64>,
    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            short_period: default_short_period(),
            long_period: default_long_period(),
            rsi_period: default_rsi_period(),
            rsi_threshold: default_rsi_threshold(),
            require_momentum_confirmation: false,
            min_market_health: None,
            timeframe: default_timeframe(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_short_period() -> usize {
    12
}

fn default_long_period() -> usize {
    26
}

fn default_rsi_period() -> usize {
    14
}

fn default_rsi_threshold() -> f64 {
    50.0
}

fn default_timeframe() -> Timeframe {
    Timeframe::H1
}

fn default_history_limit() -> usize {
    100
}

impl CrossoverConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.short_period == 0 || self.short_period >= self.long_period {
            anyhow::bail!(
                "crossover short_period ({}) must be positive and below long_period ({})",
                self.short_period,
                self.long_period
            );
        }
        if self.rsi_period == 0 {
            anyhow::bail!("crossover rsi_period must be positive");
        }
        if !(0.0..=100.0).contains(&self.rsi_threshold) {
            anyhow::bail!("crossover rsi_threshold must be within 0..=100");
        }
        if self.history_limit < self.required_points() {
            anyhow::bail!(
                "crossover history_limit ({}) is below the {} points the indicators need",
                self.history_limit,
                self.required_points()
            );
        }
        Ok(())
    }

    fn required_points(&self) -> usize {
        if self.require_momentum_confirmation {
            self.long_period.max(self.rsi_period + 1)
        } else {
            self.long_period
        }
    }
}

pub struct CrossoverStrategy {
    config: CrossoverConfig,
    states: DashMap<String, TrendState>,
}

impl CrossoverStrategy {
    pub fn new(config: CrossoverConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    /// Recorded state; an asset never seen reads as BEARISH
    pub fn previous_state(&self, asset_id: &str) -> TrendState {
        self.states
            .get(asset_id)
            .map(|s| *s)
            .unwrap_or(TrendState::Bearish)
    }
}

impl EntryStrategy for CrossoverStrategy {
    fn name(&self) -> &'static str {
        "crossover"
    }

    fn data_request(&self) -> DataRequest {
        DataRequest {
            timeframe: self.config.timeframe,
            limit: self.config.history_limit,
            needs_volume: false,
            needs_spot: false,
        }
    }

    fn evaluate(&self, input: &SignalInput<'_>) -> EntryDecision {
        let required = self.config.required_points();
        if input.prices.len() < required {
            return EntryDecision::hold(format!(
                "Insufficient data (need {}, have {})",
                required,
                input.prices.len()
            ));
        }

        let (Some(short), Some(long)) = (
            sma(input.prices, self.config.short_period),
            sma(input.prices, self.config.long_period),
        ) else {
            return EntryDecision::hold("Indicators unavailable");
        };

        let current = if short > long {
            TrendState::Bullish
        } else {
            TrendState::Bearish
        };
        let previous = self
            .states
            .insert(input.asset_id.to_string(), current)
            .unwrap_or(TrendState::Bearish);

        debug!(
            "{}: SMA{}={:.6} SMA{}={:.6} {} -> {}",
            input.asset_id,
            self.config.short_period,
            short,
            self.config.long_period,
            long,
            previous,
            current
        );

        if let Some(min_health) = self.config.min_market_health {
            if input.health <= min_health {
                return EntryDecision::hold(format!(
                    "Market health {:.2} at or below {:.2}",
                    input.health, min_health
                ));
            }
        }

        if previous == TrendState::Bearish && current == TrendState::Bullish {
            if self.config.require_momentum_confirmation {
                let value = rsi(input.prices, self.config.rsi_period).unwrap_or(0.0);
                if value <= self.config.rsi_threshold {
                    return EntryDecision::hold(format!(
                        "Golden cross but RSI too low ({:.2} <= {:.0})",
                        value, self.config.rsi_threshold
                    ));
                }
                info!("{}: golden cross confirmed by RSI {:.2}", input.asset_id, value);
                return EntryDecision::buy(format!("Golden cross (RSI {:.2})", value));
            }
            return EntryDecision::buy("Golden cross");
        }

        match current {
            TrendState::Bullish => EntryDecision::hold("Trend already bullish, waiting for new crossover"),
            TrendState::Bearish => EntryDecision::hold("Bearish trend, no entry signal"),
        }
    }

    fn on_position_closed(&self, asset_id: &str) {
        self.states.insert(asset_id.to_string(), TrendState::Bearish);
    }

    fn trend_states(&self) -> Option<HashMap<String, TrendState>> {
        Some(
            self.states
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        )
    }

    fn restore_trend_states(&self, states: HashMap<String, TrendState>) {
        for (asset, state) in states {
            self.states.insert(asset, state);
        }
    }
}
