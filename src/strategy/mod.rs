//! Entry signal evaluation
//!
//! Two interchangeable strategies behind [`EntryStrategy`]:
//! - `crossover` - short/long SMA crossover against a persisted per-asset
//!   trend state, with optional RSI confirmation and market-health gate
//! - `trend_momentum` - rolling spot-price momentum confirmed by a volume
//!   surge and an overbought filter
//!
//! The caller applies the position cap and the one-position-per-asset guard
//! before asking a strategy for a decision.

pub mod crossover;
pub mod trend_momentum;

use crate::market::Timeframe;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use crossover::{CrossoverConfig, CrossoverStrategy, TrendState};
pub use trend_momentum::{TrendMomentumConfig, TrendMomentumStrategy};

/// Entry action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Buy,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

/// Strategy output
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDecision {
    pub action: Action,
    pub reason: String,
}

impl EntryDecision {
    pub fn buy(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Buy,
            reason: reason.into(),
        }
    }

    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Hold,
            reason: reason.into(),
        }
    }

    pub fn is_buy(&self) -> bool {
        self.action == Action::Buy
    }
}

/// Market data a strategy needs per asset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataRequest {
    pub timeframe: Timeframe,
    pub limit: usize,
    pub needs_volume: bool,
    pub needs_spot: bool,
}

/// Everything a strategy sees for one asset in one cycle
#[derive(Debug, Clone, Copy)]
pub struct SignalInput<'a> {
    pub asset_id: &'a str,
    /// Historical closes, oldest first
    pub prices: &'a [f64],
    /// `None` when the asset has no volume source
    pub volumes: Option<&'a [f64]>,
    pub current_price: Option<f64>,
    /// Momentum-adjusted market health
    pub health: f64,
}

/// Per-asset BUY/HOLD evaluator
pub trait EntryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn data_request(&self) -> DataRequest;

    /// Whether entry scanning should run at all under this health
    fn should_scan(&self, _health: f64) -> bool {
        true
    }

    fn evaluate(&self, input: &SignalInput<'_>) -> EntryDecision;

    /// Called after a position on `asset_id` is closed
    fn on_position_closed(&self, _asset_id: &str) {}

    /// Persistable trend states, for strategies that keep them
    fn trend_states(&self) -> Option<HashMap<String, TrendState>> {
        None
    }

    fn restore_trend_states(&self, _states: HashMap<String, TrendState>) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Crossover,
    #[default]
    TrendMomentum,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub kind: StrategyKind,
    #[serde(default)]
    pub crossover: CrossoverConfig,
    #[serde(default)]
    pub trend_momentum: TrendMomentumConfig,
}

impl StrategyConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.kind {
            StrategyKind::Crossover => self.crossover.validate(),
            StrategyKind::TrendMomentum => self.trend_momentum.validate(),
        }
    }

    /// Instantiate the configured strategy
    pub fn build(&self) -> Arc<dyn EntryStrategy> {
        match self.kind {
            StrategyKind::Crossover => Arc::new(CrossoverStrategy::new(self.crossover.clone())),
            StrategyKind::TrendMomentum => {
                Arc::new(TrendMomentumStrategy::new(self.trend_momentum.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_selects_kind() {
        let mut config = StrategyConfig::default();
        assert_eq!(config.build().name(), "trend_momentum");

        config.kind = StrategyKind::Crossover;
        assert_eq!(config.build().name(), "crossover");
    }

    #[test]
    fn test_decision_helpers() {
        assert!(EntryDecision::buy("x").is_buy());
        assert!(!EntryDecision::hold("y").is_buy());
        assert_eq!(Action::Hold.to_string(), "HOLD");
    }
}
