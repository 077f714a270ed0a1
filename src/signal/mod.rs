//! Market signal computation
//!
//! - `history`: rolling health samples and momentum
//! - `indicators`: SMA / RSI / percent-change helpers
//! - `health`: weighted market-health score over reference assets

pub mod health;
pub mod history;
pub mod indicators;

pub use health::{AggregateHealthScore, AssetContribution, MarketHealthEvaluator};
pub use history::{SignalHistory, SignalSample};
