//! Market data providers
//!
//! Read-only collaborators feeding the signal side: historical price
//! series (with optional volumes) and current spot prices. Providers never
//! fail the caller: transient errors are logged and come back as empty or
//! short series, which the signal code reads as "insufficient data".

pub mod coingecko;
pub mod geckoterminal;
pub mod jupiter_price;
pub mod retry;
pub mod throttle;

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

pub use coingecko::CoinGeckoClient;
pub use geckoterminal::GeckoTerminalClient;
pub use jupiter_price::JupiterPriceClient;
pub use retry::RetryPolicy;
pub use throttle::Throttle;

/// Candle timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn minutes(&self) -> u64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        };
        f.write_str(s)
    }
}

/// Prices with matching volumes, oldest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceVolumeSeries {
    pub prices: Vec<f64>,
    pub volumes: Vec<f64>,
}

impl PriceVolumeSeries {
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Historical series source
#[async_trait]
pub trait SeriesProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Closing prices, oldest first. Empty on failure.
    async fn get_series(&self, asset_ref: &str, timeframe: Timeframe, limit: usize) -> Vec<f64>;

    /// Closing prices and volumes, oldest first. Empty on failure.
    async fn get_series_with_volume(
        &self,
        asset_ref: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> PriceVolumeSeries;
}

/// Spot price source
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Current price in quote currency, `None` when unavailable
    async fn current_price(&self, asset_ref: &str) -> Option<f64>;
}

/// Keep only the most recent `limit` points
pub(crate) fn keep_last<T>(mut values: Vec<T>, limit: usize) -> Vec<T> {
    if values.len() > limit {
        values.drain(..values.len() - limit);
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_deserialize() {
        let tf: Timeframe = serde_json::from_str(r#""5m""#).unwrap();
        assert_eq!(tf, Timeframe::M5);
        assert_eq!(tf.minutes(), 5);
        assert_eq!(Timeframe::H4.to_string(), "4h");
    }

    #[test]
    fn test_keep_last() {
        assert_eq!(keep_last(vec![1, 2, 3, 4], 2), vec![3, 4]);
        assert_eq!(keep_last(vec![1, 2], 5), vec![1, 2]);
    }
}
