//! CoinGecko market_chart client for the market-health reference assets

use crate::error::{Error, Result};
use crate::market::retry::{with_retry, RetryPolicy};
use crate::market::{keep_last, PriceVolumeSeries, SeriesProvider, Throttle, Timeframe};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct MarketChartResponse {
    #[serde(default)]
    prices: Vec<(f64, f64)>,
    #[serde(default)]
    total_volumes: Vec<(f64, f64)>,
}

pub struct CoinGeckoClient {
    client: reqwest::Client,
    base_url: String,
    throttle: Throttle,
    retry: RetryPolicy,
}

impl CoinGeckoClient {
    pub fn new(base_url: &str, timeout: Duration, throttle: Throttle) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            throttle,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// CoinGecko picks granularity from the requested span: up to one day
    /// returns 5-minute points, so request just enough span for `limit`
    /// points plus a small margin.
    fn days_param(timeframe: Timeframe, limit: usize) -> String {
        let minutes = timeframe.minutes() as f64 * (limit as f64 + 2.0);
        let days = (minutes / 1440.0).max(0.01);
        format!("{:.2}", days)
    }

    async fn fetch(&self, id: &str, timeframe: Timeframe, limit: usize) -> Result<PriceVolumeSeries> {
        self.throttle.wait().await;

        let url = format!(
            "{}/coins/{}/market_chart?vs_currency=usd&days={}",
            self.base_url,
            id,
            Self::days_param(timeframe, limit)
        );
        debug!("CoinGecko request: {}", url);

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::provider(
                "coingecko",
                format!("{} returned {}", id, resp.status()),
            ));
        }
        let chart: MarketChartResponse = resp.json().await?;

        let prices: Vec<f64> = chart.prices.into_iter().map(|(_, p)| p).collect();
        let volumes: Vec<f64> = chart.total_volumes.into_iter().map(|(_, v)| v).collect();

        Ok(PriceVolumeSeries {
            prices: keep_last(prices, limit),
            volumes: keep_last(volumes, limit),
        })
    }
}

#[async_trait]
impl SeriesProvider for CoinGeckoClient {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn get_series(&self, asset_ref: &str, timeframe: Timeframe, limit: usize) -> Vec<f64> {
        self.get_series_with_volume(asset_ref, timeframe, limit)
            .await
            .prices
    }

    async fn get_series_with_volume(
        &self,
        asset_ref: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> PriceVolumeSeries {
        let what = format!("CoinGecko series for {}", asset_ref);
        match with_retry(self.retry, &what, || self.fetch(asset_ref, timeframe, limit)).await {
            Ok(series) => series,
            Err(e) => {
                warn!("{} unavailable: {}", what, e);
                PriceVolumeSeries::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_param_covers_limit() {
        // 5m x 43 points ~ 0.15 days
        assert_eq!(CoinGeckoClient::days_param(Timeframe::M5, 41), "0.15");
        assert_eq!(CoinGeckoClient::days_param(Timeframe::M1, 1), "0.01");
    }

    #[test]
    fn test_parse_market_chart() {
        let json = r#"{
            "prices": [[1700000000000, 100.5], [1700000300000, 101.0]],
            "market_caps": [[1700000000000, 1.0]],
            "total_volumes": [[1700000000000, 5000.0], [1700000300000, 6000.0]]
        }"#;
        let chart: MarketChartResponse = serde_json::from_str(json).unwrap();
        assert_eq!(chart.prices.len(), 2);
        assert_eq!(chart.prices[1].1, 101.0);
        assert_eq!(chart.total_volumes[0].1, 5000.0);
    }
}
