//! GeckoTerminal OHLCV client: per-pool candles with volume

use crate::error::{Error, Result};
use crate::market::retry::{with_retry, RetryPolicy};
use crate::market::{keep_last, PriceVolumeSeries, SeriesProvider, Throttle, Timeframe};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct OhlcvResponse {
    data: OhlcvData,
}

#[derive(Debug, Deserialize)]
struct OhlcvData {
    attributes: OhlcvAttributes,
}

#[derive(Debug, Deserialize)]
struct OhlcvAttributes {
    /// [timestamp, open, high, low, close, volume], newest first
    #[serde(default)]
    ohlcv_list: Vec<[f64; 6]>,
}

pub struct GeckoTerminalClient {
    client: reqwest::Client,
    base_url: String,
    network: String,
    throttle: Throttle,
    retry: RetryPolicy,
}

impl GeckoTerminalClient {
    pub fn new(base_url: &str, network: &str, timeout: Duration, throttle: Throttle) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            network: network.to_string(),
            throttle,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Map a timeframe to the (period, aggregate) pair the API expects
    fn period(timeframe: Timeframe) -> (&'static str, u32) {
        match timeframe {
            Timeframe::M1 => ("minute", 1),
            Timeframe::M5 => ("minute", 5),
            Timeframe::M15 => ("minute", 15),
            Timeframe::H1 => ("hour", 1),
            Timeframe::H4 => ("hour", 4),
            Timeframe::D1 => ("day", 1),
        }
    }

    async fn fetch(&self, pool: &str, timeframe: Timeframe, limit: usize) -> Result<PriceVolumeSeries> {
        self.throttle.wait().await;

        let (period, aggregate) = Self::period(timeframe);
        let url = format!(
            "{}/networks/{}/pools/{}/ohlcv/{}?aggregate={}&limit={}&currency=usd",
            self.base_url, self.network, pool, period, aggregate, limit
        );
        debug!("GeckoTerminal request: {}", url);

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::provider(
                "geckoterminal",
                format!("pool {} returned {}", pool, resp.status()),
            ));
        }
        let body: OhlcvResponse = resp.json().await?;

        Ok(Self::to_series(body.data.attributes.ohlcv_list, limit))
    }

    fn to_series(mut candles: Vec<[f64; 6]>, limit: usize) -> PriceVolumeSeries {
        candles.sort_by(|a, b| a[0].total_cmp(&b[0]));
        let candles = keep_last(candles, limit);

        PriceVolumeSeries {
            prices: candles.iter().map(|c| c[4]).collect(),
            volumes: candles.iter().map(|c| c[5]).collect(),
        }
    }
}

#[async_trait]
impl SeriesProvider for GeckoTerminalClient {
    fn name(&self) -> &str {
        "geckoterminal"
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
        let what = format!("GeckoTerminal OHLCV for pool {}", asset_ref);
        match with_retry(self.retry, &what, || self.fetch(asset_ref, timeframe, limit)).await {
            Ok(series) => series,
            Err(e) => {
                warn!("{} unavailable: {}", what, e);
                PriceVolumeSeries::default()
            }
        }
    }
}
