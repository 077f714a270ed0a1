//! Jupiter price API client for spot prices

use crate::error::{Error, Result};
use crate::market::{PriceProvider, Throttle};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct PriceEntry {
    #[serde(rename = "usdPrice")]
    usd_price: Option<f64>,
}

pub struct JupiterPriceClient {
    client: reqwest::Client,
    price_url: String,
    throttle: Throttle,
}

impl JupiterPriceClient {
    pub fn new(price_url: &str, timeout: Duration, throttle: Throttle) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            price_url: price_url.trim_end_matches('/').to_string(),
            throttle,
        })
    }

    async fn fetch(&self, mint: &str) -> Result<f64> {
        self.throttle.wait().await;

        let url = format!("{}?ids={}", self.price_url, mint);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::provider(
                "jupiter-price",
                format!("{} returned {}", mint, resp.status()),
            ));
        }
        let body: HashMap<String, PriceEntry> = resp.json().await?;

        parse_price(&body, mint)
    }
}

fn parse_price(body: &HashMap<String, PriceEntry>, mint: &str) -> Result<f64> {
    body.get(mint)
        .and_then(|entry| entry.usd_price)
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| Error::provider("jupiter-price", format!("no price for {}", mint)))
}

#[async_trait]
impl PriceProvider for JupiterPriceClient {
    async fn current_price(&self, asset_ref: &str) -> Option<f64> {
        match self.fetch(asset_ref).await {
            Ok(price) => {
                debug!("Spot price {}: {}", asset_ref, price);
                Some(price)
            }
            Err(e) => {
                warn!("Spot price for {} unavailable: {}", asset_ref, e);
                None
            }
        }
    }
}
