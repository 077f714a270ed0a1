//! Market health: weighted distance of reference assets from their trend average
//!
//! Each reference asset contributes `weight * (price - SMA) / SMA * 100`.
//! Weights are used as configured, without normalization. Under the default
//! [`FailurePolicy::Degrade`] an asset whose series is missing or too short
//! contributes 0% and the rest still count; [`FailurePolicy::Strict`] zeroes
//! the whole score and marks the cycle untradable instead.

use crate::market::{SeriesProvider, Timeframe};
use crate::signal::indicators::{distance_pct, sma};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Reaction to a reference asset without usable data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Missing asset contributes 0%, others still count
    #[default]
    Degrade,
    /// Any missing asset zeroes the score and skips trading
    Strict,
}

/// A reference asset in the health basket
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthAssetConfig {
    /// Display name ("BTC")
    pub name: String,
    /// Provider identifier ("bitcoin")
    pub id: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketHealthConfig {
    #[serde(default = "default_health_assets")]
    pub assets: Vec<HealthAssetConfig>,
    /// SMA period; also the minimum number of points an asset needs
    #[serde(default = "default_indicator_period")]
    pub indicator_period: usize,
    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,
    /// Points requested from the provider
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Samples kept for momentum
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_momentum_weight")]
    pub momentum_weight: f64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for MarketHealthConfig {
    fn default() -> Self {
        Self {
            assets: default_health_assets(),
            indicator_period: default_indicator_period(),
            timeframe: default_timeframe(),
            history_limit: default_history_limit(),
            history_window: default_history_window(),
            momentum_weight: default_momentum_weight(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

fn default_health_assets() -> Vec<HealthAssetConfig> {
    [("BTC", "bitcoin", 0.25), ("ETH", "ethereum", 0.25), ("SOL", "solana", 0.50)]
        .into_iter()
        .map(|(name, id, weight)| HealthAssetConfig {
            name: name.into(),
            id: id.into(),
            weight,
        })
        .collect()
}

fn default_indicator_period() -> usize {
    20
}

fn default_timeframe() -> Timeframe {
    Timeframe::M5
}

fn default_history_limit() -> usize {
    43
}

fn default_history_window() -> usize {
    2
}

fn default_momentum_weight() -> f64 {
    2.0
}

impl MarketHealthConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.assets.is_empty() {
            anyhow::bail!("market_health.assets must not be empty");
        }
        for asset in &self.assets {
            if asset.weight <= 0.0 || !asset.weight.is_finite() {
                anyhow::bail!("market_health weight for {} must be positive", asset.name);
            }
            if asset.id.is_empty() {
                anyhow::bail!("market_health asset {} has no provider id", asset.name);
            }
        }
        if self.indicator_period == 0 {
            anyhow::bail!("market_health.indicator_period must be at least 1");
        }
        if self.history_limit < self.indicator_period {
            anyhow::bail!(
                "market_health.history_limit ({}) must cover indicator_period ({})",
                self.history_limit,
                self.indicator_period
            );
        }
        if self.history_window == 0 {
            anyhow::bail!("market_health.history_window must be at least 1");
        }
        if !self.momentum_weight.is_finite() {
            anyhow::bail!("market_health.momentum_weight must be finite");
        }
        Ok(())
    }
}

/// One asset's share of the aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetContribution {
    pub asset_id: String,
    pub weight: f64,
    pub distance_pct: f64,
    /// False when the asset had no usable data this cycle
    pub available: bool,
}

/// Result of one health evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateHealthScore {
    pub raw_value: f64,
    pub contributions: Vec<AssetContribution>,
    /// False only when the strict policy rejected the cycle
    pub tradable: bool,
}

impl AggregateHealthScore {
    pub fn degraded(&self) -> bool {
        self.contributions.iter().any(|c| !c.available)
    }

    pub fn available_count(&self) -> usize {
        self.contributions.iter().filter(|c| c.available).count()
    }
}

/// Computes the aggregate score from a series provider
pub struct MarketHealthEvaluator {
    provider: Arc<dyn SeriesProvider>,
    config: MarketHealthConfig,
}

impl MarketHealthEvaluator {
    pub fn new(provider: Arc<dyn SeriesProvider>, config: MarketHealthConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &MarketHealthConfig {
        &self.config
    }

    /// Evaluate the configured basket
    pub async fn evaluate(&self) -> AggregateHealthScore {
        self.evaluate_assets(&self.config.assets).await
    }

    /// Evaluate an explicit basket
    pub async fn evaluate_assets(&self, assets: &[HealthAssetConfig]) -> AggregateHealthScore {
        let mut contributions = Vec::with_capacity(assets.len());

        // Sequential: the provider is throttled anyway
        for asset in assets {
            let series = self
                .provider
                .get_series(&asset.id, self.config.timeframe, self.config.history_limit)
                .await;

            let reading = self.reading(asset, &series);
            contributions.push(AssetContribution {
                asset_id: asset.id.clone(),
                weight: asset.weight,
                distance_pct: reading.unwrap_or(0.0),
                available: reading.is_some(),
            });
        }

        let any_missing = contributions.iter().any(|c| !c.available);
        if any_missing && self.config.failure_policy == FailurePolicy::Strict {
            warn!("Market health: strict policy, missing data -> score 0, trading skipped");
            return AggregateHealthScore {
                raw_value: 0.0,
                contributions,
                tradable: false,
            };
        }

        let raw_value = contributions
            .iter()
            .map(|c| c.weight * c.distance_pct)
            .sum();

        AggregateHealthScore {
            raw_value,
            contributions,
            tradable: true,
        }
    }

    fn reading(&self, asset: &HealthAssetConfig, series: &[f64]) -> Option<f64> {
        let period = self.config.indicator_period;
        if series.len() < period {
            warn!(
                "{}: insufficient data ({}/{} points), degraded mode - using 0%",
                asset.name,
                series.len(),
                period
            );
            return None;
        }

        let price = *series.last()?;
        let average = sma(series, period)?;
        let distance = distance_pct(price, average)?;

        info!(
            "{}: price={:.2} SMA({})={:.2} distance={:+.2}%",
            asset.name, price, period, average, distance
        );
        Some(distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::PriceVolumeSeries;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FixedSeries(HashMap<String, Vec<f64>>);

    #[async_trait]
    impl SeriesProvider for FixedSeries {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn get_series(&self, asset_ref: &str, _tf: Timeframe, _limit: usize) -> Vec<f64> {
            self.0.get(asset_ref).cloned().unwrap_or_default()
        }

        async fn get_series_with_volume(
            &self,
            asset_ref: &str,
            tf: Timeframe,
            limit: usize,
        ) -> PriceVolumeSeries {
            PriceVolumeSeries {
                prices: self.get_series(asset_ref, tf, limit).await,
                volumes: Vec::new(),
            }
        }
    }

    /// Series of `period` points whose SMA is 100 and last price is `last`
    fn series_ending_at(last: f64, period: usize) -> Vec<f64> {
        let fill = (100.0 * period as f64 - last) / (period as f64 - 1.0);
        let mut values = vec![fill; period - 1];
        values.push(last);
        values
    }

    fn config(policy: FailurePolicy) -> MarketHealthConfig {
        MarketHealthConfig {
            indicator_period: 4,
            history_limit: 4,
            failure_policy: policy,
            ..Default::default()
        }
    }

    fn provider(with_eth: bool) -> Arc<dyn SeriesProvider> {
        let mut data = HashMap::new();
        data.insert("bitcoin".to_string(), series_ending_at(104.0, 4));
        data.insert("solana".to_string(), series_ending_at(98.0, 4));
        if with_eth {
            data.insert("ethereum".to_string(), series_ending_at(110.0, 4));
        } else {
            data.insert("ethereum".to_string(), vec![1.0, 2.0]);
        }
        Arc::new(FixedSeries(data))
    }

    #[tokio::test]
    async fn test_weighted_sum_of_distances() {
        let evaluator = MarketHealthEvaluator::new(provider(true), config(FailurePolicy::Degrade));
        let score = evaluator.evaluate().await;

        // 0.25*4 + 0.25*10 + 0.5*(-2)
        assert!((score.raw_value - 2.5).abs() < 1e-9);
        assert!(score.tradable);
        assert!(!score.degraded());
    }

    #[tokio::test]
    async fn test_one_failed_asset_degrades_to_zero_contribution() {
        let evaluator = MarketHealthEvaluator::new(provider(false), config(FailurePolicy::Degrade));
        let score = evaluator.evaluate().await;

        // ETH contributes 0%, BTC and SOL still count
        assert!((score.raw_value - 0.0).abs() < 1e-9);
        assert!(score.tradable);
        assert!(score.degraded());
        assert_eq!(score.available_count(), 2);

        let eth = score
            .contributions
            .iter()
            .find(|c| c.asset_id == "ethereum")
            .unwrap();
        assert!(!eth.available);
        assert_eq!(eth.distance_pct, 0.0);

        let btc = score
            .contributions
            .iter()
            .find(|c| c.asset_id == "bitcoin")
            .unwrap();
        assert!((btc.distance_pct - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_strict_policy_zeroes_score() {
        let evaluator = MarketHealthEvaluator::new(provider(false), config(FailurePolicy::Strict));
        let score = evaluator.evaluate().await;

        assert_eq!(score.raw_value, 0.0);
        assert!(!score.tradable);
    }

    #[test]
    fn test_validate_rejects_non_positive_weight() {
        let mut cfg = MarketHealthConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.assets[0].weight = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_failure_policy_deserialize() {
        let policy: FailurePolicy = serde_json::from_str(r#""strict""#).unwrap();
        assert_eq!(policy, FailurePolicy::Strict);
    }
}
