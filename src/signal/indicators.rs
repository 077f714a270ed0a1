//! Technical indicators over plain price/volume slices
//!
//! All functions take series ordered oldest first and return the value for
//! the most recent point, or `None` when the series is too short or the
//! computation would divide by zero. [`volume_ratio`] reports which of the
//! two happened.

/// Simple moving average of the last `period` values
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let window = &values[values.len() - period..];
    if window.iter().any(|v| !v.is_finite()) {
        return None;
    }

    Some(window.iter().sum::<f64>() / period as f64)
}

/// Relative Strength Index with Wilder smoothing.
///
/// Seeds average gain/loss from the first `period` changes, then smooths
/// across the rest of the series. Needs at least `period + 1` values.
/// No movement at all reads as 50; only gains reads as 100.
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }
    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let changes: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for &change in &changes[..period] {
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    let n = period as f64;
    for &change in &changes[period..] {
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (n - 1.0) + gain) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss) / n;
    }

    Some(rsi_from_averages(avg_gain, avg_loss))
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Distance of `price` from `average`, in percent
pub fn distance_pct(price: f64, average: f64) -> Option<f64> {
    if average == 0.0 || !average.is_finite() || !price.is_finite() {
        return None;
    }
    Some((price - average) / average * 100.0)
}

/// Average period-over-period percentage change.
///
/// Pairs whose previous price is not positive are skipped; `None` when no
/// usable pair remains.
pub fn average_pct_change(prices: &[f64]) -> Option<f64> {
    let changes: Vec<f64> = prices
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1].is_finite())
        .map(|w| (w[1] - w[0]) / w[0] * 100.0)
        .collect();

    if changes.is_empty() {
        return None;
    }

    Some(changes.iter().sum::<f64>() / changes.len() as f64)
}

/// Why a volume ratio could not be computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeGap {
    TooShort { have: usize, needed: usize },
    /// Baseline window traded nothing
    NoBaseline,
}

/// Mean of the last `recent` volumes over the mean of the `2 * recent`
/// volumes before them.
pub fn volume_ratio(volumes: &[f64], recent: usize) -> Result<f64, VolumeGap> {
    let needed = recent * 3;
    if recent == 0 || volumes.len() < needed {
        return Err(VolumeGap::TooShort {
            have: volumes.len(),
            needed: needed.max(1),
        });
    }

    let tail = &volumes[volumes.len() - needed..];
    let (previous, latest) = tail.split_at(recent * 2);

    let previous_avg = previous.iter().sum::<f64>() / previous.len() as f64;
    let latest_avg = latest.iter().sum::<f64>() / latest.len() as f64;

    if previous_avg <= 0.0 || !previous_avg.is_finite() {
        return Err(VolumeGap::NoBaseline);
    }

    Ok(latest_avg / previous_avg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() < tol,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_sma_uses_last_period() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_approx(sma(&values, 3).unwrap(), 4.0, 1e-12);
        assert_approx(sma(&values, 5).unwrap(), 3.0, 1e-12);
        assert!(sma(&values, 6).is_none());
        assert!(sma(&values, 0).is_none());
    }

    #[test]
    fn test_rsi_extremes() {
        let rising = [100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
        assert_approx(rsi(&rising, 3).unwrap(), 100.0, 1e-9);

        let falling = [105.0, 104.0, 103.0, 102.0, 101.0, 100.0];
        assert_approx(rsi(&falling, 3).unwrap(), 0.0, 1e-9);

        let flat = [5.0; 6];
        assert_approx(rsi(&flat, 3).unwrap(), 50.0, 1e-9);
    }

    #[test]
    fn test_rsi_seed_value() {
        // Changes: +0.34, -0.25, -0.48 -> gains 0.34, losses 0.73
        let values = [44.0, 44.34, 44.09, 43.61];
        let expected = 100.0 - 100.0 / (1.0 + 0.34 / 0.73);
        assert_approx(rsi(&values, 3).unwrap(), expected, 1e-9);
    }

    #[test]
    fn test_rsi_bounds_and_length() {
        let values = [100.0, 105.0, 98.0, 110.0, 95.0, 115.0, 90.0, 120.0];
        let value = rsi(&values, 3).unwrap();
        assert!((0.0..=100.0).contains(&value));
        assert!(rsi(&values[..3], 3).is_none());
    }

    #[test]
    fn test_distance_pct() {
        assert_approx(distance_pct(110.0, 100.0).unwrap(), 10.0, 1e-12);
        assert_approx(distance_pct(95.0, 100.0).unwrap(), -5.0, 1e-12);
        assert!(distance_pct(1.0, 0.0).is_none());
    }

    #[test]
    fn test_average_pct_change() {
        // +10%, -10%
        let prices = [100.0, 110.0, 99.0];
        assert_approx(average_pct_change(&prices).unwrap(), 0.0, 1e-9);
        assert!(average_pct_change(&[1.0]).is_none());
        assert!(average_pct_change(&[0.0, 1.0]).is_none());
    }

    #[test]
    fn test_volume_ratio() {
        let mut volumes = vec![10.0; 10];
        volumes.extend([20.0; 5]);
        assert_approx(volume_ratio(&volumes, 5).unwrap(), 2.0, 1e-12);

        // Only the trailing 3k values matter
        let mut padded = vec![1000.0; 4];
        padded.extend(&volumes);
        assert_approx(volume_ratio(&padded, 5).unwrap(), 2.0, 1e-12);

        assert_eq!(
            volume_ratio(&volumes[..14], 5),
            Err(VolumeGap::TooShort { have: 14, needed: 15 })
        );
    }

    #[test]
    fn test_volume_ratio_without_baseline() {
        assert_eq!(volume_ratio(&[0.0; 15], 5), Err(VolumeGap::NoBaseline));

        // Fresh pool: nothing traded before the recent burst
        let mut fresh = vec![0.0; 10];
        fresh.extend([50.0; 5]);
        assert_eq!(volume_ratio(&fresh, 5), Err(VolumeGap::NoBaseline));
    }
}
