//! Rolling history of market-health readings
//!
//! Keeps the last N analysis-cycle readings and derives momentum (the
//! average first difference across the window) so the raw score can be
//! nudged toward where it is heading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A single periodic reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Bounded FIFO of samples, oldest first
#[derive(Debug, Clone)]
pub struct SignalHistory {
    samples: VecDeque<SignalSample>,
    capacity: usize,
    momentum_weight: f64,
}

impl SignalHistory {
    /// Create a history holding at most `capacity` samples.
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize, momentum_weight: f64) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            momentum_weight,
        }
    }

    /// Append a reading taken now
    pub fn record(&mut self, value: f64) {
        self.record_at(Utc::now(), value);
    }

    /// Append a reading with an explicit timestamp.
    ///
    /// Samples older than the newest one are clamped forward so the
    /// window stays ordered.
    pub fn record_at(&mut self, timestamp: DateTime<Utc>, value: f64) {
        let timestamp = match self.samples.back() {
            Some(last) if timestamp < last.timestamp => last.timestamp,
            _ => timestamp,
        };

        self.samples.push_back(SignalSample { timestamp, value });
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Average of consecutive differences; 0 with fewer than two samples
    pub fn momentum(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }

        let total: f64 = self
            .samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .map(|(prev, next)| next.value - prev.value)
            .sum();

        total / (self.samples.len() - 1) as f64
    }

    /// Raw value shifted by weighted momentum
    pub fn adjusted(&self, raw: f64) -> f64 {
        raw + self.momentum() * self.momentum_weight
    }

    pub fn latest(&self) -> Option<&SignalSample> {
        self.samples.back()
    }

    pub fn samples(&self) -> impl Iterator<Item = &SignalSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn momentum_weight(&self) -> f64 {
        self.momentum_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_momentum_zero_for_short_windows() {
        let mut history = SignalHistory::new(3, 2.0);
        assert_eq!(history.momentum(), 0.0);

        history.record(5.0);
        assert_eq!(history.momentum(), 0.0);
        assert!(approx(history.adjusted(5.0), 5.0));
    }

    #[test]
    fn test_momentum_is_average_first_difference() {
        let mut history = SignalHistory::new(3, 2.0);
        history.record(1.0);
        history.record(4.0);
        history.record(2.0);
        // ((4-1) + (2-4)) / 2
        assert!(approx(history.momentum(), 0.5));
    }

    #[test]
    fn test_two_sample_adjustment() {
        let mut history = SignalHistory::new(2, 2.0);
        history.record(1.0);
        history.record(0.5);

        assert!(approx(history.momentum(), -0.5));
        assert!(approx(history.adjusted(0.5), -0.5));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = SignalHistory::new(2, 1.0);
        history.record(10.0);
        history.record(1.0);
        history.record(2.0);

        assert_eq!(history.len(), 2);
        let values: Vec<f64> = history.samples().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);
        assert!(approx(history.momentum(), 1.0));
    }

    #[test]
    fn test_capacity_one_never_divides_by_zero() {
        let mut history = SignalHistory::new(1, 2.0);
        history.record(3.0);
        history.record(7.0);
        assert_eq!(history.len(), 1);
        assert_eq!(history.momentum(), 0.0);

        let mut degenerate = SignalHistory::new(0, 2.0);
        degenerate.record(1.0);
        assert_eq!(degenerate.capacity(), 1);
        assert_eq!(degenerate.momentum(), 0.0);
    }

    #[test]
    fn test_samples_stay_ordered() {
        let mut history = SignalHistory::new(3, 1.0);
        let now = Utc::now();
        history.record_at(now, 1.0);
        history.record_at(now - chrono::Duration::seconds(60), 2.0);

        let stamps: Vec<_> = history.samples().map(|s| s.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }
}
