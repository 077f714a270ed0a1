//! State shared by the analysis loop, the monitor loop and operator commands

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use crate::signal::{AggregateHealthScore, SignalHistory};

/// Latest market health as seen by the monitor loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub raw: f64,
    pub momentum: f64,
    /// raw + momentum * weight; what strategies and trailing read
    pub adjusted: f64,
    pub tradable: bool,
    pub degraded: bool,
    /// `None` until the first analysis cycle
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct EngineState {
    health: RwLock<HealthSnapshot>,
    history: Mutex<SignalHistory>,
    paused: AtomicBool,
}

impl EngineState {
    pub fn new(history_window: usize, momentum_weight: f64) -> Self {
        Self {
            health: RwLock::new(HealthSnapshot::default()),
            history: Mutex::new(SignalHistory::new(history_window, momentum_weight)),
            paused: AtomicBool::new(false),
        }
    }

    /// Fold a new evaluation into the history and publish the snapshot.
    ///
    /// A score the strict policy rejected is published as untradable and
    /// kept out of the momentum history.
    pub fn record_health(&self, score: &AggregateHealthScore) -> HealthSnapshot {
        let now = Utc::now();

        let snapshot = if score.tradable {
            let (momentum, adjusted) = match self.history.lock() {
                Ok(mut history) => {
                    history.record_at(now, score.raw_value);
                    (history.momentum(), history.adjusted(score.raw_value))
                }
                Err(_) => (0.0, score.raw_value),
            };
            HealthSnapshot {
                raw: score.raw_value,
                momentum,
                adjusted,
                tradable: true,
                degraded: score.degraded(),
                updated_at: Some(now),
            }
        } else {
            HealthSnapshot {
                raw: 0.0,
                momentum: 0.0,
                adjusted: 0.0,
                tradable: false,
                degraded: true,
                updated_at: Some(now),
            }
        };

        if let Ok(mut health) = self.health.write() {
            *health = snapshot;
        }
        snapshot
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health.read().map(|h| *h).unwrap_or_default()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Returns the previous value
    pub fn set_paused(&self, paused: bool) -> bool {
        self.paused.swap(paused, Ordering::SeqCst)
    }
}
