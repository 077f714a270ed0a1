//! Process-lifetime counters reported by the heartbeat

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub struct Metrics {
    started_at: DateTime<Utc>,
    analysis_cycles: AtomicU64,
    api_calls: AtomicU64,
    api_failures: AtomicU64,
    trades_opened: AtomicU64,
    trades_closed: AtomicU64,
    realized_pnl: Mutex<f64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            analysis_cycles: AtomicU64::new(0),
            api_calls: AtomicU64::new(0),
            api_failures: AtomicU64::new(0),
            trades_opened: AtomicU64::new(0),
            trades_closed: AtomicU64::new(0),
            realized_pnl: Mutex::new(0.0),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the new cycle count
    pub fn record_cycle(&self) -> u64 {
        self.analysis_cycles.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_api_call(&self, ok: bool) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.api_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_open(&self) {
        self.trades_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_close(&self, pnl: f64) {
        self.trades_closed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut total) = self.realized_pnl.lock() {
            *total += pnl;
        }
    }

    pub fn cycles(&self) -> u64 {
        self.analysis_cycles.load(Ordering::Relaxed)
    }

    pub fn trades_opened(&self) -> u64 {
        self.trades_opened.load(Ordering::Relaxed)
    }

    pub fn trades_closed(&self) -> u64 {
        self.trades_closed.load(Ordering::Relaxed)
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl.lock().map(|v| *v).unwrap_or(0.0)
    }

    /// Percentage of successful API calls; 100 before any call
    pub fn api_success_rate(&self) -> f64 {
        let calls = self.api_calls.load(Ordering::Relaxed);
        if calls == 0 {
            return 100.0;
        }
        let failures = self.api_failures.load(Ordering::Relaxed);
        (calls - failures) as f64 / calls as f64 * 100.0
    }
}
