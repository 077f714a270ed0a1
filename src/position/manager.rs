//! Position management
//!
//! Owns every open position. A position moves OPENED -> TRAILING_ARMED ->
//! CLOSED; the stop-loss can close it from either open state, the trailing
//! stop only once armed. All read-modify-write on a position happens under
//! one write-lock acquisition, and each mutation is persisted before the
//! caller gets to notify anyone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::position::store::PositionStore;
use crate::position::trailing::{trail_stop_price, ExitConfig};

/// A single open position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Process-unique, monotonic
    pub id: u64,
    /// Traded asset mint
    pub asset: String,
    /// Entry price in quote currency per token
    pub entry_price: f64,
    /// Quote currency spent
    pub notional: f64,
    pub opened_at: DateTime<Utc>,
    /// Never decreases
    pub highest_price: f64,
    pub trailing_armed: bool,
    /// Entry transaction signature
    #[serde(default)]
    pub entry_signature: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Opened,
    TrailingArmed,
}

impl Position {
    pub fn state(&self) -> PositionState {
        if self.trailing_armed {
            PositionState::TrailingArmed
        } else {
            PositionState::Opened
        }
    }

    /// P&L at `price`, in percent
    pub fn pnl_pct(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price * 100.0
    }

    /// P&L at `price`, in quote currency
    pub fn pnl_value(&self, price: f64) -> f64 {
        self.notional * self.pnl_pct(price) / 100.0
    }

    /// Current trailing stop level, if armed
    pub fn trailing_stop(&self, trail_pct: f64) -> Option<f64> {
        self.trailing_armed
            .then(|| trail_stop_price(self.highest_price, trail_pct))
    }

    /// P&L in percent if the trailing stop fills exactly
    pub fn pnl_pct_at_stop(&self, trail_pct: f64) -> Option<f64> {
        self.trailing_stop(trail_pct).map(|stop| self.pnl_pct(stop))
    }

    /// How far `price` sits below the highest seen, in percent
    pub fn drawdown_from_high_pct(&self, price: f64) -> f64 {
        if self.highest_price <= 0.0 {
            return 0.0;
        }
        (self.highest_price - price) / self.highest_price * 100.0
    }
}

/// Why a position should be closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TrailingStopHit,
    StopLossHit,
    /// Operator-initiated
    Manual,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TrailingStopHit => write!(f, "TRAILING_STOP_HIT"),
            ExitReason::StopLossHit => write!(f, "STOP_LOSS_HIT"),
            ExitReason::Manual => write!(f, "MANUAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitSignal {
    pub reason: ExitReason,
    /// Stop level that was breached
    pub trigger_price: f64,
}

/// Result of one reprice
#[derive(Debug, Clone)]
pub struct RepriceOutcome {
    /// Snapshot after the update
    pub position: Position,
    pub exit: Option<ExitSignal>,
    pub new_high: bool,
    pub armed_now: bool,
    pub trail_pct: f64,
    pub trail_stop: Option<f64>,
}

/// Position manager
pub struct PositionManager {
    positions: RwLock<HashMap<u64, Position>>,
    next_id: AtomicU64,
    /// Ids with a sell in flight
    closing: StdMutex<HashSet<u64>>,
    exit: ExitConfig,
    store: Option<PositionStore>,
    /// Serializes snapshot + write so saves land in order
    save_lock: Mutex<()>,
}

impl PositionManager {
    /// Create a manager; `store` of `None` keeps positions in memory only
    pub fn new(exit: ExitConfig, store: Option<PositionStore>) -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closing: StdMutex::new(HashSet::new()),
            exit,
            store,
            save_lock: Mutex::new(()),
        }
    }

    pub fn exit_config(&self) -> &ExitConfig {
        &self.exit
    }

    /// Load persisted positions, returning how many were restored
    pub async fn load(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let loaded = store.load().await?;
        let max_id = loaded.iter().map(|p| p.id).max().unwrap_or(0);

        let mut positions = self.positions.write().await;
        positions.clear();
        for position in loaded {
            positions.insert(position.id, position);
        }
        let count = positions.len();
        drop(positions);

        self.next_id.fetch_max(max_id + 1, Ordering::SeqCst);
        info!("Loaded {} positions from {}", count, store.path().display());
        Ok(count)
    }

    /// Persist the current snapshot
    pub async fn save(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let _guard = self.save_lock.lock().await;
        let mut snapshot: Vec<Position> = self.positions.read().await.values().cloned().collect();
        snapshot.sort_by_key(|p| p.id);

        store.save(&snapshot).await?;
        debug!("Saved {} positions", snapshot.len());
        Ok(())
    }

    /// Open a position after a confirmed buy
    pub async fn open(
        &self,
        asset: &str,
        entry_price: f64,
        notional: f64,
        entry_signature: Option<String>,
    ) -> Result<Position> {
        if !(entry_price.is_finite() && entry_price > 0.0) {
            return Err(Error::validation("entry_price", format!("{} is not a positive price", entry_price)));
        }
        if !(notional.is_finite() && notional > 0.0) {
            return Err(Error::validation("notional", format!("{} is not a positive amount", notional)));
        }

        let position = Position {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            asset: asset.to_string(),
            entry_price,
            notional,
            opened_at: Utc::now(),
            highest_price: entry_price,
            trailing_armed: self.exit.should_arm(entry_price, entry_price),
            entry_signature,
        };

        self.positions
            .write()
            .await
            .insert(position.id, position.clone());

        info!(
            "Opened position #{} in {} at {} ({} quote)",
            position.id, asset, entry_price, notional
        );

        self.save().await?;
        Ok(position)
    }

    /// Feed a new price; returns `None` when the position no longer exists
    pub async fn reprice(&self, id: u64, price: f64, health: f64) -> Result<Option<RepriceOutcome>> {
        if !(price.is_finite() && price > 0.0) {
            return Err(Error::validation("price", format!("{} is not a positive price", price)));
        }

        let trail_pct = self.exit.trailing.pct_for(health);

        let outcome = {
            let mut positions = self.positions.write().await;
            let Some(position) = positions.get_mut(&id) else {
                return Ok(None);
            };

            let mut new_high = false;
            if price > position.highest_price {
                position.highest_price = price;
                new_high = true;
            }

            let mut armed_now = false;
            if !position.trailing_armed && self.exit.should_arm(position.entry_price, price) {
                position.trailing_armed = true;
                position.highest_price = position.highest_price.max(price).max(position.entry_price);
                armed_now = true;
            }

            let trail_stop = position.trailing_stop(trail_pct);
            let exit = match (trail_stop, self.exit.stop_loss_price(position.entry_price)) {
                (Some(stop), _) if price < stop => Some(ExitSignal {
                    reason: ExitReason::TrailingStopHit,
                    trigger_price: stop,
                }),
                (_, Some(stop)) if price <= stop => Some(ExitSignal {
                    reason: ExitReason::StopLossHit,
                    trigger_price: stop,
                }),
                _ => None,
            };

            RepriceOutcome {
                position: position.clone(),
                exit,
                new_high,
                armed_now,
                trail_pct,
                trail_stop,
            }
        };

        if outcome.armed_now {
            info!(
                "Position #{} trailing armed at {} (trail {:.2}%)",
                id, price, trail_pct
            );
        }
        if outcome.new_high || outcome.armed_now {
            self.save().await?;
        }

        Ok(Some(outcome))
    }

    /// Claim the exclusive right to sell `id`.
    ///
    /// Returns false when the position is gone or another sell holds it.
    pub async fn begin_close(&self, id: u64) -> bool {
        if !self.positions.read().await.contains_key(&id) {
            return false;
        }
        match self.closing.lock() {
            Ok(mut closing) => closing.insert(id),
            Err(_) => false,
        }
    }

    /// Give up a claim after a failed sell
    pub fn release_close(&self, id: u64) {
        if let Ok(mut closing) = self.closing.lock() {
            closing.remove(&id);
        }
    }

    pub fn is_closing(&self, id: u64) -> bool {
        self.closing
            .lock()
            .map(|closing| closing.contains(&id))
            .unwrap_or(false)
    }

    /// Remove a position. Closing an absent id is a no-op.
    pub async fn close(&self, id: u64) -> Result<Option<Position>> {
        let removed = self.positions.write().await.remove(&id);
        self.release_close(id);

        match &removed {
            Some(position) => {
                info!("Closed position #{} in {}", id, position.asset);
                self.save().await?;
            }
            None => debug!("Close of #{} ignored, not open", id),
        }

        Ok(removed)
    }

    pub async fn get(&self, id: u64) -> Option<Position> {
        self.positions.read().await.get(&id).cloned()
    }

    /// All open positions, oldest first
    pub async fn all(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.read().await.values().cloned().collect();
        positions.sort_by_key(|p| p.id);
        positions
    }

    pub async fn find_by_asset(&self, asset: &str) -> Option<Position> {
        self.positions
            .read()
            .await
            .values()
            .filter(|p| p.asset == asset)
            .min_by_key(|p| p.id)
            .cloned()
    }

    pub async fn has_asset(&self, asset: &str) -> bool {
        self.positions.read().await.values().any(|p| p.asset == asset)
    }

    pub async fn count(&self) -> usize {
        self.positions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::trailing::{ArmingPolicy, TrailingConfig};

    fn exit_config(trail_pct: f64, stop_loss_pct: Option<f64>) -> ExitConfig {
        ExitConfig {
            trailing: TrailingConfig {
                fixed_pct: trail_pct,
                ..Default::default()
            },
            stop_loss_pct,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_trailing_stop_scenario() {
        let manager = PositionManager::new(exit_config(2.5, None), None);
        let position = manager.open("JUP", 100.0, 50.0, None).await.unwrap();
        assert_eq!(position.state(), PositionState::TrailingArmed);

        let out = manager.reprice(position.id, 100.0, 0.0).await.unwrap().unwrap();
        assert!(out.exit.is_none());

        let out = manager.reprice(position.id, 110.0, 0.0).await.unwrap().unwrap();
        assert!(out.new_high);
        assert!((out.trail_stop.unwrap() - 107.25).abs() < 1e-9);
        assert!(out.exit.is_none());

        let out = manager.reprice(position.id, 108.0, 0.0).await.unwrap().unwrap();
        assert!(out.exit.is_none());
        assert_eq!(out.position.highest_price, 110.0);

        let out = manager.reprice(position.id, 96.0, 0.0).await.unwrap().unwrap();
        let exit = out.exit.unwrap();
        assert_eq!(exit.reason, ExitReason::TrailingStopHit);
        assert!((exit.trigger_price - 107.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_highest_price_never_decreases() {
        let manager = PositionManager::new(exit_config(50.0, None), None);
        let position = manager.open("JUP", 10.0, 5.0, None).await.unwrap();

        let mut last_high = position.highest_price;
        for price in [11.0, 9.0, 12.0, 8.0, 12.5, 7.0] {
            let out = manager.reprice(position.id, price, 0.0).await.unwrap().unwrap();
            assert!(out.position.highest_price >= last_high);
            last_high = out.position.highest_price;
        }
        assert_eq!(last_high, 12.5);
    }

    #[tokio::test]
    async fn test_stop_loss_fires_before_arming() {
        let mut config = exit_config(2.0, Some(3.0));
        config.arming = ArmingPolicy::OnActivation;
        config.activation_pct = 5.0;

        let manager = PositionManager::new(config, None);
        let position = manager.open("WIF", 100.0, 10.0, None).await.unwrap();
        assert_eq!(position.state(), PositionState::Opened);

        // Dip below trail distance but above stop-loss: no trailing exit while unarmed
        let out = manager.reprice(position.id, 98.0, 0.0).await.unwrap().unwrap();
        assert!(out.exit.is_none());
        assert!(out.trail_stop.is_none());

        let out = manager.reprice(position.id, 96.5, 0.0).await.unwrap().unwrap();
        assert_eq!(out.exit.unwrap().reason, ExitReason::StopLossHit);
    }

    #[tokio::test]
    async fn test_lazy_activation_arms_once() {
        let mut config = exit_config(2.0, None);
        config.arming = ArmingPolicy::OnActivation;
        config.activation_pct = 5.0;

        let manager = PositionManager::new(config, None);
        let position = manager.open("WIF", 100.0, 10.0, None).await.unwrap();

        let out = manager.reprice(position.id, 106.0, 0.0).await.unwrap().unwrap();
        assert!(out.armed_now);
        assert_eq!(out.position.state(), PositionState::TrailingArmed);

        let out = manager.reprice(position.id, 107.0, 0.0).await.unwrap().unwrap();
        assert!(!out.armed_now);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let manager = PositionManager::new(ExitConfig::default(), None);
        let position = manager.open("BONK", 0.00002, 10.0, None).await.unwrap();

        assert!(manager.close(position.id).await.unwrap().is_some());
        assert!(manager.close(position.id).await.unwrap().is_none());
        assert!(manager.close(999).await.unwrap().is_none());
        assert_eq!(manager.count().await, 0);
        assert!(manager.reprice(position.id, 1.0, 0.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_begin_close_is_exclusive() {
        let manager = PositionManager::new(ExitConfig::default(), None);
        let position = manager.open("JTO", 2.0, 10.0, None).await.unwrap();

        assert!(manager.begin_close(position.id).await);
        assert!(!manager.begin_close(position.id).await);

        manager.release_close(position.id);
        assert!(manager.begin_close(position.id).await);

        manager.close(position.id).await.unwrap();
        assert!(!manager.is_closing(position.id));
        assert!(!manager.begin_close(position.id).await);
    }

    #[tokio::test]
    async fn test_persist_and_reload_keeps_ids_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");

        let manager = PositionManager::new(ExitConfig::default(), Some(PositionStore::new(&path)));
        let first = manager.open("JUP", 1.0, 10.0, Some("sig1".into())).await.unwrap();
        let second = manager.open("WIF", 2.0, 10.0, None).await.unwrap();
        manager.reprice(second.id, 2.5, 0.0).await.unwrap();
        manager.close(first.id).await.unwrap();

        let restored = PositionManager::new(ExitConfig::default(), Some(PositionStore::new(&path)));
        assert_eq!(restored.load().await.unwrap(), 1);

        let loaded = restored.get(second.id).await.unwrap();
        assert_eq!(loaded.highest_price, 2.5);

        let third = restored.open("BONK", 1.0, 10.0, None).await.unwrap();
        assert!(third.id > second.id);
    }

    #[tokio::test]
    async fn test_reprice_rejects_bad_price() {
        let manager = PositionManager::new(ExitConfig::default(), None);
        let position = manager.open("JUP", 1.0, 10.0, None).await.unwrap();
        let err = manager.reprice(position.id, 0.0, 0.0).await.unwrap_err();
        assert!(err.is_validation());
        assert!(manager.open("JUP", -1.0, 10.0, None).await.is_err());
    }

    #[test]
    fn test_pnl_helpers() {
        let position = Position {
            id: 1,
            asset: "JUP".into(),
            entry_price: 100.0,
            notional: 200.0,
            opened_at: Utc::now(),
            highest_price: 120.0,
            trailing_armed: true,
            entry_signature: None,
        };

        assert!((position.pnl_pct(110.0) - 10.0).abs() < 1e-9);
        assert!((position.pnl_value(110.0) - 20.0).abs() < 1e-9);
        assert!((position.trailing_stop(5.0).unwrap() - 114.0).abs() < 1e-9);
        assert!((position.pnl_pct_at_stop(5.0).unwrap() - 14.0).abs() < 1e-9);
        assert!((position.drawdown_from_high_pct(108.0) - 10.0).abs() < 1e-9);
    }
}
