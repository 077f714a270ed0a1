//! Position lifecycle, exit policy and persistence

pub mod manager;
pub mod store;
pub mod trailing;

pub use manager::{ExitReason, ExitSignal, Position, PositionManager, PositionState, RepriceOutcome};
pub use store::{JsonStore, PositionStore, TrendStateStore};
pub use trailing::{ArmingPolicy, ExitConfig, TrailingConfig, TrailingMode};
