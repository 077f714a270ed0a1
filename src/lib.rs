//! Momentum Trader Library
//!
//! Market-health-gated momentum trading for Solana tokens, executed through
//! Jupiter swaps with trailing-stop exits and Telegram control.

pub mod cli;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod market;
pub mod metrics;
pub mod notify;
pub mod position;
pub mod signal;
pub mod strategy;
pub mod trading;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
