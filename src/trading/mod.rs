//! Trading module - swap execution
//!
//! Venues:
//! - Jupiter aggregator via a Solana RPC endpoint (live)
//! - Paper venue (dry runs)
//!
//! The gateway layers validation, retries and failover on top.

pub mod gateway;
pub mod jupiter;
pub mod paper;
pub mod validation;
pub mod venue;

pub use gateway::{ExecutionConfig, ExecutionGateway};
pub use jupiter::JupiterVenue;
pub use paper::PaperVenue;
pub use venue::{ConfirmStatus, Quote, QuoteRequest, SwapReceipt, TokenBalance, TradeVenue};
