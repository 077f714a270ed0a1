//! Trade venue abstraction
//!
//! One venue round-trip is quote -> build -> sign -> submit -> confirm.
//! Each step can fail independently; the gateway owns retries and failover.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Swap `amount_raw` base units of `input_mint` into `output_mint`
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount_raw: u64,
    pub slippage_bps: u32,
    /// Expected price of the traded asset in quote currency.
    /// Only simulated venues use it.
    pub reference_price: Option<f64>,
}

/// A priced route
#[derive(Debug, Clone)]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub out_amount: u64,
    /// Venue-specific payload echoed back on build
    pub raw: serde_json::Value,
}

/// Serialized, unsigned transaction
#[derive(Debug, Clone)]
pub struct SwapPayload {
    pub transaction: Vec<u8>,
}

/// Serialized, signed transaction with its signature
#[derive(Debug, Clone)]
pub struct SignedSwap {
    pub transaction: Vec<u8>,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmStatus {
    Success,
    Failed(String),
    /// Not seen yet; resolve by polling `signature_status`
    Unknown,
}

/// Token balance in base units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenBalance {
    pub raw: u64,
    pub decimals: u8,
}

impl TokenBalance {
    pub fn ui(&self) -> f64 {
        to_ui(self.raw, self.decimals)
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }
}

/// Outcome of a confirmed swap
#[derive(Debug, Clone, PartialEq)]
pub struct SwapReceipt {
    pub signature: String,
    /// Venue endpoint that confirmed it
    pub endpoint: String,
    pub in_amount: u64,
    pub out_amount: u64,
}

#[async_trait]
pub trait TradeVenue: Send + Sync {
    /// Endpoint label for logs and receipts
    fn endpoint(&self) -> &str;

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote>;

    async fn build(&self, quote: &Quote) -> Result<SwapPayload>;

    fn sign(&self, payload: SwapPayload) -> Result<SignedSwap>;

    /// Returns the transaction signature
    async fn submit(&self, swap: &SignedSwap) -> Result<String>;

    async fn confirm(&self, signature: &str) -> Result<ConfirmStatus>;

    /// Single status lookup
    async fn signature_status(&self, signature: &str) -> Result<ConfirmStatus>;

    async fn balance(&self, mint: &str) -> Result<TokenBalance>;
}

pub fn to_ui(raw: u64, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}

pub fn to_raw(ui: f64, decimals: u8) -> u64 {
    (ui * 10f64.powi(decimals as i32)).floor().max(0.0) as u64
}
