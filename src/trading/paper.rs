//! Paper venue for dry runs
//!
//! Fills every swap at the request's reference price and keeps balances in
//! memory, so the whole pipeline (sizing, reconciliation, persistence,
//! notifications) runs without touching the chain.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::info;

use crate::error::{Error, Result};
use crate::trading::venue::{
    to_raw, to_ui, ConfirmStatus, Quote, QuoteRequest, SignedSwap, SwapPayload, TokenBalance,
    TradeVenue,
};

/// Decimals assumed for traded assets
const PAPER_ASSET_DECIMALS: u8 = 6;

#[derive(Debug, Serialize, Deserialize)]
struct PaperFill {
    input_mint: String,
    output_mint: String,
    in_amount: u64,
    out_amount: u64,
}

pub struct PaperVenue {
    quote_mint: String,
    quote_decimals: u8,
    balances: Mutex<HashMap<String, u64>>,
    fills: AtomicU64,
}

impl PaperVenue {
    pub fn new(quote_mint: &str, quote_decimals: u8, starting_quote: f64) -> Self {
        let mut balances = HashMap::new();
        balances.insert(quote_mint.to_string(), to_raw(starting_quote, quote_decimals));

        Self {
            quote_mint: quote_mint.to_string(),
            quote_decimals,
            balances: Mutex::new(balances),
            fills: AtomicU64::new(0),
        }
    }

    fn decimals(&self, mint: &str) -> u8 {
        if mint == self.quote_mint {
            self.quote_decimals
        } else {
            PAPER_ASSET_DECIMALS
        }
    }

    /// Seed a balance, e.g. for positions restored from disk
    pub fn credit(&self, mint: &str, ui_amount: f64) {
        let raw = to_raw(ui_amount, self.decimals(mint));
        if let Ok(mut balances) = self.balances.lock() {
            *balances.entry(mint.to_string()).or_insert(0) += raw;
        }
    }
}

#[async_trait]
impl TradeVenue for PaperVenue {
    fn endpoint(&self) -> &str {
        "paper"
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote> {
        let price = request
            .reference_price
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| Error::Quote("paper venue needs a reference price".to_string()))?;

        let in_ui = to_ui(request.amount_raw, self.decimals(&request.input_mint));
        let out_ui = if request.input_mint == self.quote_mint {
            in_ui / price
        } else {
            in_ui * price
        };
        let out_amount = to_raw(out_ui, self.decimals(&request.output_mint));

        let fill = PaperFill {
            input_mint: request.input_mint.clone(),
            output_mint: request.output_mint.clone(),
            in_amount: request.amount_raw,
            out_amount,
        };

        Ok(Quote {
            input_mint: fill.input_mint.clone(),
            output_mint: fill.output_mint.clone(),
            in_amount: fill.in_amount,
            out_amount: fill.out_amount,
            raw: serde_json::to_value(&fill)?,
        })
    }

    async fn build(&self, quote: &Quote) -> Result<SwapPayload> {
        Ok(SwapPayload {
            transaction: serde_json::to_vec(&quote.raw)?,
        })
    }

    fn sign(&self, payload: SwapPayload) -> Result<SignedSwap> {
        let n = self.fills.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SignedSwap {
            transaction: payload.transaction,
            signature: format!("paper-{}", n),
        })
    }

    async fn submit(&self, swap: &SignedSwap) -> Result<String> {
        let fill: PaperFill = serde_json::from_slice(&swap.transaction)?;

        let mut balances = self
            .balances
            .lock()
            .map_err(|_| Error::Internal("paper balances poisoned".to_string()))?;

        let available = balances.get(&fill.input_mint).copied().unwrap_or(0);
        if available < fill.in_amount {
            return Err(Error::TransactionSend(format!(
                "insufficient paper balance: have {}, need {}",
                available, fill.in_amount
            )));
        }
        balances.insert(fill.input_mint.clone(), available - fill.in_amount);
        *balances.entry(fill.output_mint.clone()).or_insert(0) += fill.out_amount;

        info!(
            "[paper] {} {} -> {} {}",
            fill.in_amount, fill.input_mint, fill.out_amount, fill.output_mint
        );
        Ok(swap.signature.clone())
    }

    async fn confirm(&self, _signature: &str) -> Result<ConfirmStatus> {
        Ok(ConfirmStatus::Success)
    }

    async fn signature_status(&self, _signature: &str) -> Result<ConfirmStatus> {
        Ok(ConfirmStatus::Success)
    }

    async fn balance(&self, mint: &str) -> Result<TokenBalance> {
        let raw = self
            .balances
            .lock()
            .map_err(|_| Error::Internal("paper balances poisoned".to_string()))?
            .get(mint)
            .copied()
            .unwrap_or(0);

        Ok(TokenBalance {
            raw,
            decimals: self.decimals(mint),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
    const JUP: &str = "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN";

    async fn swap(venue: &PaperVenue, input: &str, output: &str, amount_raw: u64, price: f64) -> Result<String> {
        let quote = venue
            .quote(&QuoteRequest {
                input_mint: input.into(),
                output_mint: output.into(),
                amount_raw,
                slippage_bps: 250,
                reference_price: Some(price),
            })
            .await?;
        let payload = venue.build(&quote).await?;
        let signed = venue.sign(payload)?;
        venue.submit(&signed).await
    }

    #[tokio::test]
    async fn test_buy_then_sell_moves_balances() {
        let venue = PaperVenue::new(USDC, 6, 1000.0);

        swap(&venue, USDC, JUP, 100_000_000, 0.5).await.unwrap();
        assert_eq!(venue.balance(JUP).await.unwrap().raw, 200_000_000);
        assert_eq!(venue.balance(USDC).await.unwrap().ui(), 900.0);

        swap(&venue, JUP, USDC, 200_000_000, 0.6).await.unwrap();
        assert_eq!(venue.balance(JUP).await.unwrap().raw, 0);
        assert!((venue.balance(USDC).await.unwrap().ui() - 1020.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_insufficient_balance_fails_submit() {
        let venue = PaperVenue::new(USDC, 6, 10.0);
        let err = swap(&venue, USDC, JUP, 50_000_000, 1.0).await.unwrap_err();
        assert!(matches!(err, Error::TransactionSend(_)));
    }

    #[tokio::test]
    async fn test_quote_requires_reference_price() {
        let venue = PaperVenue::new(USDC, 6, 10.0);
        let result = venue
            .quote(&QuoteRequest {
                input_mint: USDC.into(),
                output_mint: JUP.into(),
                amount_raw: 1,
                slippage_bps: 250,
                reference_price: None,
            })
            .await;
        assert!(matches!(result, Err(Error::Quote(_))));
    }
}
