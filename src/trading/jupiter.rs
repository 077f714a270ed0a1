//! Jupiter aggregator swaps submitted through a Solana RPC endpoint
//!
//! Quote and swap-build go to Jupiter's HTTP API; signing is local;
//! submission, confirmation and balances use the configured RPC endpoint.
//! Primary and fallback venues differ only in that endpoint.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::VersionedTransaction;
use spl_associated_token_account::get_associated_token_address;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::JupiterConfig;
use crate::error::{Error, Result};
use crate::trading::venue::{
    ConfirmStatus, Quote, QuoteRequest, SignedSwap, SwapPayload, TokenBalance, TradeVenue,
};

/// Status checks made inside `confirm` before reporting Unknown
const CONFIRM_CHECKS: u32 = 20;
const CONFIRM_CHECK_INTERVAL: Duration = Duration::from_millis(1500);

#[derive(Debug, Deserialize)]
struct SwapResponse {
    #[serde(rename = "swapTransaction")]
    swap_transaction: Option<String>,
    error: Option<String>,
}

/// Decode a base58 secret key (the `PRIVATE_KEY` format)
pub fn keypair_from_base58(secret: &str) -> Result<Keypair> {
    let bytes = bs58::decode(secret.trim())
        .into_vec()
        .map_err(|e| Error::InvalidKeypair(format!("not base58: {}", e)))?;
    Keypair::from_bytes(&bytes).map_err(|e| Error::InvalidKeypair(e.to_string()))
}

/// Load the trading keypair from `PRIVATE_KEY`
pub fn keypair_from_env() -> Result<Keypair> {
    let secret =
        std::env::var("PRIVATE_KEY").map_err(|_| Error::MissingEnvVar("PRIVATE_KEY".to_string()))?;
    keypair_from_base58(&secret)
}

pub struct JupiterVenue {
    http: reqwest::Client,
    rpc: RpcClient,
    rpc_url: String,
    keypair: Arc<Keypair>,
    quote_url: String,
    swap_url: String,
}

impl JupiterVenue {
    pub fn new(
        jupiter: &JupiterConfig,
        rpc_url: &str,
        timeout: Duration,
        keypair: Arc<Keypair>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let rpc = RpcClient::new_with_timeout_and_commitment(
            rpc_url.to_string(),
            timeout,
            CommitmentConfig::confirmed(),
        );

        Ok(Self {
            http,
            rpc,
            rpc_url: rpc_url.to_string(),
            keypair,
            quote_url: jupiter.quote_url.clone(),
            swap_url: jupiter.swap_url.clone(),
        })
    }

    pub fn wallet(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn parse_amount(value: &serde_json::Value, key: &str) -> Result<u64> {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::Quote(format!("quote missing {}", key)))
    }

    fn status_from(status: Option<solana_sdk::transaction::Result<()>>) -> ConfirmStatus {
        match status {
            Some(Ok(())) => ConfirmStatus::Success,
            Some(Err(e)) => ConfirmStatus::Failed(e.to_string()),
            None => ConfirmStatus::Unknown,
        }
    }
}

#[async_trait]
impl TradeVenue for JupiterVenue {
    fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote> {
        let amount = request.amount_raw.to_string();
        let slippage = request.slippage_bps.to_string();
        let response = self
            .http
            .get(&self.quote_url)
            .query(&[
                ("inputMint", request.input_mint.as_str()),
                ("outputMint", request.output_mint.as_str()),
                ("amount", amount.as_str()),
                ("slippageBps", slippage.as_str()),
                ("maxAccounts", "64"),
            ])
            .send()
            .await
            .map_err(|e| Error::Quote(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Quote(format!("{}: {}", status, body)));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("Failed to parse quote: {}", e)))?;

        let quote = Quote {
            input_mint: request.input_mint.clone(),
            output_mint: request.output_mint.clone(),
            in_amount: Self::parse_amount(&raw, "inAmount")?,
            out_amount: Self::parse_amount(&raw, "outAmount")?,
            raw,
        };
        debug!(
            "Quote {} -> {}: {} -> {}",
            quote.input_mint, quote.output_mint, quote.in_amount, quote.out_amount
        );
        Ok(quote)
    }

    async fn build(&self, quote: &Quote) -> Result<SwapPayload> {
        let body = json!({
            "userPublicKey": self.keypair.pubkey().to_string(),
            "quoteResponse": quote.raw,
            "wrapAndUnwrapSol": true,
            "dynamicComputeUnitLimit": true,
            "dynamicSlippage": true,
            "prioritizationFeeLamports": "auto",
        });

        let response: SwapResponse = self
            .http
            .post(&self.swap_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::SwapBuild(format!("HTTP request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| Error::Deserialization(format!("Failed to parse swap response: {}", e)))?;

        if let Some(error) = response.error {
            return Err(Error::SwapBuild(error));
        }

        let encoded = response
            .swap_transaction
            .ok_or_else(|| Error::SwapBuild("No transaction in response".to_string()))?;
        let transaction = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::SwapBuild(format!("Invalid base64 transaction: {}", e)))?;

        Ok(SwapPayload { transaction })
    }

    fn sign(&self, payload: SwapPayload) -> Result<SignedSwap> {
        let unsigned: VersionedTransaction = bincode::deserialize(&payload.transaction)
            .map_err(|e| Error::Signing(format!("Invalid transaction bytes: {}", e)))?;

        let signed = VersionedTransaction::try_new(unsigned.message, &[self.keypair.as_ref()])
            .map_err(|e| Error::Signing(e.to_string()))?;

        let signature = signed
            .signatures
            .first()
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Signing("Signed transaction has no signature".to_string()))?;
        let transaction =
            bincode::serialize(&signed).map_err(|e| Error::Serialization(e.to_string()))?;

        Ok(SignedSwap {
            transaction,
            signature,
        })
    }

    async fn submit(&self, swap: &SignedSwap) -> Result<String> {
        let transaction: VersionedTransaction = bincode::deserialize(&swap.transaction)
            .map_err(|e| Error::TransactionSend(format!("Invalid signed transaction: {}", e)))?;

        let signature = self
            .rpc
            .send_transaction(&transaction)
            .await
            .map_err(|e| Error::TransactionSend(e.to_string()))?;

        info!("Submitted {} via {}", signature, self.rpc_url);
        Ok(signature.to_string())
    }

    async fn confirm(&self, signature: &str) -> Result<ConfirmStatus> {
        for _ in 0..CONFIRM_CHECKS {
            match self.signature_status(signature).await? {
                ConfirmStatus::Unknown => tokio::time::sleep(CONFIRM_CHECK_INTERVAL).await,
                resolved => return Ok(resolved),
            }
        }
        Ok(ConfirmStatus::Unknown)
    }

    async fn signature_status(&self, signature: &str) -> Result<ConfirmStatus> {
        let signature = Signature::from_str(signature)
            .map_err(|e| Error::validation("signature", e.to_string()))?;
        let status = self
            .rpc
            .get_signature_status_with_commitment(&signature, CommitmentConfig::confirmed())
            .await?;
        Ok(Self::status_from(status))
    }

    async fn balance(&self, mint: &str) -> Result<TokenBalance> {
        let mint = Pubkey::from_str(mint).map_err(|e| Error::validation("mint", e.to_string()))?;
        let ata = get_associated_token_address(&self.keypair.pubkey(), &mint);

        match self.rpc.get_token_account_balance(&ata).await {
            Ok(amount) => Ok(TokenBalance {
                raw: amount
                    .amount
                    .parse()
                    .map_err(|_| Error::Rpc(format!("bad token amount {}", amount.amount)))?,
                decimals: amount.decimals,
            }),
            // No token account means nothing held
            Err(e) if e.to_string().contains("could not find account") => Ok(TokenBalance::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_round_trip() {
        let keypair = Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();
        let decoded = keypair_from_base58(&encoded).unwrap();
        assert_eq!(decoded.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_keypair_rejects_garbage() {
        assert!(matches!(keypair_from_base58("0OIl"), Err(Error::InvalidKeypair(_))));
        assert!(matches!(keypair_from_base58("abc"), Err(Error::InvalidKeypair(_))));
    }

    #[test]
    fn test_parse_quote_amounts() {
        let raw = json!({"inAmount": "500000000", "outAmount": "912345", "otherAmountThreshold": "1"});
        assert_eq!(JupiterVenue::parse_amount(&raw, "inAmount").unwrap(), 500_000_000);
        assert_eq!(JupiterVenue::parse_amount(&raw, "outAmount").unwrap(), 912_345);
        assert!(JupiterVenue::parse_amount(&raw, "missing").is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(JupiterVenue::status_from(Some(Ok(()))), ConfirmStatus::Success);
        assert_eq!(JupiterVenue::status_from(None), ConfirmStatus::Unknown);
        assert!(matches!(
            JupiterVenue::status_from(Some(Err(
                solana_sdk::transaction::TransactionError::AccountNotFound
            ))),
            ConfirmStatus::Failed(_)
        ));
    }
}
