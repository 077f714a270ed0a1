//! Error types for the trader

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the trader
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    // Validation errors (rejected before any external call)
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Max open positions reached: {open}/{max}")]
    PositionLimitReached { open: usize, max: usize },

    // Market data provider errors
    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // Venue round-trip errors
    #[error("Quote failed: {0}")]
    Quote(String),

    #[error("Swap build failed: {0}")]
    SwapBuild(String),

    #[error("Transaction signing failed: {0}")]
    Signing(String),

    #[error("Transaction send failed: {0}")]
    TransactionSend(String),

    #[error("Transaction {signature} failed on-chain: {reason}")]
    TransactionFailed { signature: String, reason: String },

    /// Submitted but neither confirmed nor failed; must not be resubmitted
    #[error("Transaction {signature} could not be confirmed after {attempts} attempts")]
    ConfirmationUnresolved { signature: String, attempts: u32 },

    #[error("Trade execution exhausted after {attempts} attempts: {last_error}")]
    ExecutionExhausted { attempts: u32, last_error: String },

    // Position management errors
    #[error("Position persistence failed: {0}")]
    PositionPersistence(String),

    // Notification errors
    #[error("Notification failed: {0}")]
    Notification(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Shorthand for a validation failure on a named field
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a provider failure
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_)
                | Error::Timeout { .. }
                | Error::Quote(_)
                | Error::SwapBuild(_)
                | Error::TransactionSend(_)
                | Error::TransactionFailed { .. }
                | Error::Provider { .. }
        )
    }

    /// Check if this error was raised by input validation
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Validation { .. } | Error::PositionLimitReached { .. }
        )
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout {
                operation: "HTTP request".to_string(),
                timeout_ms: 0,
            }
        } else {
            Error::provider("http", e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::TransactionSend("blockhash expired".into()).is_retryable());
        assert!(Error::Timeout {
            operation: "confirm".into(),
            timeout_ms: 30_000
        }
        .is_retryable());
        assert!(!Error::validation("amount", "must be positive").is_retryable());
        assert!(!Error::PositionPersistence("disk full".into()).is_retryable());
        assert!(!Error::ConfirmationUnresolved {
            signature: "5xSig".into(),
            attempts: 1
        }
        .is_retryable());
    }

    #[test]
    fn test_validation_classification() {
        assert!(Error::PositionLimitReached { open: 3, max: 3 }.is_validation());
        assert!(Error::validation("mint", "too short").is_validation());
        assert!(!Error::Rpc("down".into()).is_validation());
    }
}
