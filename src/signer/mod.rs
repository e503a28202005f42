//! Signer abstraction for handing withdrawals to the external
//! broadcast collaborator.
//!
//! The core never constructs blockchain transactions itself; it submits the
//! withdrawal intent and tracks completion via the processor's callbacks.

use crate::domain::Withdrawal;
use async_trait::async_trait;
use std::fmt;

pub mod http;
pub mod mock;

pub use http::HttpSigner;
pub use mock::MockSigner;

/// External signer/broadcast collaborator.
///
/// Implementations must handle retry/backoff for transient failures; a
/// returned error is treated as permanent and fails the withdrawal.
#[async_trait]
pub trait Signer: Send + Sync + fmt::Debug {
    /// Submit a withdrawal for on-chain execution.
    ///
    /// # Returns
    /// The transaction hash reported by the signer.
    async fn submit(&self, withdrawal: &Withdrawal) -> Result<String, SignerError>;
}

/// Error type for signer operations.
#[derive(Debug, Clone)]
pub enum SignerError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// The signer rejected the withdrawal outright
    Rejected(String),
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            SignerError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            SignerError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            SignerError::Rejected(msg) => write!(f, "Rejected: {}", msg),
        }
    }
}

impl std::error::Error for SignerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signer_error_display() {
        let err = SignerError::NetworkError("connection timeout".to_string());
        assert_eq!(err.to_string(), "Network error: connection timeout");

        let err = SignerError::HttpError {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 503: unavailable");

        let err = SignerError::Rejected("destination blocked".to_string());
        assert_eq!(err.to_string(), "Rejected: destination blocked");
    }
}
