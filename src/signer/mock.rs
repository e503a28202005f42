//! Mock signer for testing without network calls.

use super::{Signer, SignerError};
use crate::domain::Withdrawal;
use async_trait::async_trait;
use std::sync::Mutex;

/// Mock signer that records submissions and returns a canned outcome.
#[derive(Debug)]
pub struct MockSigner {
    outcome: Result<String, SignerError>,
    submitted: Mutex<Vec<String>>,
}

impl MockSigner {
    /// Create a mock signer that accepts every withdrawal with a fixed hash.
    pub fn accepting(tx_hash: &str) -> Self {
        Self {
            outcome: Ok(tx_hash.to_string()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock signer that rejects every withdrawal.
    pub fn rejecting(reason: &str) -> Self {
        Self {
            outcome: Err(SignerError::Rejected(reason.to_string())),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Withdrawal ids submitted so far, in order.
    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().expect("mock signer lock").clone()
    }
}

#[async_trait]
impl Signer for MockSigner {
    async fn submit(&self, withdrawal: &Withdrawal) -> Result<String, SignerError> {
        self.submitted
            .lock()
            .expect("mock signer lock")
            .push(withdrawal.withdrawal_id.clone());
        self.outcome.clone()
    }
}
