//! HTTP signer client.

use super::{Signer, SignerError};
use crate::domain::Withdrawal;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Signer collaborator reached over HTTP.
///
/// Posts the withdrawal intent to `{base_url}/sign` and expects a JSON
/// body carrying the broadcast transaction hash.
#[derive(Debug, Clone)]
pub struct HttpSigner {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    tx_hash: String,
}

impl HttpSigner {
    /// Create a new HTTP signer client.
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl Signer for HttpSigner {
    async fn submit(&self, withdrawal: &Withdrawal) -> Result<String, SignerError> {
        let url = format!("{}/sign", self.base_url);
        let payload = serde_json::json!({
            "withdrawalId": withdrawal.withdrawal_id,
            "amount": withdrawal.amount.to_canonical_string(),
            "destinationAddress": withdrawal.destination_address,
        });

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            debug!(withdrawal = %withdrawal.withdrawal_id, url = %url, "submitting to signer");
            let response = self
                .client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(SignerError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status.is_server_error() || status == 429 {
                return Err(backoff::Error::transient(SignerError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(SignerError::Rejected(format!(
                    "signer returned status {}",
                    status.as_u16()
                ))));
            }

            let body = response
                .json::<SignResponse>()
                .await
                .map_err(|e| backoff::Error::permanent(SignerError::ParseError(e.to_string())))?;
            Ok(body.tx_hash)
        })
        .await
    }
}
