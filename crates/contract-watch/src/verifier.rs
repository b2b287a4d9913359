//! The downstream verification service, concretized as a plain HTTP client.
//! Bytecode comparison and repository write-out happen on the other side of
//! this boundary; this crate only shapes the two requests it needs.

use chain_monitor::{DownstreamError, DownstreamVerifier, InjectPayload};
use ethers::types::Address;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Serialize;

pub struct HttpDownstreamVerifier {
    base_url: String,
    client: ClientWithMiddleware,
}

impl HttpDownstreamVerifier {
    pub fn new(base_url: impl Into<String>) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Self {
            base_url: base_url.into(),
            client,
        }
    }
}

#[derive(Serialize)]
struct InjectRequest {
    bytecode: String,
    creation_sender: String,
    creation_nonce: String,
    chain_id: u64,
    addresses: Vec<String>,
    found_sources: std::collections::BTreeMap<String, String>,
}

#[async_trait::async_trait]
impl DownstreamVerifier for HttpDownstreamVerifier {
    async fn find_by_address(
        &self,
        address: Address,
        chain_id: u64,
    ) -> Result<Vec<serde_json::Value>, DownstreamError> {
        let url = format!(
            "{}/api/v2/verified-addresses/{address:?}?chain_id={chain_id}",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| DownstreamError::Request(err.to_string()))?;
        response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|err| DownstreamError::Request(err.to_string()))
    }

    async fn inject(&self, payload: InjectPayload) -> Result<(), DownstreamError> {
        let url = format!("{}/api/v2/inject", self.base_url.trim_end_matches('/'));
        let body = InjectRequest {
            bytecode: blockscout_display_bytes::Bytes::from(payload.bytecode).to_string(),
            creation_sender: format!("{:?}", payload.creation_data.sender),
            creation_nonce: payload.creation_data.nonce.to_string(),
            chain_id: payload.chain_id,
            addresses: payload.addresses.iter().map(|a| format!("{a:?}")).collect(),
            found_sources: payload.contract.found.clone(),
        };
        self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| DownstreamError::Request(err.to_string()))?
            .error_for_status()
            .map_err(|err| DownstreamError::Request(err.to_string()))?;
        Ok(())
    }
}
