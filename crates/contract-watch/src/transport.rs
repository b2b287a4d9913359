//! The decentralized source-fetching transport layer, concretized over
//! public HTTP gateways. Retried with the same `reqwest-retry` middleware
//! stack used for the downstream verifier client.

use async_trait::async_trait;
use bytecode_pointer::{SourceAddress, StorageKind};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use source_fetcher::FetchError;

pub struct HttpSourceTransport {
    client: ClientWithMiddleware,
    ipfs_gateway: String,
    swarm_gateway: String,
}

impl HttpSourceTransport {
    pub fn new(ipfs_gateway: impl Into<String>, swarm_gateway: impl Into<String>) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Self {
            client,
            ipfs_gateway: ipfs_gateway.into(),
            swarm_gateway: swarm_gateway.into(),
        }
    }

    fn gateway_url(&self, address: &SourceAddress) -> String {
        match address.kind {
            StorageKind::Ipfs => {
                let cid = bs58::encode(&address.digest).into_string();
                format!("{}/{}", self.ipfs_gateway.trim_end_matches('/'), cid)
            }
            StorageKind::Bzzr0 | StorageKind::Bzzr1 => format!(
                "{}/{}",
                self.swarm_gateway.trim_end_matches('/'),
                hex::encode(&address.digest)
            ),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::Transport(url.to_string(), err.to_string()))?;
        let bytes = response
            .error_for_status()
            .map_err(|err| FetchError::Transport(url.to_string(), err.to_string()))?
            .bytes()
            .await
            .map_err(|err| FetchError::Transport(url.to_string(), err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl source_fetcher::SourceTransport for HttpSourceTransport {
    async fn fetch_manifest(&self, address: &SourceAddress) -> Result<Vec<u8>, FetchError> {
        let url = self.gateway_url(address);
        self.fetch(&url).await
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetch(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipfs_digest_encodes_as_base58_cid() {
        let transport = HttpSourceTransport::new("https://ipfs.io/ipfs", "https://swarm.example");
        let address = SourceAddress {
            kind: StorageKind::Ipfs,
            digest: vec![
                0x12, 0x20, 0xbc, 0xc9, 0x88, 0xb1, 0x31, 0x12, 0x37, 0xf2, 0xc0, 0x0c, 0xcd,
                0x0b, 0xfb, 0xd8, 0xb0, 0x1d, 0x24, 0xdc, 0x18, 0xf7, 0x20, 0x60, 0x3b, 0x0d,
                0xe9, 0x3f, 0xe6, 0x32, 0x7d, 0xf5, 0x36, 0x25,
            ],
        };
        let url = transport.gateway_url(&address);
        assert!(url.starts_with("https://ipfs.io/ipfs/Qm"));
    }
}
