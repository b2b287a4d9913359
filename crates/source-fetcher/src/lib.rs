//! Resolves a [`bytecode_pointer::SourceAddress`] to a hash-verified
//! [`validation_engine::CheckedContract`]: fetch the manifest, fetch every
//! source it declares by URL (inline sources need no fetch), and hand the
//! whole bag to the Validation Engine for reconciliation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytecode_pointer::SourceAddress;
use thiserror::Error;
use validation_engine::{CheckedContract, PathBlob};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error fetching '{0}': {1}")]
    Transport(String, String),
}

/// The decentralized source-fetching transport layer spec.md §1 treats as an
/// external collaborator: resolves a [`SourceAddress`] to the manifest bytes
/// it names, and an arbitrary source URL to its bytes.
#[async_trait]
pub trait SourceTransport: Send + Sync {
    async fn fetch_manifest(&self, address: &SourceAddress) -> Result<Vec<u8>, FetchError>;
    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches manifests and their declared sources, reconciling each through
/// [`validation_engine::check_files`]. Cheap to clone: the running flag and
/// transport handle are shared.
#[derive(Clone)]
pub struct SourceFetcher {
    transport: Arc<dyn SourceTransport>,
    running: Arc<AtomicBool>,
}

impl SourceFetcher {
    pub fn new(transport: Arc<dyn SourceTransport>) -> Self {
        Self {
            transport,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Cancels pending fetches and prevents any further callback delivery.
    /// Already-delivered callbacks are unaffected.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Resolves `address` and delivers the result to `on_complete`. Runs as a
    /// detached task; the caller is not blocked. Nothing is delivered if
    /// [`stop`](Self::stop) is called before fetching completes.
    pub fn enqueue<F>(&self, address: SourceAddress, on_complete: F)
    where
        F: FnOnce(CheckedContract) + Send + 'static,
    {
        let fetcher = self.clone();
        tokio::spawn(async move {
            if let Some(contract) = fetcher.fetch_and_assemble(&address).await {
                if fetcher.is_running() {
                    on_complete(contract);
                }
            }
        });
    }

    /// Synchronous (non-spawning) core used by [`enqueue`](Self::enqueue) and
    /// directly by tests: fetch manifest + sources, reconcile, return the
    /// single resulting checked contract.
    pub async fn fetch_and_assemble(&self, address: &SourceAddress) -> Option<CheckedContract> {
        if !self.is_running() {
            return None;
        }

        let manifest_bytes = match self.transport.fetch_manifest(address).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(address = %address, error = %err, "failed to fetch manifest");
                return None;
            }
        };

        let manifest_text = match String::from_utf8(manifest_bytes.clone()) {
            Ok(text) => text,
            Err(_) => {
                tracing::warn!(address = %address, "manifest bytes are not valid UTF-8");
                return None;
            }
        };
        let Some(manifest_value) = metadata_recognizer::recognize(&manifest_text) else {
            tracing::warn!(address = %address, "fetched manifest was not recognized");
            return None;
        };

        let urls_to_fetch = sources_needing_fetch(&manifest_value);
        let fetches = urls_to_fetch.into_iter().map(|(path, urls)| {
            let transport = Arc::clone(&self.transport);
            async move {
                for url in &urls {
                    match transport.fetch_url(url).await {
                        Ok(bytes) => return Some(PathBlob { path, bytes }),
                        Err(err) => {
                            tracing::debug!(url = %url, error = %err, "source url fetch failed, trying next");
                        }
                    }
                }
                None
            }
        });
        let fetched = futures::future::join_all(fetches).await;

        if !self.is_running() {
            return None;
        }

        let mut blobs = vec![PathBlob {
            path: "metadata.json".to_string(),
            bytes: manifest_bytes,
        }];
        blobs.extend(fetched.into_iter().flatten());

        match validation_engine::check_files(blobs, None) {
            Ok(mut contracts) => contracts.pop(),
            Err(err) => {
                tracing::warn!(address = %address, error = %err, "could not reconcile fetched sources");
                None
            }
        }
    }
}

/// For every declared source without inline content, returns its logical
/// path and candidate URLs.
fn sources_needing_fetch(manifest: &serde_json::Value) -> Vec<(String, Vec<String>)> {
    let Some(sources) = manifest.get("sources").and_then(serde_json::Value::as_object) else {
        return Vec::new();
    };
    sources
        .iter()
        .filter(|(_, entry)| entry.get("content").is_none())
        .map(|(path, entry)| {
            let urls = entry
                .get("urls")
                .and_then(serde_json::Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(serde_json::Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            (path.clone(), urls)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecode_pointer::StorageKind;
    use keccak_variants_for_tests as keccak_variants;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    mod keccak_variants_for_tests {
        pub fn keccak256_hex(text: &str) -> String {
            // local re-derivation avoids adding a dev-dependency cycle back
            // onto keccak-variants purely for test fixtures.
            use sha3::{Digest, Keccak256};
            let digest = Keccak256::digest(text.as_bytes());
            format!("0x{}", hex::encode(digest))
        }
    }

    struct FakeTransport {
        manifest: Vec<u8>,
        urls: std::collections::HashMap<String, Vec<u8>>,
        fetch_log: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SourceTransport for FakeTransport {
        async fn fetch_manifest(&self, _address: &SourceAddress) -> Result<Vec<u8>, FetchError> {
            Ok(self.manifest.clone())
        }

        async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.fetch_log.lock().unwrap().push(url.to_string());
            self.urls
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Transport(url.to_string(), "not found".to_string()))
        }
    }

    fn sample_address() -> SourceAddress {
        SourceAddress {
            kind: StorageKind::Ipfs,
            digest: vec![0xde, 0xad, 0xbe, 0xef],
        }
    }

    fn sample_manifest(content: &str) -> serde_json::Value {
        let digest = keccak_variants::keccak256_hex(content);
        json!({
            "language": "Solidity",
            "compiler": {"version": "0.8.14+commit.80d49f37"},
            "version": 1,
            "settings": {"compilationTarget": {"contracts/A.sol": "A"}},
            "output": {
                "abi": [{"type": "function"}],
                "devdoc": {"methods": {}},
                "userdoc": {"methods": {}}
            },
            "sources": {
                "contracts/A.sol": {"keccak256": digest, "urls": ["ipfs://cid-a"]}
            }
        })
    }

    #[tokio::test]
    async fn fetches_manifest_and_source_and_reconciles() {
        let content = "contract A {}\n";
        let manifest = sample_manifest(content);
        let mut urls = std::collections::HashMap::new();
        urls.insert("ipfs://cid-a".to_string(), content.as_bytes().to_vec());

        let transport = Arc::new(FakeTransport {
            manifest: manifest.to_string().into_bytes(),
            urls,
            fetch_log: Mutex::new(Vec::new()),
        });
        let fetcher = SourceFetcher::new(transport);

        let contract = fetcher
            .fetch_and_assemble(&sample_address())
            .await
            .expect("should assemble a checked contract");
        assert!(contract.is_valid());
        assert_eq!(
            contract.found.get("contracts/A.sol"),
            Some(&content.to_string())
        );
    }

    #[tokio::test]
    async fn routes_unresolved_source_to_missing() {
        let content = "contract A {}\n";
        let manifest = sample_manifest(content);
        let transport = Arc::new(FakeTransport {
            manifest: manifest.to_string().into_bytes(),
            urls: std::collections::HashMap::new(),
            fetch_log: Mutex::new(Vec::new()),
        });
        let fetcher = SourceFetcher::new(transport);

        let contract = fetcher
            .fetch_and_assemble(&sample_address())
            .await
            .expect("should still assemble a checked contract");
        assert!(!contract.is_valid());
        assert!(contract.missing.contains_key("contracts/A.sol"));
    }

    #[tokio::test]
    async fn stop_prevents_assembly() {
        let content = "contract A {}\n";
        let manifest = sample_manifest(content);
        let transport = Arc::new(FakeTransport {
            manifest: manifest.to_string().into_bytes(),
            urls: std::collections::HashMap::new(),
            fetch_log: Mutex::new(Vec::new()),
        });
        let fetcher = SourceFetcher::new(transport);
        fetcher.stop();

        let contract = fetcher.fetch_and_assemble(&sample_address()).await;
        assert!(contract.is_none());
    }
}
