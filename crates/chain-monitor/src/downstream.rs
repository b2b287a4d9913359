use async_trait::async_trait;
use ethers::types::{Address, U256};
use thiserror::Error;
use validation_engine::CheckedContract;

#[derive(Debug, Error)]
pub enum DownstreamError {
    #[error("downstream verifier request failed: {0}")]
    Request(String),
}

/// The transaction context a contract was created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreationData {
    pub sender: Address,
    pub nonce: U256,
}

/// The payload handed to [`DownstreamVerifier::inject`].
#[derive(Debug, Clone)]
pub struct InjectPayload {
    pub contract: CheckedContract,
    pub bytecode: Vec<u8>,
    pub creation_data: CreationData,
    pub chain_id: u64,
    pub addresses: Vec<Address>,
}

/// The downstream verification service spec.md §1 names out of scope:
/// bytecode comparison and repository write-out live behind this interface.
#[async_trait]
pub trait DownstreamVerifier: Send + Sync {
    /// Verified-status lookup; an empty result means "not previously
    /// verified" and should trigger `processBytecode`.
    async fn find_by_address(
        &self,
        address: Address,
        chain_id: u64,
    ) -> Result<Vec<serde_json::Value>, DownstreamError>;

    async fn inject(&self, payload: InjectPayload) -> Result<(), DownstreamError>;
}
