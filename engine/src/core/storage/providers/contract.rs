use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vantage_common::block::Block;

use crate::core::error::IndexerError;

/// A known contract: address to code id, plus where it appeared.
/// Transformations join against this row for code-id filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub address: String,
    pub code_id: u64,
    pub instantiated_at: Block,
}

#[async_trait]
pub trait ContractProvider {
    async fn get_contract(&self, address: &str) -> Result<Option<Contract>, IndexerError>;

    async fn store_contract(&self, contract: &Contract) -> Result<(), IndexerError>;
}
