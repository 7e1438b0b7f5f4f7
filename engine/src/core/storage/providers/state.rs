use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vantage_common::block::Block;

use crate::core::error::IndexerError;

/// Singleton row describing the chain as the exporter last saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub chain_id: String,
    pub latest_block: Block,
}

#[async_trait]
pub trait StateProvider {
    async fn get_chain_state(&self) -> Result<Option<ChainState>, IndexerError>;

    async fn set_chain_state(&self, state: &ChainState) -> Result<(), IndexerError>;
}
