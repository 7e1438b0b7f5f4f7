use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use vantage_common::block::{Block, BlockHeight};

use crate::core::error::IndexerError;

/// Community pool snapshot; the most recent row at or below the target
/// block is the pool as of that block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityPoolState {
    pub block: Block,
    pub balances: IndexMap<String, String>,
}

#[async_trait]
pub trait CommunityPoolProvider {
    async fn get_community_pool_at_maximum_height(
        &self,
        height: BlockHeight,
    ) -> Result<Option<CommunityPoolState>, IndexerError>;

    async fn store_community_pool(
        &self,
        state: &CommunityPoolState,
    ) -> Result<(), IndexerError>;
}
