use async_trait::async_trait;
use log::trace;
use vantage_common::block::BlockHeight;

use crate::core::{
    error::{DiskContext, IndexerError},
    storage::{CommunityPoolProvider, CommunityPoolState, SledStorage},
};

#[async_trait]
impl CommunityPoolProvider for SledStorage {
    async fn get_community_pool_at_maximum_height(
        &self,
        height: BlockHeight,
    ) -> Result<Option<CommunityPoolState>, IndexerError> {
        trace!("get community pool at maximum height {}", height);
        match self
            .community_pool
            .range(..=height.to_be_bytes())
            .next_back()
        {
            Some(entry) => {
                let (_, raw) = entry?;
                Ok(Some(Self::decode_row(&raw, DiskContext::CommunityPool)?))
            }
            None => Ok(None),
        }
    }

    async fn store_community_pool(
        &self,
        state: &CommunityPoolState,
    ) -> Result<(), IndexerError> {
        Self::insert_json(
            &self.community_pool,
            &state.block.height.to_be_bytes(),
            state,
        )
    }
}
