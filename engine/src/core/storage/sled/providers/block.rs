use async_trait::async_trait;
use log::trace;
use vantage_common::{
    block::{Block, BlockHeight},
    time::TimestampMillis,
};

use crate::core::{
    error::{DiskContext, IndexerError},
    storage::{BlockProvider, SledStorage},
};

#[async_trait]
impl BlockProvider for SledStorage {
    async fn get_block_at_height(
        &self,
        height: BlockHeight,
    ) -> Result<Option<Block>, IndexerError> {
        trace!("get block at height {}", height);
        {
            let mut cache = self.block_time_cache.lock().await;
            if let Some(timestamp) = cache.get(&height) {
                return Ok(Some(Block::new(height, *timestamp)));
            }
        }

        let block: Option<Block> = Self::load_optional_json(
            &self.blocks,
            &height.to_be_bytes(),
            DiskContext::Block,
        )?;
        if let Some(block) = &block {
            self.block_time_cache
                .lock()
                .await
                .put(block.height, block.timestamp);
        }
        Ok(block)
    }

    async fn get_block_at_or_below_height(
        &self,
        height: BlockHeight,
    ) -> Result<Option<Block>, IndexerError> {
        trace!("get block at or below height {}", height);
        match self.blocks.range(..=height.to_be_bytes()).next_back() {
            Some(entry) => {
                let (_, raw) = entry?;
                Ok(Some(Self::decode_row(&raw, DiskContext::Block)?))
            }
            None => Ok(None),
        }
    }

    async fn get_block_at_or_after_time(
        &self,
        time: TimestampMillis,
    ) -> Result<Option<Block>, IndexerError> {
        trace!("get block at or after time {}", time);
        match self.blocks_by_time.range(time.to_be_bytes()..).next() {
            Some(entry) => {
                let (_, raw) = entry?;
                Ok(Some(Self::decode_row(&raw, DiskContext::Block)?))
            }
            None => Ok(None),
        }
    }

    async fn get_block_at_or_below_time(
        &self,
        time: TimestampMillis,
    ) -> Result<Option<Block>, IndexerError> {
        trace!("get block at or below time {}", time);
        match self.blocks_by_time.range(..=time.to_be_bytes()).next_back() {
            Some(entry) => {
                let (_, raw) = entry?;
                Ok(Some(Self::decode_row(&raw, DiskContext::Block)?))
            }
            None => Ok(None),
        }
    }

    async fn get_latest_block(&self) -> Result<Option<Block>, IndexerError> {
        match self.blocks.last()? {
            Some((_, raw)) => Ok(Some(Self::decode_row(&raw, DiskContext::Block)?)),
            None => Ok(None),
        }
    }

    async fn store_block(&self, block: Block) -> Result<(), IndexerError> {
        trace!("store block {}", block);
        Self::insert_json(&self.blocks, &block.height.to_be_bytes(), &block)?;
        Self::insert_json(&self.blocks_by_time, &block.timestamp.to_be_bytes(), &block)?;
        Ok(())
    }
}
