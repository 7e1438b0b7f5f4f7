use async_trait::async_trait;
use vantage_common::{
    block::{Block, BlockHeight},
    time::TimestampMillis,
};

use crate::core::error::IndexerError;

/// Block table reads. Heights and times are always consistent because
/// both come from the same exported row; the time lookups exist for
/// callers that phrase ranges in wall-clock time.
#[async_trait]
pub trait BlockProvider {
    async fn get_block_at_height(&self, height: BlockHeight)
        -> Result<Option<Block>, IndexerError>;

    /// Greatest height at or below `height`.
    async fn get_block_at_or_below_height(
        &self,
        height: BlockHeight,
    ) -> Result<Option<Block>, IndexerError>;

    /// Earliest block whose time is at or after `time`.
    async fn get_block_at_or_after_time(
        &self,
        time: TimestampMillis,
    ) -> Result<Option<Block>, IndexerError>;

    /// Latest block whose time is at or below `time`.
    async fn get_block_at_or_below_time(
        &self,
        time: TimestampMillis,
    ) -> Result<Option<Block>, IndexerError>;

    async fn get_latest_block(&self) -> Result<Option<Block>, IndexerError>;

    async fn store_block(&self, block: Block) -> Result<(), IndexerError>;
}
