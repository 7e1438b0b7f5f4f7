use async_trait::async_trait;
use vantage_common::{block::BlockHeight, dependent_key::DependentKey};

use crate::core::error::IndexerError;

/// Change detection over the event tables, the primitive behind
/// validity intervals and range skip-ahead: given a dependent key, find
/// the first height strictly after `after` (and at or below `up_to`
/// when bounded) at which a matching row exists.
#[async_trait]
pub trait DependencyProvider {
    async fn first_change_matching(
        &self,
        key: &DependentKey,
        after: BlockHeight,
        up_to: Option<BlockHeight>,
    ) -> Result<Option<BlockHeight>, IndexerError>;

    /// Minimum first-change height over a whole dependency set.
    async fn first_change_for_any(
        &self,
        keys: &[DependentKey],
        after: BlockHeight,
        up_to: Option<BlockHeight>,
    ) -> Result<Option<BlockHeight>, IndexerError> {
        let mut earliest: Option<BlockHeight> = None;
        for key in keys {
            // Narrow the bound as matches come in; nothing can beat a
            // change right at `after + 1`.
            let bound = match (earliest, up_to) {
                (Some(found), _) => Some(found),
                (None, bound) => bound,
            };
            if let Some(height) = self.first_change_matching(key, after, bound).await? {
                if earliest.map_or(true, |found| height < found) {
                    earliest = Some(height);
                    if height == after + 1 {
                        break;
                    }
                }
            }
        }
        Ok(earliest)
    }
}
