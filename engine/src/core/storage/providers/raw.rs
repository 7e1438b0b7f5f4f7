use async_trait::async_trait;
use serde_json::Value;

use crate::core::error::IndexerError;

/// Read-only escape hatch over the raw tables, for formulas with no
/// typed getter. No dependency tracking happens down here; callers own
/// their height filtering and their invalidation story.
#[async_trait]
pub trait RawQueryProvider {
    /// Rows under `prefix` in the named table, decoded to JSON, at most
    /// `limit` of them.
    async fn raw_prefix_scan(
        &self,
        table: &str,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Value)>, IndexerError>;
}
