use anyhow::anyhow;
use async_trait::async_trait;
use log::trace;
use serde_json::Value;

use crate::core::{
    error::IndexerError,
    storage::{RawQueryProvider, SledStorage},
};

#[async_trait]
impl RawQueryProvider for SledStorage {
    async fn raw_prefix_scan(
        &self,
        table: &str,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Value)>, IndexerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "raw prefix scan of {} under {} (limit {})",
                table,
                hex::encode(prefix),
                limit
            );
        }
        let tree = self
            .tree_by_name(table)
            .ok_or_else(|| IndexerError::Any(anyhow!("unknown table {:?}", table)))?;

        let mut rows = Vec::new();
        for entry in tree.scan_prefix(prefix) {
            let (key, raw) = entry?;
            let value: Value = serde_json::from_slice(&raw)?;
            rows.push((key.to_vec(), value));
            if rows.len() >= limit {
                break;
            }
        }
        Ok(rows)
    }
}
