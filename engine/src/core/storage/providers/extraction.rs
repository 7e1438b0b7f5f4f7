use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vantage_common::block::{Block, BlockHeight};

use crate::core::error::IndexerError;

/// Named datum extracted from a contract by an out-of-band extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub address: String,
    pub name: String,
    pub block: Block,
    pub data: Value,
}

#[async_trait]
pub trait ExtractionProvider {
    async fn get_extraction(
        &self,
        address: &str,
        name: &str,
        height: BlockHeight,
    ) -> Result<Option<Extraction>, IndexerError>;

    async fn store_extraction(&self, extraction: &Extraction) -> Result<(), IndexerError>;
}
