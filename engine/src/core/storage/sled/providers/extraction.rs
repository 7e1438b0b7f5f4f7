use async_trait::async_trait;
use log::trace;
use vantage_common::block::BlockHeight;

use crate::core::{
    error::{DiskContext, IndexerError},
    storage::{Extraction, ExtractionProvider, SledStorage},
};

#[async_trait]
impl ExtractionProvider for SledStorage {
    async fn get_extraction(
        &self,
        address: &str,
        name: &str,
        height: BlockHeight,
    ) -> Result<Option<Extraction>, IndexerError> {
        trace!(
            "get extraction {} for {} at maximum height {}",
            name,
            address,
            height
        );
        let prefix = SledStorage::len_prefixed_key(&[address.as_bytes(), name.as_bytes()]);
        match Self::last_version_at_most(&self.extractions, &prefix, height)? {
            Some(raw) => Ok(Some(Self::decode_row(&raw, DiskContext::Extraction)?)),
            None => Ok(None),
        }
    }

    async fn store_extraction(&self, extraction: &Extraction) -> Result<(), IndexerError> {
        let prefix = SledStorage::len_prefixed_key(&[
            extraction.address.as_bytes(),
            extraction.name.as_bytes(),
        ]);
        let key = Self::versioned_key(&prefix, extraction.block.height);
        Self::insert_json(&self.extractions, &key, extraction)
    }
}
