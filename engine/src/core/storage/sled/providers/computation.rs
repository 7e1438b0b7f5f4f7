use async_trait::async_trait;
use log::{debug, trace};
use vantage_common::block::BlockHeight;

use crate::core::{
    error::{DiskContext, IndexerError},
    storage::{Computation, ComputationProvider, SledStorage},
};

// lp(target) || lp(formula) || lp(args); versions append be64(height)
fn identity_prefix(target_address: &str, formula: &str, args: &str) -> Vec<u8> {
    SledStorage::len_prefixed_key(&[
        target_address.as_bytes(),
        formula.as_bytes(),
        args.as_bytes(),
    ])
}

#[async_trait]
impl ComputationProvider for SledStorage {
    async fn get_latest_computation(
        &self,
        target_address: &str,
        formula: &str,
        args: &str,
        height: BlockHeight,
    ) -> Result<Option<Computation>, IndexerError> {
        trace!(
            "get latest computation of {} for {} at maximum height {}",
            formula,
            target_address,
            height
        );
        let prefix = identity_prefix(target_address, formula, args);
        match Self::last_version_at_most(&self.computations, &prefix, height)? {
            Some(raw) => Ok(Some(Self::decode_row(&raw, DiskContext::Computation)?)),
            None => Ok(None),
        }
    }

    async fn get_computations_in_range(
        &self,
        target_address: &str,
        formula: &str,
        args: &str,
        after: BlockHeight,
        up_to: BlockHeight,
    ) -> Result<Vec<Computation>, IndexerError> {
        trace!(
            "get computations of {} for {} in ({}, {}]",
            formula,
            target_address,
            after,
            up_to
        );
        let prefix = identity_prefix(target_address, formula, args);
        let Some(start_height) = after.checked_add(1) else {
            return Ok(Vec::new());
        };
        let start = Self::versioned_key(&prefix, start_height);
        let end = Self::versioned_key(&prefix, up_to);

        let mut computations = Vec::new();
        for entry in self.computations.range(start..=end) {
            let (entry_key, raw) = entry?;
            if entry_key.len() != prefix.len() + 8 {
                continue;
            }
            computations.push(Self::decode_row(&raw, DiskContext::Computation)?);
        }
        Ok(computations)
    }

    async fn store_computation(&self, computation: &Computation) -> Result<(), IndexerError> {
        trace!(
            "store computation of {} for {} at {}",
            computation.formula,
            computation.target_address,
            computation.block
        );
        let prefix = identity_prefix(
            &computation.target_address,
            &computation.formula,
            &computation.args,
        );
        let key = Self::versioned_key(&prefix, computation.block.height);
        Self::insert_json(&self.computations, &key, computation)
    }

    async fn set_computation_validity(
        &self,
        target_address: &str,
        formula: &str,
        args: &str,
        block_height: BlockHeight,
        latest_block_height_valid: BlockHeight,
    ) -> Result<(), IndexerError> {
        let prefix = identity_prefix(target_address, formula, args);
        let key = Self::versioned_key(&prefix, block_height);
        let raw = self
            .computations
            .get(&key)?
            .ok_or(IndexerError::NotFoundOnDisk(DiskContext::Computation))?;
        let mut computation: Computation = Self::decode_row(&raw, DiskContext::Computation)?;
        computation.latest_block_height_valid = latest_block_height_valid;
        Self::insert_json(&self.computations, &key, &computation)
    }

    async fn delete_computations_for(
        &self,
        target_address: &str,
        formula: &str,
    ) -> Result<u64, IndexerError> {
        let prefix =
            SledStorage::len_prefixed_key(&[target_address.as_bytes(), formula.as_bytes()]);
        let mut keys = Vec::new();
        for entry in self.computations.scan_prefix(&prefix) {
            let (entry_key, _) = entry?;
            keys.push(entry_key);
        }
        for key in &keys {
            self.computations.remove(key)?;
        }
        if !keys.is_empty() {
            debug!(
                "deleted {} computations of {} for {}",
                keys.len(),
                formula,
                target_address
            );
        }
        Ok(keys.len() as u64)
    }

    async fn delete_all_computations(&self) -> Result<u64, IndexerError> {
        let count = self.computations.len() as u64;
        self.computations.clear()?;
        debug!("deleted all {} computations", count);
        Ok(count)
    }
}
