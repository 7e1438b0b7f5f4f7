use std::collections::BTreeMap;

use async_trait::async_trait;
use log::trace;
use vantage_common::block::BlockHeight;

use crate::core::{
    error::{DiskContext, IndexerError},
    storage::{FeegrantAllowance, FeegrantProvider, SledStorage},
};

// Latest allowance per counterparty under one side's scan prefix.
// Works for both trees because the row is self-describing.
fn latest_per_counterparty<F>(
    tree: &sled::Tree,
    prefix: &[u8],
    height: BlockHeight,
    counterparty: F,
) -> Result<Vec<FeegrantAllowance>, IndexerError>
where
    F: Fn(&FeegrantAllowance) -> String,
{
    let mut best: BTreeMap<String, (BlockHeight, FeegrantAllowance)> = BTreeMap::new();
    for entry in tree.scan_prefix(prefix) {
        let (entry_key, raw) = entry?;
        let Some(entry_height) = SledStorage::height_at_suffix(&entry_key, 8) else {
            continue;
        };
        if entry_height > height {
            continue;
        }
        let allowance: FeegrantAllowance =
            SledStorage::decode_row(&raw, DiskContext::FeegrantAllowance)?;
        let other = counterparty(&allowance);
        match best.get(&other) {
            Some((found, _)) if *found >= entry_height => {}
            _ => {
                best.insert(other, (entry_height, allowance));
            }
        }
    }
    Ok(best.into_values().map(|(_, allowance)| allowance).collect())
}

#[async_trait]
impl FeegrantProvider for SledStorage {
    async fn get_feegrant_allowance(
        &self,
        granter: &str,
        grantee: &str,
        height: BlockHeight,
    ) -> Result<Option<FeegrantAllowance>, IndexerError> {
        trace!(
            "get feegrant allowance {} -> {} at maximum height {}",
            granter,
            grantee,
            height
        );
        let prefix =
            SledStorage::len_prefixed_key(&[granter.as_bytes(), grantee.as_bytes()]);
        match Self::last_version_at_most(&self.feegrants, &prefix, height)? {
            Some(raw) => Ok(Some(Self::decode_row(&raw, DiskContext::FeegrantAllowance)?)),
            None => Ok(None),
        }
    }

    async fn get_feegrant_allowances_granted(
        &self,
        granter: &str,
        height: BlockHeight,
    ) -> Result<Vec<FeegrantAllowance>, IndexerError> {
        let prefix = SledStorage::len_prefixed_key(&[granter.as_bytes()]);
        latest_per_counterparty(&self.feegrants, &prefix, height, |allowance| {
            allowance.grantee.clone()
        })
    }

    async fn get_feegrant_allowances_received(
        &self,
        grantee: &str,
        height: BlockHeight,
    ) -> Result<Vec<FeegrantAllowance>, IndexerError> {
        let prefix = SledStorage::len_prefixed_key(&[grantee.as_bytes()]);
        latest_per_counterparty(&self.feegrants_by_grantee, &prefix, height, |allowance| {
            allowance.granter.clone()
        })
    }

    async fn store_feegrant_allowance(
        &self,
        allowance: &FeegrantAllowance,
    ) -> Result<(), IndexerError> {
        let forward = SledStorage::len_prefixed_key(&[
            allowance.granter.as_bytes(),
            allowance.grantee.as_bytes(),
        ]);
        let reverse = SledStorage::len_prefixed_key(&[
            allowance.grantee.as_bytes(),
            allowance.granter.as_bytes(),
        ]);
        Self::insert_json(
            &self.feegrants,
            &Self::versioned_key(&forward, allowance.block.height),
            allowance,
        )?;
        Self::insert_json(
            &self.feegrants_by_grantee,
            &Self::versioned_key(&reverse, allowance.block.height),
            allowance,
        )
    }
}
