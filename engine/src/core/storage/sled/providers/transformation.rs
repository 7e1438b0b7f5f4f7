use std::collections::BTreeMap;

use async_trait::async_trait;
use log::trace;
use vantage_common::block::BlockHeight;

use crate::core::{
    error::{DiskContext, IndexerError},
    storage::{NamePattern, SledStorage, TransformationEvent, TransformationProvider},
};

// lp(contract) || name bytes; versions append be64(height). Names stay
// raw so name-prefix scans work; exact-name reads rely on the entry
// length filter.
fn name_key_prefix(contract: &str, name: &str) -> Vec<u8> {
    let mut prefix = SledStorage::len_prefixed_key(&[contract.as_bytes()]);
    prefix.extend_from_slice(name.as_bytes());
    prefix
}

// (contract, name) parsed from an entry key
fn parse_entry_key(entry_key: &[u8]) -> Option<(String, String)> {
    let len_raw: [u8; 2] = entry_key.get(..2)?.try_into().ok()?;
    let address_len = u16::from_be_bytes(len_raw) as usize;
    let name_end = entry_key.len().checked_sub(8)?;
    let address = entry_key.get(2..2 + address_len)?;
    let name = entry_key.get(2 + address_len..name_end)?;
    Some((
        String::from_utf8_lossy(address).into_owned(),
        String::from_utf8_lossy(name).into_owned(),
    ))
}

impl SledStorage {
    /// Latest row per `(contract, name)` at or below `height` under a
    /// raw scan prefix, keyed for deterministic output order.
    fn latest_transformations_under(
        &self,
        scan_prefix: &[u8],
        height: BlockHeight,
    ) -> Result<BTreeMap<(String, String), sled::IVec>, IndexerError> {
        let mut best: BTreeMap<(String, String), (BlockHeight, sled::IVec)> = BTreeMap::new();
        for entry in self.transformations.scan_prefix(scan_prefix) {
            let (entry_key, raw) = entry?;
            let Some(entry_height) = Self::height_at_suffix(&entry_key, 8) else {
                continue;
            };
            if entry_height > height {
                continue;
            }
            let Some(parsed) = parse_entry_key(&entry_key) else {
                continue;
            };
            match best.get(&parsed) {
                Some((found, _)) if *found >= entry_height => {}
                _ => {
                    best.insert(parsed, (entry_height, raw));
                }
            }
        }
        Ok(best
            .into_iter()
            .map(|(parsed, (_, raw))| (parsed, raw))
            .collect())
    }
}

#[async_trait]
impl TransformationProvider for SledStorage {
    async fn get_transformations_matching(
        &self,
        contract: Option<&str>,
        pattern: &NamePattern,
        height: BlockHeight,
        limit: Option<usize>,
    ) -> Result<Vec<TransformationEvent>, IndexerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "get transformations matching {:?} {} at maximum height {}",
                contract,
                pattern.raw(),
                height
            );
        }

        let scan_prefix = match contract {
            Some(address) => name_key_prefix(address, pattern.literal_prefix()),
            // Cross-contract match has no usable byte prefix
            None => Vec::new(),
        };

        let mut events = Vec::new();
        for ((_, name), raw) in self.latest_transformations_under(&scan_prefix, height)? {
            if !pattern.matches(&name) {
                continue;
            }
            events.push(Self::decode_row(&raw, DiskContext::Transformation)?);
            if limit.is_some_and(|bound| events.len() >= bound) {
                break;
            }
        }
        Ok(events)
    }

    async fn get_transformation_map(
        &self,
        contract: &str,
        name_prefix: &str,
        height: BlockHeight,
    ) -> Result<Vec<TransformationEvent>, IndexerError> {
        trace!("get transformation map {} {}", contract, name_prefix);
        let scan_prefix = name_key_prefix(contract, name_prefix);
        let mut events = Vec::new();
        for (_, raw) in self.latest_transformations_under(&scan_prefix, height)? {
            events.push(Self::decode_row(&raw, DiskContext::Transformation)?);
        }
        Ok(events)
    }

    async fn get_first_transformation(
        &self,
        contract: &str,
        name: &str,
        height: BlockHeight,
    ) -> Result<Option<TransformationEvent>, IndexerError> {
        let prefix = name_key_prefix(contract, name);
        match Self::first_version_at_most(&self.transformations, &prefix, height)? {
            Some(raw) => Ok(Some(Self::decode_row(&raw, DiskContext::Transformation)?)),
            None => Ok(None),
        }
    }

    async fn store_transformation(
        &self,
        event: &TransformationEvent,
    ) -> Result<(), IndexerError> {
        let prefix = name_key_prefix(&event.contract_address, &event.name);
        let entry_key = Self::versioned_key(&prefix, event.block.height);
        Self::insert_json(&self.transformations, &entry_key, event)
    }
}
