use std::collections::BTreeMap;

use async_trait::async_trait;
use log::trace;
use serde_json::Value;
use vantage_common::block::BlockHeight;

use crate::core::{
    error::{DiskContext, IndexerError},
    storage::{SledStorage, WasmStateEvent, WasmStateProvider},
};

// lp(contract) || key bytes; versions append be64(height)
fn state_key_prefix(contract: &str, key: &[u8]) -> Vec<u8> {
    let mut prefix = SledStorage::len_prefixed_key(&[contract.as_bytes()]);
    prefix.extend_from_slice(key);
    prefix
}

#[async_trait]
impl WasmStateProvider for SledStorage {
    async fn get_wasm_state_at_maximum_height(
        &self,
        contract: &str,
        key: &[u8],
        height: BlockHeight,
    ) -> Result<Option<WasmStateEvent>, IndexerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "get wasm state for {} key {} at maximum height {}",
                contract,
                hex::encode(key),
                height
            );
        }
        let prefix = state_key_prefix(contract, key);
        match Self::last_version_at_most(&self.wasm_state, &prefix, height)? {
            Some(raw) => Ok(Some(Self::decode_row(&raw, DiskContext::WasmState)?)),
            None => Ok(None),
        }
    }

    async fn get_wasm_state_map_at_maximum_height(
        &self,
        contract: &str,
        key_prefix: &[u8],
        height: BlockHeight,
    ) -> Result<Vec<WasmStateEvent>, IndexerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "get wasm state map for {} prefix {} at maximum height {}",
                contract,
                hex::encode(key_prefix),
                height
            );
        }
        let scan_prefix = state_key_prefix(contract, key_prefix);
        // Entry keys are lp(contract) || key || be64(height); the
        // logical key sits between the address part and the suffix.
        let key_start = 2 + contract.len();

        let mut best: BTreeMap<Vec<u8>, (BlockHeight, sled::IVec)> = BTreeMap::new();
        for entry in self.wasm_state.scan_prefix(&scan_prefix) {
            let (entry_key, raw) = entry?;
            let Some(entry_height) = Self::height_at_suffix(&entry_key, 8) else {
                continue;
            };
            if entry_height > height {
                continue;
            }
            let logical = entry_key[key_start..entry_key.len() - 8].to_vec();
            match best.get(&logical) {
                Some((found, _)) if *found >= entry_height => {}
                _ => {
                    best.insert(logical, (entry_height, raw));
                }
            }
        }

        let mut events = Vec::with_capacity(best.len());
        for (_, (_, raw)) in best {
            events.push(Self::decode_row(&raw, DiskContext::WasmState)?);
        }
        Ok(events)
    }

    async fn get_first_wasm_state(
        &self,
        contract: &str,
        key: &[u8],
        value_equals: Option<&Value>,
        height: BlockHeight,
    ) -> Result<Option<WasmStateEvent>, IndexerError> {
        let prefix = state_key_prefix(contract, key);
        for raw in Self::versions_at_most(&self.wasm_state, &prefix, height)? {
            let event: WasmStateEvent = Self::decode_row(&raw, DiskContext::WasmState)?;
            if event.delete {
                continue;
            }
            if let Some(expected) = value_equals {
                if event.value.as_ref() != Some(expected) {
                    continue;
                }
            }
            return Ok(Some(event));
        }
        Ok(None)
    }

    async fn store_wasm_state(&self, event: &WasmStateEvent) -> Result<(), IndexerError> {
        let prefix = state_key_prefix(&event.contract_address, &event.key);
        let entry_key = Self::versioned_key(&prefix, event.block.height);
        Self::insert_json(&self.wasm_state, &entry_key, event)
    }
}
