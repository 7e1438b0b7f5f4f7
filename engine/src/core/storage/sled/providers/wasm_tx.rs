use async_trait::async_trait;
use log::trace;
use vantage_common::block::BlockHeight;

use crate::core::{
    error::{DiskContext, IndexerError},
    storage::{SledStorage, WasmTxEvent, WasmTxProvider},
};

// lp(contract) || be64(height) || be32(tx_index)
fn tx_entry_key(contract: &str, height: BlockHeight, tx_index: u32) -> Vec<u8> {
    let mut key = SledStorage::len_prefixed_key(&[contract.as_bytes()]);
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(&tx_index.to_be_bytes());
    key
}

#[async_trait]
impl WasmTxProvider for SledStorage {
    async fn get_wasm_txs(
        &self,
        contract: &str,
        height: BlockHeight,
        action: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<WasmTxEvent>, IndexerError> {
        trace!("get wasm txs for {} at maximum height {}", contract, height);
        let prefix = SledStorage::len_prefixed_key(&[contract.as_bytes()]);

        let mut events = Vec::new();
        // Reverse scan yields (height, tx_index) descending
        for entry in self.wasm_txs.scan_prefix(&prefix).rev() {
            let (entry_key, raw) = entry?;
            let Some(entry_height) = Self::height_at_suffix(&entry_key, 12) else {
                continue;
            };
            if entry_height > height {
                continue;
            }
            let event: WasmTxEvent = Self::decode_row(&raw, DiskContext::WasmTx)?;
            if let Some(wanted) = action {
                if event.action.as_deref() != Some(wanted) {
                    continue;
                }
            }
            events.push(event);
            if limit.is_some_and(|bound| events.len() >= bound) {
                break;
            }
        }
        Ok(events)
    }

    async fn store_wasm_tx(&self, event: &WasmTxEvent) -> Result<(), IndexerError> {
        let key = tx_entry_key(&event.contract_address, event.block.height, event.tx_index);
        Self::insert_json(&self.wasm_txs, &key, event)
    }
}
