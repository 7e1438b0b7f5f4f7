use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vantage_common::block::{Block, BlockHeight};

use crate::core::error::IndexerError;

/// One versioned write to a contract's storage. Deletion tombstones are
/// first-class rows: `delete` set, `value` empty. They shadow the key
/// from their height onward until a later non-tombstone row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasmStateEvent {
    pub contract_address: String,
    #[serde(with = "hex")]
    pub key: Vec<u8>,
    pub block: Block,
    pub value: Option<Value>,
    pub delete: bool,
}

impl WasmStateEvent {
    /// The effective value this row gives its key: `None` for tombstones.
    pub fn effective_value(&self) -> Option<&Value> {
        if self.delete {
            None
        } else {
            self.value.as_ref()
        }
    }
}

#[async_trait]
pub trait WasmStateProvider {
    /// Row with the greatest height at or below `height` for the exact
    /// key, tombstones included; callers interpret the delete flag.
    async fn get_wasm_state_at_maximum_height(
        &self,
        contract: &str,
        key: &[u8],
        height: BlockHeight,
    ) -> Result<Option<WasmStateEvent>, IndexerError>;

    /// Distinct-on-key projection under a byte prefix: for every key
    /// starting with `key_prefix`, the row with the greatest height at
    /// or below `height`. Tombstones included.
    async fn get_wasm_state_map_at_maximum_height(
        &self,
        contract: &str,
        key_prefix: &[u8],
        height: BlockHeight,
    ) -> Result<Vec<WasmStateEvent>, IndexerError>;

    /// Earliest non-tombstone row at or below `height`, optionally
    /// requiring an exact value match. Reads ascending order directly;
    /// the most-recent memo shape cannot answer this.
    async fn get_first_wasm_state(
        &self,
        contract: &str,
        key: &[u8],
        value_equals: Option<&Value>,
        height: BlockHeight,
    ) -> Result<Option<WasmStateEvent>, IndexerError>;

    async fn store_wasm_state(&self, event: &WasmStateEvent) -> Result<(), IndexerError>;
}
