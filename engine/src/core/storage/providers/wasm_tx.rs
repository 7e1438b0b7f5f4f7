use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vantage_common::block::{Block, BlockHeight};

use crate::core::error::IndexerError;

/// One executed message against a contract. Several can land in the
/// same block; `tx_index` keeps them ordered and unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasmTxEvent {
    pub contract_address: String,
    pub block: Block,
    pub tx_index: u32,
    pub action: Option<String>,
    pub msg: Value,
}

#[async_trait]
pub trait WasmTxProvider {
    /// Executions against `contract` at or below `height`, descending
    /// by `(height, tx_index)`, optionally filtered on action.
    async fn get_wasm_txs(
        &self,
        contract: &str,
        height: BlockHeight,
        action: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<WasmTxEvent>, IndexerError>;

    async fn store_wasm_tx(&self, event: &WasmTxEvent) -> Result<(), IndexerError>;
}
