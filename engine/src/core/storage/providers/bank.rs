use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use vantage_common::block::{Block, BlockHeight};

use crate::core::error::IndexerError;

/// Latest-snapshot balances for one address: exactly one row per
/// address, replaced in place by the exporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankBalance {
    pub address: String,
    pub block: Block,
    /// denom -> integer amount, exporter order preserved
    pub balances: IndexMap<String, String>,
}

/// Per-denom balance history row. Only written for contracts whose
/// code-id key is in the configured bank-history set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankStateEvent {
    pub address: String,
    pub denom: String,
    pub block: Block,
    pub balance: String,
}

#[async_trait]
pub trait BankProvider {
    /// The snapshot row, whatever height it was taken at. The caller
    /// decides whether its height fits under the target block.
    async fn get_bank_balance(&self, address: &str)
        -> Result<Option<BankBalance>, IndexerError>;

    async fn set_bank_balance(&self, balance: &BankBalance) -> Result<(), IndexerError>;

    async fn get_bank_state_at_maximum_height(
        &self,
        address: &str,
        denom: &str,
        height: BlockHeight,
    ) -> Result<Option<BankStateEvent>, IndexerError>;

    /// Distinct-on-denom projection with greatest height per denom.
    async fn get_bank_state_map_at_maximum_height(
        &self,
        address: &str,
        height: BlockHeight,
    ) -> Result<Vec<BankStateEvent>, IndexerError>;

    async fn store_bank_state(&self, event: &BankStateEvent) -> Result<(), IndexerError>;
}
