use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vantage_common::block::{Block, BlockHeight};

use crate::core::error::IndexerError;

/// Versioned allowance between a granter and a grantee. Revocation
/// writes a new row with `active` unset rather than deleting history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeegrantAllowance {
    pub granter: String,
    pub grantee: String,
    pub block: Block,
    pub allowance: Option<Value>,
    pub active: bool,
}

#[async_trait]
pub trait FeegrantProvider {
    async fn get_feegrant_allowance(
        &self,
        granter: &str,
        grantee: &str,
        height: BlockHeight,
    ) -> Result<Option<FeegrantAllowance>, IndexerError>;

    /// Latest row per grantee for everything `granter` granted.
    async fn get_feegrant_allowances_granted(
        &self,
        granter: &str,
        height: BlockHeight,
    ) -> Result<Vec<FeegrantAllowance>, IndexerError>;

    /// Latest row per granter for everything `grantee` received.
    async fn get_feegrant_allowances_received(
        &self,
        grantee: &str,
        height: BlockHeight,
    ) -> Result<Vec<FeegrantAllowance>, IndexerError>;

    async fn store_feegrant_allowance(
        &self,
        allowance: &FeegrantAllowance,
    ) -> Result<(), IndexerError>;
}
