use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vantage_common::block::{Block, BlockHeight};

use crate::core::error::IndexerError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub operator_address: String,
}

/// A slash registered against a validator. `registered_block` is where
/// the slash landed on chain; the infraction itself is usually earlier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashEvent {
    pub validator_operator_address: String,
    pub registered_block: Block,
    pub infraction_block_height: BlockHeight,
    pub slash_factor: String,
    pub amount_slashed: String,
}

#[async_trait]
pub trait StakingProvider {
    async fn get_validator(&self, operator_address: &str)
        -> Result<Option<Validator>, IndexerError>;

    async fn store_validator(&self, validator: &Validator) -> Result<(), IndexerError>;

    /// Slashes registered at or below `height`, descending by
    /// registered height.
    async fn get_slash_events(
        &self,
        operator_address: &str,
        height: BlockHeight,
    ) -> Result<Vec<SlashEvent>, IndexerError>;

    async fn store_slash_event(&self, event: &SlashEvent) -> Result<(), IndexerError>;
}
