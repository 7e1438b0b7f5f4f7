use async_trait::async_trait;
use log::trace;

use crate::core::{
    error::{DiskContext, IndexerError},
    storage::{ChainState, SledStorage, StateProvider},
};

#[async_trait]
impl StateProvider for SledStorage {
    async fn get_chain_state(&self) -> Result<Option<ChainState>, IndexerError> {
        Self::load_optional_json(&self.state, Self::chain_state_key(), DiskContext::ChainState)
    }

    async fn set_chain_state(&self, state: &ChainState) -> Result<(), IndexerError> {
        trace!(
            "set chain state {} at {}",
            state.chain_id,
            state.latest_block
        );
        Self::insert_json(&self.state, Self::chain_state_key(), state)
    }
}
