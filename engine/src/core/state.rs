//! Process-wide chain-state snapshot.
//!
//! Evaluators need the indexer's visible block height constantly but
//! must not re-read the singleton row per request; a shared snapshot
//! refreshed on a timer is the freshness promise the engine makes.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use vantage_common::block::Block;

use crate::core::{
    error::IndexerError,
    storage::{ChainState, Storage},
};

#[derive(Clone, Default)]
pub struct ChainStateCache {
    inner: Arc<RwLock<Option<ChainState>>>,
}

impl ChainStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-read the singleton row. On failure the previous snapshot
    /// stays in place.
    pub async fn refresh<S: Storage>(&self, storage: &S) -> Result<(), IndexerError> {
        let state = storage.get_chain_state().await?;
        if let Some(state) = &state {
            debug!(
                "refreshed chain state: {} at {}",
                state.chain_id, state.latest_block
            );
        }
        *self.inner.write().await = state;
        Ok(())
    }

    pub async fn current(&self) -> Option<ChainState> {
        self.inner.read().await.clone()
    }

    pub async fn latest_block(&self) -> Option<Block> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|state| state.latest_block)
    }

    /// Background task refreshing the snapshot on `interval` until the
    /// handle is dropped or aborted.
    pub fn spawn_refresher<S: Storage>(
        &self,
        storage: Arc<S>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = cache.refresh(storage.as_ref()).await {
                    warn!("failed to refresh chain state: {:#}", anyhow::Error::from(err));
                }
            }
        })
    }
}
