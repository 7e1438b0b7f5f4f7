use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vantage_common::{
    block::{Block, BlockHeight},
    dependent_key::DependentKey,
};

use crate::core::error::IndexerError;

/// A persisted formula evaluation and the interval it stays valid for.
///
/// `formula` is the qualified `type:name` identifier and `args` the
/// canonical (key-sorted) JSON encoding of the arguments, so the natural
/// key `(target_address, formula, args, block.height)` is stable across
/// requests. Dependencies are kept as two lists because they match
/// differently: event keys are exact-or-prefix, transformation keys may
/// carry globs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Computation {
    pub target_address: String,
    pub formula: String,
    pub args: String,
    pub block: Block,
    pub output: Option<Value>,
    pub dependent_events: Vec<DependentKey>,
    pub dependent_transformations: Vec<DependentKey>,
    pub latest_block_height_valid: BlockHeight,
}

impl Computation {
    /// All dependencies, both families.
    pub fn dependencies(&self) -> impl Iterator<Item = &DependentKey> {
        self.dependent_events
            .iter()
            .chain(self.dependent_transformations.iter())
    }

    /// Whether `height` falls inside this computation's validity
    /// interval.
    pub fn valid_at(&self, height: BlockHeight) -> bool {
        self.block.height <= height && height <= self.latest_block_height_valid
    }
}

#[async_trait]
pub trait ComputationProvider {
    /// Most recent computation for the identity at or below `height`.
    async fn get_latest_computation(
        &self,
        target_address: &str,
        formula: &str,
        args: &str,
        height: BlockHeight,
    ) -> Result<Option<Computation>, IndexerError>;

    /// Computations with `after < block.height <= up_to`, ascending.
    async fn get_computations_in_range(
        &self,
        target_address: &str,
        formula: &str,
        args: &str,
        after: BlockHeight,
        up_to: BlockHeight,
    ) -> Result<Vec<Computation>, IndexerError>;

    /// Idempotent upsert on the natural key.
    async fn store_computation(&self, computation: &Computation) -> Result<(), IndexerError>;

    /// Overwrite `latest_block_height_valid` on the stored row. The
    /// dependency check that makes this safe lives with the evaluator;
    /// this is the raw persistence hook.
    async fn set_computation_validity(
        &self,
        target_address: &str,
        formula: &str,
        args: &str,
        block_height: BlockHeight,
        latest_block_height_valid: BlockHeight,
    ) -> Result<(), IndexerError>;

    /// Drop every stored computation for one target/formula pair (any
    /// args, any block). Returns how many rows went away.
    async fn delete_computations_for(
        &self,
        target_address: &str,
        formula: &str,
    ) -> Result<u64, IndexerError>;

    async fn delete_all_computations(&self) -> Result<u64, IndexerError>;
}
