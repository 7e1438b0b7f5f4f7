//! Computation cache: canonical args, in-place validity extension, and
//! the range-reuse protocol.
//!
//! The single-block path reads the cache and may extend a stored row's
//! validity, but never writes new rows; only successful range
//! evaluations persist, and only after the whole range succeeded.

use log::debug;
use metrics::counter;
use serde_json::{Map, Value};
use vantage_common::{
    block::{Block, BlockHeight},
    dependent_key::DependentKey,
};

use crate::core::{
    error::IndexerError,
    registry::Formula,
    storage::{Computation, Storage},
};

use super::Engine;

/// Stable key-sorted JSON encoding; the persisted identity of a
/// formula's arguments.
pub fn canonical_args(args: &Value) -> Result<String, IndexerError> {
    Ok(serde_json::to_string(&canonicalize(args))?)
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut keys: Vec<&String> = object.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(object.len());
            for key in keys {
                if let Some(inner) = object.get(key) {
                    sorted.insert(key.clone(), canonicalize(inner));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

impl<S: Storage> Engine<S> {
    /// Extend a stored computation's validity to `up_to` iff no
    /// dependency changed in `(latest_block_height_valid, up_to]`.
    /// Never decreases the bound. Returns whether the row now covers
    /// `up_to`.
    pub async fn update_validity_up_to_block_height(
        &self,
        computation: &mut Computation,
        up_to: BlockHeight,
    ) -> Result<bool, IndexerError> {
        if up_to <= computation.latest_block_height_valid {
            return Ok(true);
        }

        let dependencies: Vec<DependentKey> = computation.dependencies().cloned().collect();
        let changed = self
            .storage()
            .first_change_for_any(
                &dependencies,
                computation.latest_block_height_valid,
                Some(up_to),
            )
            .await?;
        if changed.is_some() {
            return Ok(false);
        }

        computation.latest_block_height_valid = up_to;
        self.storage()
            .set_computation_validity(
                &computation.target_address,
                &computation.formula,
                &computation.args,
                computation.block.height,
                up_to,
            )
            .await?;
        counter!("vantage_computation_validity_extensions").increment(1);
        Ok(true)
    }

    /// Single-block evaluation behind the cache: a stored computation
    /// whose validity interval contains the target block (possibly
    /// after extension) is returned without re-running the formula.
    /// Fresh results are not persisted.
    pub async fn compute_with_cache(
        &self,
        formula: &Formula,
        target_address: &str,
        args: &Value,
        block: Block,
    ) -> Result<Computation, IndexerError> {
        if formula.dynamic {
            return self.compute(formula, target_address, args, block).await;
        }

        let args_canonical = canonical_args(args)?;
        let existing = self
            .storage()
            .get_latest_computation(target_address, &formula.id(), &args_canonical, block.height)
            .await?;

        if let Some(mut existing) = existing {
            if existing.valid_at(block.height) {
                counter!("vantage_computation_cache_hits").increment(1);
                return Ok(existing);
            }
            if self
                .update_validity_up_to_block_height(&mut existing, block.height)
                .await?
            {
                counter!("vantage_computation_cache_hits").increment(1);
                return Ok(existing);
            }
        }

        self.compute(formula, target_address, args, block).await
    }

    /// Range evaluation behind the cache, all-or-nothing reuse:
    ///
    /// 1. most recent stored piece at or below the range start, plus
    ///    every stored piece inside the range, must chain contiguously;
    /// 2. a continuous chain short of the end is first extended in
    ///    place, then recomputed from its last piece on failure;
    /// 3. anything else recomputes the whole range.
    ///
    /// Newly produced pieces are persisted (idempotent upsert) only
    /// after the evaluation succeeded.
    pub async fn compute_range_with_cache(
        &self,
        formula: &Formula,
        target_address: &str,
        args: &Value,
        block_start: Block,
        block_end: Block,
    ) -> Result<Vec<Computation>, IndexerError> {
        if formula.dynamic {
            return Err(IndexerError::DynamicOverRange(formula.id()));
        }

        let formula_id = formula.id();
        let args_canonical = canonical_args(args)?;

        let existing_start = self
            .storage()
            .get_latest_computation(
                target_address,
                &formula_id,
                &args_canonical,
                block_start.height,
            )
            .await?;

        let Some(existing_start) = existing_start else {
            return self
                .recompute_whole_range(formula, target_address, args, block_start, block_end)
                .await;
        };

        let rest = self
            .storage()
            .get_computations_in_range(
                target_address,
                &formula_id,
                &args_canonical,
                block_start.height,
                block_end.height,
            )
            .await?;

        let mut chain = Vec::with_capacity(1 + rest.len());
        chain.push(existing_start);
        chain.extend(rest);

        let continuous = chain.windows(2).all(|pair| {
            pair[0]
                .latest_block_height_valid
                .checked_add(1)
                .is_some_and(|next| next == pair[1].block.height)
        });
        if !continuous {
            debug!(
                "stored chain of {} for {} is not continuous, recomputing range",
                formula_id, target_address
            );
            return self
                .recompute_whole_range(formula, target_address, args, block_start, block_end)
                .await;
        }

        // chain is non-empty by construction
        let Some(last) = chain.last_mut() else {
            return self
                .recompute_whole_range(formula, target_address, args, block_start, block_end)
                .await;
        };

        if last.latest_block_height_valid >= block_end.height {
            counter!("vantage_computation_cache_hits").increment(1);
            return Ok(chain);
        }
        if self
            .update_validity_up_to_block_height(last, block_end.height)
            .await?
        {
            counter!("vantage_computation_cache_hits").increment(1);
            return Ok(chain);
        }

        // A dependency moved past the tail: re-evaluate from the last
        // piece's block. Its first result re-covers that block with a
        // fresh validity bound; upserting it refreshes the stored row,
        // and it replaces the stale tail in the returned series.
        let tail_start = last.block;
        let tail = self
            .compute_range(formula, target_address, args, tail_start, block_end)
            .await?;
        for piece in &tail {
            self.storage().store_computation(piece).await?;
        }

        chain.pop();
        chain.extend(tail);
        Ok(chain)
    }

    async fn recompute_whole_range(
        &self,
        formula: &Formula,
        target_address: &str,
        args: &Value,
        block_start: Block,
        block_end: Block,
    ) -> Result<Vec<Computation>, IndexerError> {
        counter!("vantage_range_recomputations").increment(1);
        let outputs = self
            .compute_range(formula, target_address, args, block_start, block_end)
            .await?;
        for piece in &outputs {
            self.storage().store_computation(piece).await?;
        }
        Ok(outputs)
    }
}
