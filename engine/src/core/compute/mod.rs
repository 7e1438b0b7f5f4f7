//! The evaluators: one formula at one block, and piecewise evaluation
//! across a block range with dependency-driven skip-ahead.

pub mod cache;
mod env;
pub mod range;

pub use env::{Environment, Event, OnFetch, PrefetchRequest};

use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use metrics::counter;
use serde_json::Value;
use tokio::task::JoinHandle;
use vantage_common::{
    block::{Block, BlockHeight},
    dependent_key::DependentKey,
    time::TimestampMillis,
};

use crate::config::EngineConfig;
use crate::core::{
    error::IndexerError,
    registry::{self, Formula, FormulaType},
    state::ChainStateCache,
    storage::{Computation, Storage},
};

use self::cache::canonical_args;
use self::range::{process_computation_range, RangeGrid, RangeSample};

/// Which chain state a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSelector {
    Block(BlockHeight),
    Blocks(BlockHeight, BlockHeight),
    Time(TimestampMillis),
    Times(TimestampMillis, TimestampMillis),
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub formula_type: FormulaType,
    pub address: String,
    pub formula: String,
    pub args: Value,
    pub selector: BlockSelector,
    pub block_step: Option<u64>,
    pub time_step: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResponse {
    Single { block: Block, value: Option<Value> },
    Series(Vec<RangeSample>),
}

/// The compute engine: request-scoped evaluations over one shared
/// storage handle and one chain-state snapshot.
pub struct Engine<S: Storage> {
    storage: Arc<S>,
    config: Arc<EngineConfig>,
    state: ChainStateCache,
    on_fetch: Option<OnFetch>,
}

impl<S: Storage> Engine<S> {
    pub fn new(storage: Arc<S>, config: EngineConfig) -> Self {
        Self {
            storage,
            config: Arc::new(config),
            state: ChainStateCache::new(),
            on_fetch: None,
        }
    }

    /// Install the per-read side-effect hook (credit accrual and the
    /// like). It never influences results.
    pub fn with_on_fetch(mut self, on_fetch: OnFetch) -> Self {
        self.on_fetch = Some(on_fetch);
        self
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn state_cache(&self) -> &ChainStateCache {
        &self.state
    }

    /// Start the chain-state refresher at the configured cadence.
    pub fn spawn_state_refresher(&self) -> JoinHandle<()> {
        let interval = Duration::from_millis(self.config.state_refresh_interval_ms);
        self.state.spawn_refresher(self.storage.clone(), interval)
    }

    /// §6 entry point: resolve the formula, map the selector to
    /// blocks, evaluate, and shape the output.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse, IndexerError> {
        let formula = registry::resolve(request.formula_type, &request.formula)?;
        trace!("query {} for {}", formula.id(), request.address);

        if let Some(step) = request.block_step.or(request.time_step) {
            if step == 0 {
                return Err(IndexerError::InvalidStep);
            }
        }

        match request.selector {
            BlockSelector::Block(height) => {
                let block = self
                    .storage
                    .get_block_at_or_below_height(height)
                    .await?
                    .ok_or(IndexerError::BlockNotFound(height))?;
                let computation = self
                    .compute_with_cache(formula, &request.address, &request.args, block)
                    .await?;
                Ok(QueryResponse::Single {
                    block: computation.block,
                    value: computation.output,
                })
            }

            BlockSelector::Time(time) => {
                let block = self
                    .storage
                    .get_block_at_or_below_time(time)
                    .await?
                    .ok_or(IndexerError::BlockNotFoundForTime(time))?;
                let computation = self
                    .compute_with_cache(formula, &request.address, &request.args, block)
                    .await?;
                Ok(QueryResponse::Single {
                    block: computation.block,
                    value: computation.output,
                })
            }

            BlockSelector::Blocks(start, end) => {
                if start >= end {
                    return Err(IndexerError::InvalidRange(start, end));
                }
                let start_block = self
                    .storage
                    .get_block_at_or_below_height(start)
                    .await?
                    .ok_or(IndexerError::BlockNotFound(start))?;
                let end_block = self
                    .storage
                    .get_block_at_or_below_height(end)
                    .await?
                    .ok_or(IndexerError::BlockNotFound(end))?;

                let outputs = self
                    .compute_range_with_cache(
                        formula,
                        &request.address,
                        &request.args,
                        start_block,
                        end_block,
                    )
                    .await?;
                let samples = process_computation_range(
                    &outputs,
                    &RangeGrid {
                        blocks: (start_block, end_block),
                        times: (start_block.timestamp, end_block.timestamp),
                        block_step: request.block_step,
                        time_step: request.time_step,
                    },
                )?;
                Ok(QueryResponse::Series(samples))
            }

            BlockSelector::Times(start, end) => {
                if start >= end {
                    return Err(IndexerError::InvalidRange(start, end));
                }
                // The range may begin before the chain does; fall
                // forward to the first block in that case.
                let start_block = match self.storage.get_block_at_or_below_time(start).await? {
                    Some(block) => block,
                    None => self
                        .storage
                        .get_block_at_or_after_time(start)
                        .await?
                        .ok_or(IndexerError::BlockNotFoundForTime(start))?,
                };
                let end_block = self
                    .storage
                    .get_block_at_or_below_time(end)
                    .await?
                    .ok_or(IndexerError::BlockNotFoundForTime(end))?;
                if end_block.height < start_block.height {
                    return Err(IndexerError::InvalidRange(start, end));
                }

                let outputs = self
                    .compute_range_with_cache(
                        formula,
                        &request.address,
                        &request.args,
                        start_block,
                        end_block,
                    )
                    .await?;
                let samples = process_computation_range(
                    &outputs,
                    &RangeGrid {
                        blocks: (start_block, end_block),
                        times: (start, end),
                        block_step: request.block_step,
                        time_step: request.time_step,
                    },
                )?;
                Ok(QueryResponse::Series(samples))
            }
        }
    }

    /// Single-block evaluation (no cache): run the formula, then
    /// compute how far the result stays valid.
    pub async fn compute(
        &self,
        formula: &Formula,
        target_address: &str,
        args: &Value,
        block: Block,
    ) -> Result<Computation, IndexerError> {
        let (output, dependent_events, dependent_transformations) =
            self.evaluate(formula, target_address, args, block).await?;

        let mut dependencies = dependent_events.clone();
        dependencies.extend(dependent_transformations.iter().cloned());
        let latest_block_height_valid = match self
            .storage
            .first_change_for_any(&dependencies, block.height, None)
            .await?
        {
            Some(changed) => changed - 1,
            None => self.latest_known_height().await.max(block.height),
        };

        Ok(Computation {
            target_address: target_address.to_string(),
            formula: formula.id(),
            args: canonical_args(args)?,
            block,
            output,
            dependent_events,
            dependent_transformations,
            latest_block_height_valid,
        })
    }

    /// Piecewise evaluation over `[block_start, block_end]`: evaluate,
    /// extend the piece to the last unchanged block, jump the cursor
    /// to the next change, repeat. Validity is capped at the range end.
    pub async fn compute_range(
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
        if block_start.height > block_end.height {
            return Err(IndexerError::InvalidRange(
                block_start.height,
                block_end.height,
            ));
        }

        let args_canonical = canonical_args(args)?;
        let mut outputs = Vec::new();
        let mut cursor = block_start;
        loop {
            let (output, dependent_events, dependent_transformations) =
                self.evaluate(formula, target_address, args, cursor).await?;

            let mut dependencies = dependent_events.clone();
            dependencies.extend(dependent_transformations.iter().cloned());
            let next_change = self
                .storage
                .first_change_for_any(&dependencies, cursor.height, Some(block_end.height))
                .await?;

            let latest_block_height_valid = match next_change {
                Some(changed) => changed - 1,
                None => block_end.height,
            };
            outputs.push(Computation {
                target_address: target_address.to_string(),
                formula: formula.id(),
                args: args_canonical.clone(),
                block: cursor,
                output,
                dependent_events,
                dependent_transformations,
                latest_block_height_valid,
            });

            let Some(next_height) = next_change else {
                break;
            };
            cursor = self
                .storage
                .get_block_at_or_below_height(next_height)
                .await?
                .filter(|block| block.height > cursor.height)
                .ok_or(IndexerError::BlockNotFound(next_height))?;
        }

        debug!(
            "computed {} range pieces of {} for {} over [{}, {}]",
            outputs.len(),
            formula.id(),
            target_address,
            block_start.height,
            block_end.height
        );
        Ok(outputs)
    }

    // Run the formula inside a fresh environment and hand back output
    // plus the recorded dependency families.
    async fn evaluate(
        &self,
        formula: &Formula,
        target_address: &str,
        args: &Value,
        block: Block,
    ) -> Result<(Option<Value>, Vec<DependentKey>, Vec<DependentKey>), IndexerError> {
        self.check_applicability(formula, target_address).await?;
        counter!("vantage_formula_evaluations").increment(1);

        let chain_id = self.chain_id().await?;
        let mut env = Environment::new(
            self.storage.clone(),
            self.config.clone(),
            chain_id,
            target_address.to_string(),
            block,
            args.clone(),
            !formula.dynamic,
            self.on_fetch.clone(),
        );

        let output = match formula.run(&mut env).await {
            Ok(output) => output,
            Err(source) => return Err(classify_formula_error(formula, source)),
        };

        let (dependent_events, dependent_transformations) = env.into_dependencies();
        Ok((output, dependent_events, dependent_transformations))
    }

    /// Pre-flight typed-address checks: the target must exist for
    /// contract and validator formulas, and a contract must satisfy
    /// the formula's code-id filter.
    async fn check_applicability(
        &self,
        formula: &Formula,
        target_address: &str,
    ) -> Result<(), IndexerError> {
        match formula.formula_type {
            FormulaType::Contract => {
                let contract = self
                    .storage
                    .get_contract(target_address)
                    .await?
                    .ok_or_else(|| IndexerError::ContractNotFound(target_address.to_string()))?;
                if !formula.code_ids_keys.is_empty() {
                    let allowed = self.config.resolve_code_ids(formula.code_ids_keys);
                    if !allowed.contains(&contract.code_id) {
                        return Err(IndexerError::FormulaNotApplicable {
                            formula: formula.id(),
                            address: target_address.to_string(),
                        });
                    }
                }
                Ok(())
            }
            FormulaType::Validator => {
                self.storage
                    .get_validator(target_address)
                    .await?
                    .ok_or_else(|| {
                        IndexerError::ValidatorNotFound(target_address.to_string())
                    })?;
                Ok(())
            }
            FormulaType::Account | FormulaType::Generic => Ok(()),
        }
    }

    async fn chain_id(&self) -> Result<String, IndexerError> {
        if let Some(state) = self.state.current().await {
            return Ok(state.chain_id);
        }
        // Cold start: the refresher has not ticked yet
        let state = self
            .storage
            .get_chain_state()
            .await?
            .ok_or(IndexerError::ChainStateNotFound)?;
        Ok(state.chain_id)
    }

    async fn latest_known_height(&self) -> BlockHeight {
        if let Some(block) = self.state.latest_block().await {
            return block.height;
        }
        match self.storage.get_chain_state().await {
            Ok(Some(state)) => state.latest_block.height,
            _ => 0,
        }
    }
}

// Failures raised inside a formula are the requester's problem and
// surface verbatim; transport and internal errors that merely passed
// through the formula keep their own classification.
fn classify_formula_error(formula: &Formula, source: anyhow::Error) -> IndexerError {
    match source.downcast::<IndexerError>() {
        Ok(inner) if !inner.is_user_error() => inner,
        Ok(inner) => IndexerError::FormulaFailed {
            formula: formula.id(),
            source: inner.into(),
        },
        Err(source) => IndexerError::FormulaFailed {
            formula: formula.id(),
            source,
        },
    }
}
