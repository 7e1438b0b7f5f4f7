//! The capability object handed to a formula.
//!
//! Every getter records its dependent key *before* touching the store,
//! so a read that finds nothing still leaves a dependency behind: the
//! future appearance of that key has to invalidate the result. Reads
//! go through a per-evaluation memo keyed on the dependent key; the
//! memo is never shared between evaluations (durable reuse is the
//! computation cache's job).

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use indexmap::{IndexMap, IndexSet};
use log::trace;
use serde_json::Value;
use vantage_common::{
    block::Block,
    dependent_key::{DependentKey, Namespace, EITHER_PARTY},
    key::{compose_key, compose_key_prefix, decode_map_key, trailing_segment, MapKeyType},
    time::{wall_clock_unix_ms, TimestampMillis},
};

use crate::config::EngineConfig;
use crate::core::{
    error::IndexerError,
    storage::{
        BankStateEvent, Contract, FeegrantAllowance, GovProposalVote, NamePattern, SlashEvent,
        Storage, TransformationEvent, WasmStateEvent, WasmTxEvent,
    },
};

/// Side-effect hook invoked with the row count of every positive read.
/// Must never influence returned values.
pub type OnFetch = Arc<dyn Fn(u64) + Send + Sync>;

/// Memoised rows, tagged by family so a memo hit under the wrong
/// namespace is a hard error instead of a silent misread.
#[derive(Debug, Clone)]
pub enum Event {
    WasmState(WasmStateEvent),
    Transformation(TransformationEvent),
    BankSnapshotAmount { denom: String, amount: String },
    BankState(BankStateEvent),
    Proposal { proposal_id: u64, data: Value },
    ProposalVote(GovProposalVote),
    CommunityPool(IndexMap<String, String>),
    Extraction(Value),
    Feegrant(FeegrantAllowance),
}

// events: memo key -> None (tried, nothing there) | Some(rows).
// An absent map entry means the key was never tried.
#[derive(Default)]
struct EvaluationCache {
    events: HashMap<String, Option<Vec<Event>>>,
    contracts: HashMap<String, Option<Contract>>,
}

/// A point or prefix wasm-state load for [`Environment::prefetch`].
pub struct PrefetchRequest<'a> {
    pub segments: &'a [&'a [u8]],
    pub prefix: bool,
}

pub struct Environment {
    storage: Arc<dyn Storage>,
    config: Arc<EngineConfig>,
    chain_id: String,
    target_address: String,
    block: Block,
    use_block_date: bool,
    args: Value,
    now: TimestampMillis,
    on_fetch: Option<OnFetch>,
    dependencies: Vec<DependentKey>,
    cache: EvaluationCache,
}

impl Environment {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        storage: Arc<dyn Storage>,
        config: Arc<EngineConfig>,
        chain_id: String,
        target_address: String,
        block: Block,
        args: Value,
        use_block_date: bool,
        on_fetch: Option<OnFetch>,
    ) -> Self {
        Self {
            storage,
            config,
            chain_id,
            target_address,
            block,
            use_block_date,
            args,
            now: wall_clock_unix_ms(),
            on_fetch,
            dependencies: Vec::new(),
            cache: EvaluationCache::default(),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// The contract, validator, or account the query targets.
    pub fn target_address(&self) -> &str {
        &self.target_address
    }

    pub fn block(&self) -> Block {
        self.block
    }

    /// The evaluation's notion of "now": the target block's time, or
    /// the wall clock captured at construction. Only `dynamic`
    /// formulas may observe the difference.
    pub fn date(&self) -> TimestampMillis {
        if self.use_block_date {
            self.block.timestamp
        } else {
            self.now
        }
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    pub fn arg_str(&self, name: &str) -> Result<&str, anyhow::Error> {
        self.args
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("missing required string argument {:?}", name))
    }

    pub fn arg_u64(&self, name: &str) -> Result<u64, anyhow::Error> {
        let value = self
            .args
            .get(name)
            .ok_or_else(|| anyhow!("missing required numeric argument {:?}", name))?;
        match value {
            Value::Number(number) => number
                .as_u64()
                .ok_or_else(|| anyhow!("argument {:?} is not an unsigned integer", name)),
            Value::String(raw) => raw
                .parse()
                .map_err(|_| anyhow!("argument {:?} is not an unsigned integer", name)),
            _ => Err(anyhow!("argument {:?} is not an unsigned integer", name)),
        }
    }

    pub fn opt_arg_u64(&self, name: &str) -> Result<Option<u64>, anyhow::Error> {
        if self.args.get(name).is_none() {
            return Ok(None);
        }
        self.arg_u64(name).map(Some)
    }

    /// Recorded dependencies, deduplicated, split into the two
    /// persisted families.
    pub(crate) fn into_dependencies(self) -> (Vec<DependentKey>, Vec<DependentKey>) {
        let mut events: IndexSet<DependentKey> = IndexSet::new();
        let mut transformations: IndexSet<DependentKey> = IndexSet::new();
        for key in self.dependencies {
            if key.is_transformation() {
                transformations.insert(key);
            } else {
                events.insert(key);
            }
        }
        (
            events.into_iter().collect(),
            transformations.into_iter().collect(),
        )
    }

    // Record before fetch; returns the memo key.
    fn record(&mut self, key: DependentKey) -> String {
        let memo = memo_key(&key);
        trace!("record dependency {}", key);
        self.dependencies.push(key);
        memo
    }

    fn notify_fetch(&self, rows: u64) {
        if rows > 0 {
            if let Some(hook) = &self.on_fetch {
                hook(rows);
            }
        }
    }

    // ---- wasm state ----

    /// Point read of contract state by composed key, parsed as JSON.
    pub async fn get(
        &mut self,
        contract: &str,
        key_segments: &[&[u8]],
    ) -> Result<Option<Value>, IndexerError> {
        let key = compose_key(key_segments)?;
        let event = self.wasm_state_event(contract, &key).await?;
        Ok(event.and_then(|event| event.effective_value().cloned()))
    }

    /// Time of the most recent write (tombstones count as writes).
    pub async fn get_date_key_modified(
        &mut self,
        contract: &str,
        key_segments: &[&[u8]],
    ) -> Result<Option<TimestampMillis>, IndexerError> {
        let key = compose_key(key_segments)?;
        let event = self.wasm_state_event(contract, &key).await?;
        Ok(event.map(|event| event.block.timestamp))
    }

    /// Time of the first non-deleted write. Ascending read straight
    /// against the store; the most-recent memo cannot answer it.
    pub async fn get_date_key_first_set(
        &mut self,
        contract: &str,
        key_segments: &[&[u8]],
    ) -> Result<Option<TimestampMillis>, IndexerError> {
        self.date_key_first_set(contract, key_segments, None).await
    }

    /// Same, filtered to the first write of exactly `value`.
    pub async fn get_date_key_first_set_with_value_match(
        &mut self,
        contract: &str,
        key_segments: &[&[u8]],
        value: &Value,
    ) -> Result<Option<TimestampMillis>, IndexerError> {
        self.date_key_first_set(contract, key_segments, Some(value))
            .await
    }

    async fn date_key_first_set(
        &mut self,
        contract: &str,
        key_segments: &[&[u8]],
        value: Option<&Value>,
    ) -> Result<Option<TimestampMillis>, IndexerError> {
        let key = compose_key(key_segments)?;
        self.record(DependentKey::wasm_state_exact(contract, &key));
        let event = self
            .storage
            .get_first_wasm_state(contract, &key, value, self.block.height)
            .await?;
        self.notify_fetch(event.iter().count() as u64);
        Ok(event.map(|event| event.block.timestamp))
    }

    /// Prefix read decoded into a map keyed by the trailing segment.
    /// Tombstoned keys are omitted.
    pub async fn get_map(
        &mut self,
        contract: &str,
        prefix_segments: &[&[u8]],
        key_type: MapKeyType,
    ) -> Result<IndexMap<String, Value>, IndexerError> {
        let prefix = compose_key_prefix(prefix_segments)?;
        let events = self.wasm_state_prefix_events(contract, &prefix).await?;

        let mut map = IndexMap::with_capacity(events.len());
        for event in events {
            let Some(value) = event.effective_value() else {
                continue;
            };
            let Some(trailing) = trailing_segment(&event.key, &prefix) else {
                continue;
            };
            map.insert(decode_map_key(trailing, key_type)?, value.clone());
        }
        Ok(map)
    }

    /// Batch loader seeding the per-evaluation memo, misses included,
    /// so everything after it is served from memory.
    pub async fn prefetch(
        &mut self,
        contract: &str,
        requests: &[PrefetchRequest<'_>],
    ) -> Result<(), IndexerError> {
        for request in requests {
            if request.prefix {
                let prefix = compose_key_prefix(request.segments)?;
                self.wasm_state_prefix_events(contract, &prefix).await?;
            } else {
                let key = compose_key(request.segments)?;
                self.wasm_state_event(contract, &key).await?;
            }
        }
        Ok(())
    }

    async fn wasm_state_event(
        &mut self,
        contract: &str,
        key: &[u8],
    ) -> Result<Option<WasmStateEvent>, IndexerError> {
        let memo = self.record(DependentKey::wasm_state_exact(contract, key));

        if let Some(cached) = self.cache.events.get(&memo) {
            return match cached {
                None => Ok(None),
                Some(rows) => match rows.first() {
                    Some(Event::WasmState(event)) => Ok(Some(event.clone())),
                    Some(_) => Err(IndexerError::EventTypeMismatch(Namespace::WasmState)),
                    None => Ok(None),
                },
            };
        }
        // A prefetched prefix covering this key also answers it
        if let Some(found) = self.wasm_state_from_prefetched(contract, key) {
            return Ok(found);
        }

        let event = self
            .storage
            .get_wasm_state_at_maximum_height(contract, key, self.block.height)
            .await?;
        self.notify_fetch(event.iter().count() as u64);
        self.cache.events.insert(
            memo,
            event.clone().map(|event| vec![Event::WasmState(event)]),
        );
        Ok(event)
    }

    async fn wasm_state_prefix_events(
        &mut self,
        contract: &str,
        prefix: &[u8],
    ) -> Result<Vec<WasmStateEvent>, IndexerError> {
        let memo = self.record(DependentKey::wasm_state_prefix(contract, prefix));

        if let Some(cached) = self.cache.events.get(&memo) {
            let rows = cached.as_deref().unwrap_or(&[]);
            let mut events = Vec::with_capacity(rows.len());
            for row in rows {
                match row {
                    Event::WasmState(event) => events.push(event.clone()),
                    _ => return Err(IndexerError::EventTypeMismatch(Namespace::WasmState)),
                }
            }
            return Ok(events);
        }

        let events = self
            .storage
            .get_wasm_state_map_at_maximum_height(contract, prefix, self.block.height)
            .await?;
        self.notify_fetch(events.len() as u64);
        let rows = if events.is_empty() {
            None
        } else {
            Some(events.iter().cloned().map(Event::WasmState).collect())
        };
        self.cache.events.insert(memo, rows);
        Ok(events)
    }

    // Serve an exact key from any prefetched prefix entry that covers
    // it. A covering negative entry is itself an answer: the whole
    // prefix was loaded, so absence means no row.
    fn wasm_state_from_prefetched(
        &self,
        contract: &str,
        key: &[u8],
    ) -> Option<Option<WasmStateEvent>> {
        let key_hex = hex::encode(key);
        let entry_prefix = format!("p:{}:{}:", Namespace::WasmState, contract);
        for (memo, rows) in &self.cache.events {
            let Some(prefix_hex) = memo.strip_prefix(&entry_prefix) else {
                continue;
            };
            if !key_hex.starts_with(prefix_hex) {
                continue;
            }
            return match rows {
                None => Some(None),
                Some(rows) => Some(rows.iter().find_map(|row| match row {
                    Event::WasmState(event) if event.key == key => Some(event.clone()),
                    _ => None,
                })),
            };
        }
        None
    }

    // ---- transformations ----

    /// Most-recent transformations matching a name glob, optionally
    /// bound to one contract and filtered to a code-id set. `null`
    /// values are absent and dropped; code-id filtering happens after
    /// the read because the memo is keyed on the pattern alone.
    pub async fn get_transformation_matches(
        &mut self,
        contract: Option<&str>,
        name_pattern: &str,
        where_value: Option<&Value>,
        code_ids_keys: Option<&[&str]>,
        limit: Option<usize>,
    ) -> Result<Vec<TransformationEvent>, IndexerError> {
        let events = self.transformation_events(contract, name_pattern).await?;

        let allowed = match code_ids_keys {
            Some(keys) => Some(self.config.resolve_code_ids(keys)),
            None => None,
        };

        let mut matches = Vec::new();
        for event in events {
            if event.value.is_none() {
                continue;
            }
            if let Some(expected) = where_value {
                if event.value.as_ref() != Some(expected) {
                    continue;
                }
            }
            if let Some(allowed) = &allowed {
                let Some(found) = self.contract(&event.contract_address).await? else {
                    continue;
                };
                if !allowed.contains(&found.code_id) {
                    continue;
                }
            }
            matches.push(event);
            if limit.is_some_and(|bound| matches.len() >= bound) {
                break;
            }
        }
        Ok(matches)
    }

    /// First transformation matching the pattern, if any.
    pub async fn get_transformation_match(
        &mut self,
        contract: Option<&str>,
        name_pattern: &str,
        code_ids_keys: Option<&[&str]>,
    ) -> Result<Option<TransformationEvent>, IndexerError> {
        let mut matches = self
            .get_transformation_matches(contract, name_pattern, None, code_ids_keys, Some(1))
            .await?;
        let result = matches.drain(..).next();
        Ok(result)
    }

    /// Most-recent transformations under `name_prefix:`, keyed by the
    /// name remainder; unset (`null`) names omitted.
    pub async fn get_transformation_map(
        &mut self,
        contract: &str,
        name_prefix: &str,
    ) -> Result<IndexMap<String, Value>, IndexerError> {
        let full_prefix = format!("{}:", name_prefix);
        let memo = self.record(DependentKey::transformation_prefix(contract, &full_prefix));

        let events: Vec<TransformationEvent> =
            if let Some(cached) = self.cache.events.get(&memo) {
                let rows = cached.as_deref().unwrap_or(&[]);
                let mut events = Vec::with_capacity(rows.len());
                for row in rows {
                    match row {
                        Event::Transformation(event) => events.push(event.clone()),
                        _ => {
                            return Err(IndexerError::EventTypeMismatch(
                                Namespace::WasmTransformation,
                            ))
                        }
                    }
                }
                events
            } else {
                let events = self
                    .storage
                    .get_transformation_map(contract, &full_prefix, self.block.height)
                    .await?;
                self.notify_fetch(events.len() as u64);
                let rows = if events.is_empty() {
                    None
                } else {
                    Some(events.iter().cloned().map(Event::Transformation).collect())
                };
                self.cache.events.insert(memo, rows);
                events
            };

        let mut map = IndexMap::with_capacity(events.len());
        for event in events {
            let Some(value) = &event.value else {
                continue;
            };
            if let Some(suffix) = event.name.strip_prefix(&full_prefix) {
                map.insert(suffix.to_string(), value.clone());
            }
        }
        Ok(map)
    }

    /// Time of the first transformation write for the exact name.
    /// Ascending read, no memo.
    pub async fn get_date_first_transformed(
        &mut self,
        contract: &str,
        name: &str,
    ) -> Result<Option<TimestampMillis>, IndexerError> {
        self.record(DependentKey::transformation_pattern(Some(contract), name));
        let event = self
            .storage
            .get_first_transformation(contract, name, self.block.height)
            .await?;
        self.notify_fetch(event.iter().count() as u64);
        Ok(event.map(|event| event.block.timestamp))
    }

    /// Seed the memo for a set of transformation name prefixes.
    pub async fn prefetch_transformations(
        &mut self,
        contract: &str,
        name_prefixes: &[&str],
    ) -> Result<(), IndexerError> {
        for name_prefix in name_prefixes {
            self.get_transformation_map(contract, name_prefix).await?;
        }
        Ok(())
    }

    async fn transformation_events(
        &mut self,
        contract: Option<&str>,
        name_pattern: &str,
    ) -> Result<Vec<TransformationEvent>, IndexerError> {
        let memo = self.record(DependentKey::transformation_pattern(contract, name_pattern));

        if let Some(cached) = self.cache.events.get(&memo) {
            let rows = cached.as_deref().unwrap_or(&[]);
            let mut events = Vec::with_capacity(rows.len());
            for row in rows {
                match row {
                    Event::Transformation(event) => events.push(event.clone()),
                    _ => {
                        return Err(IndexerError::EventTypeMismatch(
                            Namespace::WasmTransformation,
                        ))
                    }
                }
            }
            return Ok(events);
        }

        let pattern = NamePattern::new(name_pattern)?;
        let events = self
            .storage
            .get_transformations_matching(contract, &pattern, self.block.height, None)
            .await?;
        self.notify_fetch(events.len() as u64);
        let rows = if events.is_empty() {
            None
        } else {
            Some(events.iter().cloned().map(Event::Transformation).collect())
        };
        self.cache.events.insert(memo, rows);
        Ok(events)
    }

    // ---- contracts ----

    /// The contract record, filtered to a code-id set when given.
    /// Contract rows are immutable, so no dependency is recorded.
    pub async fn get_contract(
        &mut self,
        address: &str,
        code_ids_keys: Option<&[&str]>,
    ) -> Result<Option<Contract>, IndexerError> {
        let contract = self.contract(address).await?;
        match (contract, code_ids_keys) {
            (Some(found), Some(keys)) => {
                let allowed = self.config.resolve_code_ids(keys);
                Ok(allowed.contains(&found.code_id).then_some(found))
            }
            (found, None) => Ok(found),
            (None, Some(_)) => Ok(None),
        }
    }

    pub async fn contract_matches_code_ids_keys(
        &mut self,
        address: &str,
        code_ids_keys: &[&str],
    ) -> Result<bool, IndexerError> {
        Ok(self
            .get_contract(address, Some(code_ids_keys))
            .await?
            .is_some())
    }

    /// First configured code-id key containing the contract's code id.
    pub async fn get_code_id_key_for_contract(
        &mut self,
        address: &str,
    ) -> Result<Option<String>, IndexerError> {
        let Some(contract) = self.contract(address).await? else {
            return Ok(None);
        };
        Ok(self
            .config
            .code_id_key_for(contract.code_id)
            .map(str::to_string))
    }

    async fn contract(&mut self, address: &str) -> Result<Option<Contract>, IndexerError> {
        if let Some(cached) = self.cache.contracts.get(address) {
            return Ok(cached.clone());
        }
        let contract = self.storage.get_contract(address).await?;
        self.notify_fetch(contract.iter().count() as u64);
        self.cache
            .contracts
            .insert(address.to_string(), contract.clone());
        Ok(contract)
    }

    // ---- bank ----

    /// Balance of one denom. Prefers the latest snapshot when its
    /// height fits under the target block; falls back to per-denom
    /// history only for contracts in the tracked code-id set.
    pub async fn get_balance(
        &mut self,
        address: &str,
        denom: &str,
    ) -> Result<Option<String>, IndexerError> {
        let memo = self.record(DependentKey::bank_denom(address, denom));

        if let Some(cached) = self.cache.events.get(&memo) {
            return match cached {
                None => Ok(None),
                Some(rows) => match rows.first() {
                    Some(Event::BankSnapshotAmount { amount, .. }) => Ok(Some(amount.clone())),
                    Some(Event::BankState(event)) => Ok(Some(event.balance.clone())),
                    Some(_) => Err(IndexerError::EventTypeMismatch(Namespace::Bank)),
                    None => Ok(None),
                },
            };
        }

        if let Some(snapshot) = self.usable_bank_snapshot(address).await? {
            let amount = snapshot.get(denom).cloned();
            self.cache.events.insert(
                memo,
                amount.clone().map(|amount| {
                    vec![Event::BankSnapshotAmount {
                        denom: denom.to_string(),
                        amount,
                    }]
                }),
            );
            return Ok(amount);
        }

        if !self.tracks_bank_history(address).await? {
            self.cache.events.insert(memo, None);
            return Ok(None);
        }

        let event = self
            .storage
            .get_bank_state_at_maximum_height(address, denom, self.block.height)
            .await?;
        self.notify_fetch(event.iter().count() as u64);
        let amount = event.as_ref().map(|event| event.balance.clone());
        self.cache
            .events
            .insert(memo, event.map(|event| vec![Event::BankState(event)]));
        Ok(amount)
    }

    /// All balances of an address, same preference order as
    /// [`Self::get_balance`].
    pub async fn get_balances(
        &mut self,
        address: &str,
    ) -> Result<IndexMap<String, String>, IndexerError> {
        self.record(DependentKey::bank_all(address));

        if let Some(snapshot) = self.usable_bank_snapshot(address).await? {
            return Ok(snapshot);
        }
        if !self.tracks_bank_history(address).await? {
            return Ok(IndexMap::new());
        }

        let events = self
            .storage
            .get_bank_state_map_at_maximum_height(address, self.block.height)
            .await?;
        self.notify_fetch(events.len() as u64);
        Ok(events
            .into_iter()
            .map(|event| (event.denom, event.balance))
            .collect())
    }

    async fn usable_bank_snapshot(
        &mut self,
        address: &str,
    ) -> Result<Option<IndexMap<String, String>>, IndexerError> {
        let snapshot = self.storage.get_bank_balance(address).await?;
        let usable = snapshot.filter(|snapshot| snapshot.block.height <= self.block.height);
        self.notify_fetch(usable.iter().count() as u64);
        Ok(usable.map(|snapshot| snapshot.balances))
    }

    async fn tracks_bank_history(&mut self, address: &str) -> Result<bool, IndexerError> {
        let Some(contract) = self.contract(address).await? else {
            return Ok(false);
        };
        Ok(self.config.tracks_bank_history(contract.code_id))
    }

    // ---- staking ----

    /// Slashes registered against a validator, most recent first.
    pub async fn get_slash_events(
        &mut self,
        operator_address: &str,
    ) -> Result<Vec<SlashEvent>, IndexerError> {
        self.record(DependentKey::staking_slashes(operator_address));
        let events = self
            .storage
            .get_slash_events(operator_address, self.block.height)
            .await?;
        self.notify_fetch(events.len() as u64);
        Ok(events)
    }

    // ---- txs ----

    /// Executions against the contract, most recent first. Always a
    /// prefix dependency: any new tx invalidates the computation.
    pub async fn get_tx_events(
        &mut self,
        contract: &str,
        action: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<WasmTxEvent>, IndexerError> {
        self.record(DependentKey::wasm_tx(contract));
        let events = self
            .storage
            .get_wasm_txs(contract, self.block.height, action, limit)
            .await?;
        self.notify_fetch(events.len() as u64);
        Ok(events)
    }

    // ---- governance ----

    pub async fn get_proposal(&mut self, proposal_id: u64) -> Result<Option<Value>, IndexerError> {
        let memo = self.record(DependentKey::gov_proposal(proposal_id));

        if let Some(cached) = self.cache.events.get(&memo) {
            return match cached {
                None => Ok(None),
                Some(rows) => match rows.first() {
                    Some(Event::Proposal { data, .. }) => Ok(Some(data.clone())),
                    Some(_) => Err(IndexerError::EventTypeMismatch(Namespace::GovProposal)),
                    None => Ok(None),
                },
            };
        }

        let proposal = self
            .storage
            .get_proposal(proposal_id, self.block.height)
            .await?;
        self.notify_fetch(proposal.iter().count() as u64);
        let data = proposal.as_ref().map(|proposal| proposal.data.clone());
        self.cache.events.insert(
            memo,
            proposal.map(|proposal| {
                vec![Event::Proposal {
                    proposal_id: proposal.proposal_id,
                    data: proposal.data,
                }]
            }),
        );
        Ok(data)
    }

    /// Distinct-on-id page of proposals. The whole catalogue is a
    /// dependency, so no memo.
    pub async fn get_proposals(
        &mut self,
        ascending: bool,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Value>, IndexerError> {
        self.record(DependentKey::gov_proposals());
        let bound = limit
            .unwrap_or(self.config.page_row_bound)
            .min(self.config.page_row_bound);
        let proposals = self
            .storage
            .get_proposals(self.block.height, ascending, Some(bound), offset)
            .await?;
        self.notify_fetch(proposals.len() as u64);
        Ok(proposals
            .into_iter()
            .map(|proposal| proposal.data)
            .collect())
    }

    pub async fn get_proposal_count(&mut self) -> Result<u64, IndexerError> {
        self.record(DependentKey::gov_proposals());
        self.storage.get_proposal_count(self.block.height).await
    }

    pub async fn get_proposal_vote(
        &mut self,
        proposal_id: u64,
        voter: &str,
    ) -> Result<Option<Value>, IndexerError> {
        let memo = self.record(DependentKey::gov_vote(proposal_id, voter));

        if let Some(cached) = self.cache.events.get(&memo) {
            return match cached {
                None => Ok(None),
                Some(rows) => match rows.first() {
                    Some(Event::ProposalVote(vote)) => Ok(Some(vote.vote.clone())),
                    Some(_) => Err(IndexerError::EventTypeMismatch(Namespace::GovProposalVote)),
                    None => Ok(None),
                },
            };
        }

        let vote = self
            .storage
            .get_proposal_vote(proposal_id, voter, self.block.height)
            .await?;
        self.notify_fetch(vote.iter().count() as u64);
        let value = vote.as_ref().map(|vote| vote.vote.clone());
        self.cache
            .events
            .insert(memo, vote.map(|vote| vec![Event::ProposalVote(vote)]));
        Ok(value)
    }

    pub async fn get_proposal_votes(
        &mut self,
        proposal_id: u64,
        ascending: bool,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<GovProposalVote>, IndexerError> {
        self.record(DependentKey::gov_votes(proposal_id));
        let bound = limit
            .unwrap_or(self.config.page_row_bound)
            .min(self.config.page_row_bound);
        let votes = self
            .storage
            .get_proposal_votes(proposal_id, self.block.height, ascending, Some(bound), offset)
            .await?;
        self.notify_fetch(votes.len() as u64);
        Ok(votes)
    }

    pub async fn get_proposal_vote_count(
        &mut self,
        proposal_id: u64,
    ) -> Result<u64, IndexerError> {
        self.record(DependentKey::gov_votes(proposal_id));
        self.storage
            .get_proposal_vote_count(proposal_id, self.block.height)
            .await
    }

    // ---- community pool ----

    pub async fn get_community_pool_balances(
        &mut self,
    ) -> Result<Option<IndexMap<String, String>>, IndexerError> {
        let memo = self.record(DependentKey::community_pool());

        if let Some(cached) = self.cache.events.get(&memo) {
            return match cached {
                None => Ok(None),
                Some(rows) => match rows.first() {
                    Some(Event::CommunityPool(balances)) => Ok(Some(balances.clone())),
                    Some(_) => Err(IndexerError::EventTypeMismatch(Namespace::CommunityPool)),
                    None => Ok(None),
                },
            };
        }

        let state = self
            .storage
            .get_community_pool_at_maximum_height(self.block.height)
            .await?;
        self.notify_fetch(state.iter().count() as u64);
        let balances = state.map(|state| state.balances);
        self.cache.events.insert(
            memo,
            balances
                .clone()
                .map(|balances| vec![Event::CommunityPool(balances)]),
        );
        Ok(balances)
    }

    // ---- extractions ----

    pub async fn get_extraction(
        &mut self,
        address: &str,
        name: &str,
    ) -> Result<Option<Value>, IndexerError> {
        let memo = self.record(DependentKey::extraction(address, name));

        if let Some(cached) = self.cache.events.get(&memo) {
            return match cached {
                None => Ok(None),
                Some(rows) => match rows.first() {
                    Some(Event::Extraction(data)) => Ok(Some(data.clone())),
                    Some(_) => Err(IndexerError::EventTypeMismatch(Namespace::Extraction)),
                    None => Ok(None),
                },
            };
        }

        let extraction = self
            .storage
            .get_extraction(address, name, self.block.height)
            .await?;
        self.notify_fetch(extraction.iter().count() as u64);
        let data = extraction.map(|extraction| extraction.data);
        self.cache.events.insert(
            memo,
            data.clone().map(|data| vec![Event::Extraction(data)]),
        );
        Ok(data)
    }

    // ---- feegrants ----

    pub async fn get_feegrant_allowance(
        &mut self,
        granter: &str,
        grantee: &str,
    ) -> Result<Option<FeegrantAllowance>, IndexerError> {
        let memo = self.record(DependentKey::feegrant(granter, grantee));

        if let Some(cached) = self.cache.events.get(&memo) {
            return match cached {
                None => Ok(None),
                Some(rows) => match rows.first() {
                    Some(Event::Feegrant(allowance)) => Ok(Some(allowance.clone())),
                    Some(_) => {
                        Err(IndexerError::EventTypeMismatch(Namespace::FeegrantAllowance))
                    }
                    None => Ok(None),
                },
            };
        }

        let allowance = self
            .storage
            .get_feegrant_allowance(granter, grantee, self.block.height)
            .await?;
        self.notify_fetch(allowance.iter().count() as u64);
        self.cache.events.insert(
            memo,
            allowance
                .clone()
                .map(|allowance| vec![Event::Feegrant(allowance)]),
        );
        Ok(allowance)
    }

    /// Allowances granted by `address`, latest row per grantee.
    pub async fn get_feegrant_allowances_granted(
        &mut self,
        address: &str,
    ) -> Result<Vec<FeegrantAllowance>, IndexerError> {
        self.record(DependentKey::feegrant(address, EITHER_PARTY));
        let allowances = self
            .storage
            .get_feegrant_allowances_granted(address, self.block.height)
            .await?;
        self.notify_fetch(allowances.len() as u64);
        Ok(allowances)
    }

    /// Allowances received by `address`, latest row per granter.
    pub async fn get_feegrant_allowances_received(
        &mut self,
        address: &str,
    ) -> Result<Vec<FeegrantAllowance>, IndexerError> {
        self.record(DependentKey::feegrant(EITHER_PARTY, address));
        let allowances = self
            .storage
            .get_feegrant_allowances_received(address, self.block.height)
            .await?;
        self.notify_fetch(allowances.len() as u64);
        Ok(allowances)
    }

    pub async fn has_feegrant_allowance(
        &mut self,
        granter: &str,
        grantee: &str,
    ) -> Result<bool, IndexerError> {
        Ok(self
            .get_feegrant_allowance(granter, grantee)
            .await?
            .is_some_and(|allowance| allowance.active))
    }

    // ---- escape hatch ----

    /// Raw read-only scan over a named table. No dependency tracking:
    /// the caller owns height filtering and invalidation.
    pub async fn query(
        &mut self,
        table: &str,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Value)>, IndexerError> {
        let rows = self.storage.raw_prefix_scan(table, prefix, limit).await?;
        self.notify_fetch(rows.len() as u64);
        Ok(rows)
    }
}

fn memo_key(key: &DependentKey) -> String {
    let mode = if key.prefix { 'p' } else { 'e' };
    format!("{}:{}", mode, key.canonical())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memo_key_distinguishes_prefix_mode() {
        let exact = DependentKey::wasm_state_exact("c1", b"k");
        let prefix = DependentKey::wasm_state_prefix("c1", b"k");
        assert_ne!(memo_key(&exact), memo_key(&prefix));
    }
}
