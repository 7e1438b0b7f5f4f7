// Integration tests over the sled reference backend: storage
// semantics, the evaluators, and the computation cache protocol.

mod compute_tests;
mod engine_tests;
mod storage_tests;

use std::sync::Arc;

use serde_json::{json, Value};
use vantage_common::block::Block;

use crate::config::EngineConfig;
use crate::core::storage::{
    ChainState, Contract, SledStorage, StateProvider, WasmStateEvent,
};
use crate::core::{compute::Engine, storage::BlockProvider, storage::ContractProvider};

pub(super) const CHAIN_ID: &str = "vantage-test-1";

pub(super) fn test_block(height: u64) -> Block {
    Block::new(height, height * 1_000)
}

pub(super) fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.code_ids.insert("cw20".to_string(), vec![2]);
    config.code_ids.insert("dao-core".to_string(), vec![1]);
    config.track_bank_history_code_ids_keys = vec!["cw20".to_string()];
    config
}

/// Storage with blocks `1..=latest` and the chain-state singleton.
pub(super) async fn seeded_storage(latest: u64) -> Arc<SledStorage> {
    let _ = env_logger::builder().is_test(true).try_init();
    let storage = SledStorage::temporary().expect("temporary storage");
    for height in 1..=latest {
        storage
            .store_block(test_block(height))
            .await
            .expect("store block");
    }
    storage
        .set_chain_state(&ChainState {
            chain_id: CHAIN_ID.to_string(),
            latest_block: test_block(latest),
        })
        .await
        .expect("set chain state");
    Arc::new(storage)
}

pub(super) fn test_engine(storage: Arc<SledStorage>) -> Engine<SledStorage> {
    Engine::new(storage, test_config())
}

pub(super) async fn seed_contract(storage: &SledStorage, address: &str, code_id: u64) {
    storage
        .store_contract(&Contract {
            address: address.to_string(),
            code_id,
            instantiated_at: test_block(1),
        })
        .await
        .expect("store contract");
}

pub(super) async fn put_wasm(
    storage: &SledStorage,
    contract: &str,
    key: &[u8],
    height: u64,
    value: Option<Value>,
) {
    use crate::core::storage::WasmStateProvider;
    let delete = value.is_none();
    storage
        .store_wasm_state(&WasmStateEvent {
            contract_address: contract.to_string(),
            key: key.to_vec(),
            block: test_block(height),
            value,
            delete,
        })
        .await
        .expect("store wasm state");
}

pub(super) fn num(n: i64) -> Option<Value> {
    Some(json!(n))
}
