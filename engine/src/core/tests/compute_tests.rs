use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::json;
use vantage_common::key::compose_key;

use super::{num, put_wasm, seed_contract, seeded_storage, test_block, test_config, CHAIN_ID};
use crate::core::{
    compute::{Environment, OnFetch, PrefetchRequest},
    error::IndexerError,
    registry::{self, FormulaType},
    storage::{ComputationProvider, SledStorage, Storage},
};

async fn seed_cw20_balance(storage: &SledStorage) {
    seed_contract(storage, "c1", 2).await;
    let key = compose_key(&[b"balance", b"alice"]).unwrap();
    put_wasm(storage, "c1", &key, 10, num(1)).await;
    put_wasm(storage, "c1", &key, 20, num(2)).await;
    put_wasm(storage, "c1", &key, 25, None).await;
    put_wasm(storage, "c1", &key, 30, num(3)).await;
}

fn balance_args() -> serde_json::Value {
    json!({ "address": "alice" })
}

#[tokio::test]
async fn test_compute_returns_value_and_validity() {
    let storage = seeded_storage(50).await;
    seed_cw20_balance(&storage).await;
    let engine = super::test_engine(storage);
    let formula = registry::resolve(FormulaType::Contract, "cw20/balance").unwrap();

    let at_22 = engine
        .compute(formula, "c1", &balance_args(), test_block(22))
        .await
        .unwrap();
    assert_eq!(at_22.output, num(2));
    assert_eq!(at_22.latest_block_height_valid, 24);
    assert_eq!(at_22.dependent_events.len(), 1);

    // Unbounded tail extends to the indexer's visible height
    let at_30 = engine
        .compute(formula, "c1", &balance_args(), test_block(30))
        .await
        .unwrap();
    assert_eq!(at_30.output, num(3));
    assert_eq!(at_30.latest_block_height_valid, 50);
}

#[tokio::test]
async fn test_compute_is_deterministic() {
    let storage = seeded_storage(50).await;
    seed_cw20_balance(&storage).await;
    let engine = super::test_engine(storage);
    let formula = registry::resolve(FormulaType::Contract, "cw20/balance").unwrap();

    let first = engine
        .compute(formula, "c1", &balance_args(), test_block(22))
        .await
        .unwrap();
    let second = engine
        .compute(formula, "c1", &balance_args(), test_block(22))
        .await
        .unwrap();
    assert_eq!(first.output, second.output);
    assert_eq!(first.dependent_events, second.dependent_events);
    assert_eq!(first.latest_block_height_valid, second.latest_block_height_valid);
}

#[tokio::test]
async fn test_compute_range_piecewise_series() {
    let storage = seeded_storage(50).await;
    seed_cw20_balance(&storage).await;
    let engine = super::test_engine(storage);
    let formula = registry::resolve(FormulaType::Contract, "cw20/balance").unwrap();

    let pieces = engine
        .compute_range(formula, "c1", &balance_args(), test_block(10), test_block(30))
        .await
        .unwrap();

    let shape: Vec<(u64, Option<serde_json::Value>, u64)> = pieces
        .iter()
        .map(|piece| {
            (
                piece.block.height,
                piece.output.clone(),
                piece.latest_block_height_valid,
            )
        })
        .collect();
    assert_eq!(
        shape,
        vec![
            (10, num(1), 19),
            (20, num(2), 24),
            (25, None, 29),
            (30, num(3), 30),
        ]
    );
}

#[tokio::test]
async fn test_range_matches_pointwise_compute() {
    let storage = seeded_storage(50).await;
    seed_cw20_balance(&storage).await;
    let engine = super::test_engine(storage);
    let formula = registry::resolve(FormulaType::Contract, "cw20/balance").unwrap();

    let pieces = engine
        .compute_range(formula, "c1", &balance_args(), test_block(10), test_block(30))
        .await
        .unwrap();

    for height in 10..=30 {
        let single = engine
            .compute(formula, "c1", &balance_args(), test_block(height))
            .await
            .unwrap();
        let piece = pieces
            .iter()
            .rev()
            .find(|piece| piece.block.height <= height)
            .unwrap();
        assert_eq!(single.output, piece.output, "divergence at {}", height);
    }
}

#[tokio::test]
async fn test_formula_not_applicable_for_wrong_code_id() {
    let storage = seeded_storage(50).await;
    seed_contract(&storage, "c2", 2).await; // cw20, not dao-core
    let engine = super::test_engine(storage);
    let formula = registry::resolve(FormulaType::Contract, "daoCore/config").unwrap();

    let err = engine
        .compute(formula, "c2", &json!({}), test_block(10))
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::FormulaNotApplicable { .. }));
}

#[tokio::test]
async fn test_missing_contract_is_not_found() {
    let storage = seeded_storage(50).await;
    let engine = super::test_engine(storage);
    let formula = registry::resolve(FormulaType::Contract, "cw20/balance").unwrap();

    let err = engine
        .compute(formula, "ghost", &balance_args(), test_block(10))
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::ContractNotFound(_)));
}

#[tokio::test]
async fn test_formula_argument_errors_are_user_errors() {
    let storage = seeded_storage(50).await;
    seed_contract(&storage, "c1", 2).await;
    let engine = super::test_engine(storage);
    let formula = registry::resolve(FormulaType::Contract, "cw20/balance").unwrap();

    let err = engine
        .compute(formula, "c1", &json!({}), test_block(10))
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::FormulaFailed { .. }));
    assert!(err.is_user_error());
}

#[tokio::test]
async fn test_dynamic_formula_rejected_over_range() {
    let storage = seeded_storage(50).await;
    let engine = super::test_engine(storage.clone());
    let formula = registry::resolve(FormulaType::Account, "feegrant/activeGranted").unwrap();

    let err = engine
        .compute_range(formula, "acct1", &json!({}), test_block(10), test_block(20))
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::DynamicOverRange(_)));

    // Nothing was persisted on the way out
    let stored = storage
        .get_computations_in_range("acct1", &formula.id(), "{}", 0, 50)
        .await
        .unwrap();
    assert!(stored.is_empty());
}

fn counting_hook() -> (Arc<AtomicU64>, OnFetch) {
    let fetches = Arc::new(AtomicU64::new(0));
    let hook = {
        let fetches = fetches.clone();
        Arc::new(move |rows: u64| {
            fetches.fetch_add(rows, Ordering::SeqCst);
        }) as OnFetch
    };
    (fetches, hook)
}

fn test_env(storage: Arc<SledStorage>, on_fetch: OnFetch) -> Environment {
    Environment::new(
        storage as Arc<dyn Storage>,
        Arc::new(test_config()),
        CHAIN_ID.to_string(),
        "c1".to_string(),
        test_block(40),
        json!({}),
        true,
        Some(on_fetch),
    )
}

#[tokio::test]
async fn test_memo_serves_repeated_exact_reads() {
    let storage = seeded_storage(50).await;
    let key = compose_key(&[b"config"]).unwrap();
    put_wasm(&storage, "c1", &key, 10, num(1)).await;

    let (fetches, hook) = counting_hook();
    let mut env = test_env(storage, hook);

    assert_eq!(env.get("c1", &[b"config"]).await.unwrap(), Some(json!(1)));
    let after_first = fetches.load(Ordering::SeqCst);
    assert_eq!(env.get("c1", &[b"config"]).await.unwrap(), Some(json!(1)));
    assert_eq!(fetches.load(Ordering::SeqCst), after_first);
}

#[tokio::test]
async fn test_memo_serves_keys_under_prefetched_prefix() {
    let storage = seeded_storage(50).await;
    let alice = compose_key(&[b"balance", b"alice"]).unwrap();
    put_wasm(&storage, "c1", &alice, 10, num(100)).await;

    let (fetches, hook) = counting_hook();
    let mut env = test_env(storage, hook);

    env.prefetch(
        "c1",
        &[PrefetchRequest {
            segments: &[b"balance"],
            prefix: true,
        }],
    )
    .await
    .unwrap();
    let after_prefetch = fetches.load(Ordering::SeqCst);

    // Hit inside the prefix: served from memory
    assert_eq!(
        env.get("c1", &[b"balance", b"alice"]).await.unwrap(),
        Some(json!(100))
    );
    // Miss inside the prefix: the loaded prefix itself is the answer
    assert_eq!(env.get("c1", &[b"balance", b"bob"]).await.unwrap(), None);
    assert_eq!(fetches.load(Ordering::SeqCst), after_prefetch);
}

#[tokio::test]
async fn test_miss_still_records_dependency() {
    let storage = seeded_storage(50).await;
    let engine = super::test_engine(storage.clone());
    seed_contract(&storage, "c1", 2).await;
    let formula = registry::resolve(FormulaType::Contract, "cw20/balance").unwrap();

    // No balance rows at all: absent output, but the dependency is
    // there so a future write invalidates it
    let computation = engine
        .compute(formula, "c1", &balance_args(), test_block(10))
        .await
        .unwrap();
    assert_eq!(computation.output, None);
    assert_eq!(computation.dependent_events.len(), 1);
}

#[tokio::test]
async fn test_balances_snapshot_preferred_and_history_fallback() {
    use crate::core::storage::{BankBalance, BankProvider, BankStateEvent};

    let storage = seeded_storage(50).await;
    seed_contract(&storage, "c1", 2).await; // cw20 tracks bank history

    let mut balances = indexmap::IndexMap::new();
    balances.insert("utoken".to_string(), "500".to_string());
    storage
        .set_bank_balance(&BankBalance {
            address: "c1".to_string(),
            block: test_block(45),
            balances,
        })
        .await
        .unwrap();
    storage
        .store_bank_state(&BankStateEvent {
            address: "c1".to_string(),
            denom: "utoken".to_string(),
            block: test_block(10),
            balance: "100".to_string(),
        })
        .await
        .unwrap();

    // Snapshot is above the target block: tracked contract falls back
    // to history
    let (_, hook) = counting_hook();
    let mut env = test_env(storage.clone(), hook);
    assert_eq!(
        env.get_balance("c1", "utoken").await.unwrap(),
        Some("100".to_string())
    );

    // Untracked address, snapshot unusable: absent
    seed_contract(&storage, "c3", 9).await;
    let (_, hook) = counting_hook();
    let mut env = test_env(storage, hook);
    assert_eq!(env.get_balance("c3", "utoken").await.unwrap(), None);
}
