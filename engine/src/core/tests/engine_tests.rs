use serde_json::json;
use vantage_common::key::compose_key;

use super::{num, put_wasm, seed_contract, seeded_storage, test_block};
use crate::core::{
    compute::{BlockSelector, QueryRequest, QueryResponse},
    error::IndexerError,
    registry::{self, FormulaType},
    storage::{ComputationProvider, SledStorage},
};

async fn seed_cw20_balance(storage: &SledStorage) {
    seed_contract(storage, "c1", 2).await;
    let key = compose_key(&[b"balance", b"alice"]).unwrap();
    put_wasm(storage, "c1", &key, 10, num(1)).await;
    put_wasm(storage, "c1", &key, 20, num(2)).await;
    put_wasm(storage, "c1", &key, 25, None).await;
    put_wasm(storage, "c1", &key, 30, num(3)).await;
}

fn balance_request(selector: BlockSelector) -> QueryRequest {
    QueryRequest {
        formula_type: FormulaType::Contract,
        address: "c1".to_string(),
        formula: "cw20/balance".to_string(),
        args: json!({ "address": "alice" }),
        selector,
        block_step: None,
        time_step: None,
    }
}

#[tokio::test]
async fn test_query_single_block() {
    let storage = seeded_storage(50).await;
    seed_cw20_balance(&storage).await;
    let engine = super::test_engine(storage);

    let response = engine
        .query(balance_request(BlockSelector::Block(22)))
        .await
        .unwrap();
    match response {
        QueryResponse::Single { value, .. } => assert_eq!(value, num(2)),
        QueryResponse::Series(_) => panic!("expected single value"),
    }
}

#[tokio::test]
async fn test_query_by_time() {
    let storage = seeded_storage(50).await;
    seed_cw20_balance(&storage).await;
    let engine = super::test_engine(storage);

    let response = engine
        .query(balance_request(BlockSelector::Time(22_500)))
        .await
        .unwrap();
    match response {
        QueryResponse::Single { block, value } => {
            assert_eq!(block.height, 22);
            assert_eq!(value, num(2));
        }
        QueryResponse::Series(_) => panic!("expected single value"),
    }
}

#[tokio::test]
async fn test_query_block_step_sampling() {
    let storage = seeded_storage(50).await;
    seed_cw20_balance(&storage).await;
    let engine = super::test_engine(storage);

    let mut request = balance_request(BlockSelector::Blocks(10, 30));
    request.block_step = Some(10);
    let response = engine.query(request).await.unwrap();

    let QueryResponse::Series(samples) = response else {
        panic!("expected series");
    };
    let values: Vec<_> = samples.iter().map(|sample| sample.value.clone()).collect();
    assert_eq!(values, vec![num(1), num(2), num(3)]);
    let at: Vec<_> = samples.iter().map(|sample| sample.at).collect();
    assert_eq!(at, vec![Some(10), Some(20), Some(30)]);
}

#[tokio::test]
async fn test_query_raw_series_without_step() {
    let storage = seeded_storage(50).await;
    seed_cw20_balance(&storage).await;
    let engine = super::test_engine(storage);

    let response = engine
        .query(balance_request(BlockSelector::Blocks(10, 30)))
        .await
        .unwrap();
    let QueryResponse::Series(samples) = response else {
        panic!("expected series");
    };
    assert_eq!(samples.len(), 4);
    assert_eq!(samples[2].value, None); // tombstone piece
}

#[tokio::test]
async fn test_query_rejects_bad_ranges() {
    let storage = seeded_storage(50).await;
    seed_cw20_balance(&storage).await;
    let engine = super::test_engine(storage);

    let err = engine
        .query(balance_request(BlockSelector::Blocks(30, 10)))
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::InvalidRange(30, 10)));

    let mut request = balance_request(BlockSelector::Blocks(10, 30));
    request.block_step = Some(0);
    assert!(matches!(
        engine.query(request).await.unwrap_err(),
        IndexerError::InvalidStep
    ));

    let err = engine
        .query(balance_request(BlockSelector::Times(5_000, 4_000)))
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::InvalidRange(_, _)));
}

#[tokio::test]
async fn test_query_unknown_formula() {
    let storage = seeded_storage(50).await;
    let engine = super::test_engine(storage);

    let mut request = balance_request(BlockSelector::Block(10));
    request.formula = "cw20/doesNotExist".to_string();
    let err = engine.query(request).await.unwrap_err();
    assert!(matches!(err, IndexerError::FormulaNotFound(_)));
}

#[tokio::test]
async fn test_range_query_persists_continuous_chain() {
    let storage = seeded_storage(50).await;
    seed_cw20_balance(&storage).await;
    let engine = super::test_engine(storage.clone());
    let formula = registry::resolve(FormulaType::Contract, "cw20/balance").unwrap();
    let args = json!({ "address": "alice" });

    let pieces = engine
        .compute_range_with_cache(formula, "c1", &args, test_block(10), test_block(30))
        .await
        .unwrap();
    assert_eq!(pieces.len(), 4);

    // Stored pieces chain contiguously over the whole range
    let stored = storage
        .get_computations_in_range("c1", &formula.id(), &pieces[0].args, 9, 30)
        .await
        .unwrap();
    assert_eq!(stored.len(), 4);
    for pair in stored.windows(2) {
        assert_eq!(pair[0].latest_block_height_valid + 1, pair[1].block.height);
    }
}

#[tokio::test]
async fn test_range_query_reuses_stored_chain() {
    let storage = seeded_storage(50).await;
    seed_cw20_balance(&storage).await;
    let engine = super::test_engine(storage.clone());
    let formula = registry::resolve(FormulaType::Contract, "cw20/balance").unwrap();
    let args = json!({ "address": "alice" });

    let first = engine
        .compute_range_with_cache(formula, "c1", &args, test_block(10), test_block(30))
        .await
        .unwrap();

    // Wider query: the stored chain covers [10, 30]; the tail is
    // extended in place up to 40 because nothing changed after 30
    let second = engine
        .compute_range_with_cache(formula, "c1", &args, test_block(10), test_block(40))
        .await
        .unwrap();
    assert_eq!(second.len(), first.len());
    assert_eq!(second.last().unwrap().latest_block_height_valid, 40);

    // And the extension was persisted
    let stored = storage
        .get_latest_computation("c1", &formula.id(), &second[0].args, 30)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.latest_block_height_valid, 40);
}

#[tokio::test]
async fn test_range_query_recomputes_tail_after_new_event() {
    let storage = seeded_storage(50).await;
    seed_cw20_balance(&storage).await;
    let engine = super::test_engine(storage.clone());
    let formula = registry::resolve(FormulaType::Contract, "cw20/balance").unwrap();
    let args = json!({ "address": "alice" });

    engine
        .compute_range_with_cache(formula, "c1", &args, test_block(10), test_block(30))
        .await
        .unwrap();

    // A new write after the cached range
    let key = compose_key(&[b"balance", b"alice"]).unwrap();
    put_wasm(&storage, "c1", &key, 35, num(9)).await;

    let pieces = engine
        .compute_range_with_cache(formula, "c1", &args, test_block(10), test_block(40))
        .await
        .unwrap();
    assert_eq!(pieces.len(), 5);
    let last = pieces.last().unwrap();
    assert_eq!(last.block.height, 35);
    assert_eq!(last.output, num(9));
    assert_eq!(last.latest_block_height_valid, 40);

    // Chain continuity still holds in storage after the tail repair
    let stored = storage
        .get_computations_in_range("c1", &formula.id(), &pieces[0].args, 9, 40)
        .await
        .unwrap();
    for pair in stored.windows(2) {
        assert_eq!(pair[0].latest_block_height_valid + 1, pair[1].block.height);
    }
}

#[tokio::test]
async fn test_single_block_cache_extends_stored_computation() {
    let storage = seeded_storage(200).await;
    seed_contract(&storage, "c1", 2).await;
    let key = compose_key(&[b"balance", b"alice"]).unwrap();
    put_wasm(&storage, "c1", &key, 50, num(5)).await;

    let engine = super::test_engine(storage.clone());
    let formula = registry::resolve(FormulaType::Contract, "cw20/balance").unwrap();
    let args = json!({ "address": "alice" });

    // Seed the cache the way the range path would
    let computation = engine
        .compute(formula, "c1", &args, test_block(100))
        .await
        .unwrap();
    let mut seeded = computation.clone();
    seeded.latest_block_height_valid = 100;
    storage.store_computation(&seeded).await.unwrap();

    // No dependency changed in (100, 150]: the stored row is extended
    // and returned as-is
    let cached = engine
        .compute_with_cache(formula, "c1", &args, test_block(150))
        .await
        .unwrap();
    assert_eq!(cached.block.height, 100);
    assert_eq!(cached.output, num(5));
    assert_eq!(cached.latest_block_height_valid, 150);

    let stored = storage
        .get_latest_computation("c1", &formula.id(), &cached.args, 150)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.latest_block_height_valid, 150);
}

#[tokio::test]
async fn test_validity_update_refuses_when_dependency_changed() {
    let storage = seeded_storage(200).await;
    seed_contract(&storage, "c1", 2).await;
    let key = compose_key(&[b"balance", b"alice"]).unwrap();
    put_wasm(&storage, "c1", &key, 50, num(5)).await;

    let engine = super::test_engine(storage.clone());
    let formula = registry::resolve(FormulaType::Contract, "cw20/balance").unwrap();
    let args = json!({ "address": "alice" });

    let mut computation = engine
        .compute(formula, "c1", &args, test_block(100))
        .await
        .unwrap();
    computation.latest_block_height_valid = 100;
    storage.store_computation(&computation).await.unwrap();

    put_wasm(&storage, "c1", &key, 120, num(6)).await;

    let extended = engine
        .update_validity_up_to_block_height(&mut computation, 150)
        .await
        .unwrap();
    assert!(!extended);
    // Never decreased, never advanced past the refusal
    assert_eq!(computation.latest_block_height_valid, 100);

    // A bound below the change still extends
    let extended = engine
        .update_validity_up_to_block_height(&mut computation, 119)
        .await
        .unwrap();
    assert!(extended);
    assert_eq!(computation.latest_block_height_valid, 119);
}

#[tokio::test]
async fn test_fresh_single_block_compute_is_not_persisted() {
    let storage = seeded_storage(50).await;
    seed_cw20_balance(&storage).await;
    let engine = super::test_engine(storage.clone());
    let formula = registry::resolve(FormulaType::Contract, "cw20/balance").unwrap();
    let args = json!({ "address": "alice" });

    let computation = engine
        .compute_with_cache(formula, "c1", &args, test_block(22))
        .await
        .unwrap();
    assert_eq!(computation.output, num(2));

    let stored = storage
        .get_latest_computation("c1", &formula.id(), &computation.args, 50)
        .await
        .unwrap();
    assert!(stored.is_none());
}
