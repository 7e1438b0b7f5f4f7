use serde_json::json;
use vantage_common::{dependent_key::DependentKey, key::compose_key};

use super::{num, put_wasm, seeded_storage, test_block};
use crate::core::storage::{
    BankBalance, BankProvider, BankStateEvent, ComputationProvider, DependencyProvider,
    FeegrantAllowance, FeegrantProvider, GovProposal, GovProposalVote, GovProvider,
    WasmStateProvider,
};

#[tokio::test]
async fn test_point_read_most_recent_semantics() {
    let storage = seeded_storage(50).await;
    let key = compose_key(&[b"config"]).unwrap();
    put_wasm(&storage, "c1", &key, 10, num(1)).await;
    put_wasm(&storage, "c1", &key, 20, num(2)).await;
    put_wasm(&storage, "c1", &key, 30, num(3)).await;

    let at_25 = storage
        .get_wasm_state_at_maximum_height("c1", &key, 25)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(at_25.value, num(2));
    assert_eq!(at_25.block.height, 20);

    let at_30 = storage
        .get_wasm_state_at_maximum_height("c1", &key, 30)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(at_30.value, num(3));

    assert!(storage
        .get_wasm_state_at_maximum_height("c1", &key, 9)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_tombstone_shadows_key() {
    let storage = seeded_storage(50).await;
    let key = compose_key(&[b"config"]).unwrap();
    put_wasm(&storage, "c1", &key, 10, num(1)).await;
    put_wasm(&storage, "c1", &key, 25, None).await;

    let at_27 = storage
        .get_wasm_state_at_maximum_height("c1", &key, 27)
        .await
        .unwrap()
        .unwrap();
    assert!(at_27.delete);
    assert_eq!(at_27.effective_value(), None);
    assert_eq!(at_27.block.timestamp, test_block(25).timestamp);

    // A later write un-shadows it
    put_wasm(&storage, "c1", &key, 30, num(3)).await;
    let at_30 = storage
        .get_wasm_state_at_maximum_height("c1", &key, 30)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(at_30.effective_value(), Some(&json!(3)));
}

#[tokio::test]
async fn test_map_read_distinct_on_key() {
    let storage = seeded_storage(50).await;
    let prefix = vantage_common::key::compose_key_prefix(&[b"balance"]).unwrap();
    let alice = compose_key(&[b"balance", b"alice"]).unwrap();
    let bob = compose_key(&[b"balance", b"bob"]).unwrap();
    put_wasm(&storage, "c1", &alice, 10, num(100)).await;
    put_wasm(&storage, "c1", &alice, 20, num(150)).await;
    put_wasm(&storage, "c1", &bob, 15, num(7)).await;

    let rows = storage
        .get_wasm_state_map_at_maximum_height("c1", &prefix, 18)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].value, num(100)); // alice at 10, not 20
    assert_eq!(rows[1].value, num(7));
}

#[tokio::test]
async fn test_first_wasm_state_ascending() {
    let storage = seeded_storage(50).await;
    let key = compose_key(&[b"total_supply"]).unwrap();
    put_wasm(&storage, "c1", &key, 5, None).await; // tombstone first
    put_wasm(&storage, "c1", &key, 12, num(10)).await;
    put_wasm(&storage, "c1", &key, 18, num(20)).await;

    let first = storage
        .get_first_wasm_state("c1", &key, None, 40)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.block.height, 12);

    let matched = storage
        .get_first_wasm_state("c1", &key, Some(&json!(20)), 40)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(matched.block.height, 18);
}

#[tokio::test]
async fn test_first_change_matching_exact_and_prefix() {
    let storage = seeded_storage(50).await;
    let alice = compose_key(&[b"balance", b"alice"]).unwrap();
    let bob = compose_key(&[b"balance", b"bob"]).unwrap();
    put_wasm(&storage, "c1", &alice, 10, num(1)).await;
    put_wasm(&storage, "c1", &bob, 22, num(2)).await;
    put_wasm(&storage, "c1", &alice, 30, num(3)).await;

    let exact = DependentKey::wasm_state_exact("c1", &alice);
    assert_eq!(
        storage.first_change_matching(&exact, 10, None).await.unwrap(),
        Some(30)
    );
    assert_eq!(
        storage
            .first_change_matching(&exact, 10, Some(29))
            .await
            .unwrap(),
        None
    );

    let prefix = vantage_common::key::compose_key_prefix(&[b"balance"]).unwrap();
    let any = DependentKey::wasm_state_prefix("c1", &prefix);
    assert_eq!(
        storage.first_change_matching(&any, 10, None).await.unwrap(),
        Some(22)
    );
    assert_eq!(
        storage.first_change_matching(&any, 30, None).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_proposal_distinct_on_and_paging() {
    let storage = seeded_storage(50).await;
    for (id, height, status) in [
        (1u64, 10u64, "open"),
        (1, 20, "passed"),
        (2, 15, "open"),
        (3, 25, "open"),
    ] {
        storage
            .store_proposal(&GovProposal {
                proposal_id: id,
                block: test_block(height),
                data: json!({ "id": id, "status": status }),
            })
            .await
            .unwrap();
    }

    assert_eq!(storage.get_proposal_count(30).await.unwrap(), 3);
    assert_eq!(storage.get_proposal_count(12).await.unwrap(), 1);

    let page = storage.get_proposals(30, true, Some(2), 1).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].proposal_id, 2);
    assert_eq!(page[1].proposal_id, 3);

    // Most recent row per id wins
    let first = storage.get_proposals(30, true, Some(1), 0).await.unwrap();
    assert_eq!(first[0].data["status"], json!("passed"));
}

#[tokio::test]
async fn test_vote_ordering_tie_breaks_by_voter() {
    let storage = seeded_storage(50).await;
    for (voter, height) in [("carol", 20u64), ("alice", 20), ("bob", 10)] {
        storage
            .store_proposal_vote(&GovProposalVote {
                proposal_id: 7,
                voter: voter.to_string(),
                block: test_block(height),
                vote: json!({ "voter": voter }),
            })
            .await
            .unwrap();
    }

    let votes = storage
        .get_proposal_votes(7, 30, true, None, 0)
        .await
        .unwrap();
    let order: Vec<&str> = votes.iter().map(|vote| vote.voter.as_str()).collect();
    assert_eq!(order, vec!["bob", "alice", "carol"]);

    assert_eq!(storage.get_proposal_vote_count(7, 30).await.unwrap(), 3);
    assert_eq!(storage.get_proposal_vote_count(7, 15).await.unwrap(), 1);
}

#[tokio::test]
async fn test_feegrant_mirror_trees() {
    let storage = seeded_storage(50).await;
    let grant = |granter: &str, grantee: &str, height: u64, active: bool| FeegrantAllowance {
        granter: granter.to_string(),
        grantee: grantee.to_string(),
        block: test_block(height),
        allowance: Some(json!({ "limit": "1000" })),
        active,
    };
    storage
        .store_feegrant_allowance(&grant("g1", "a1", 10, true))
        .await
        .unwrap();
    storage
        .store_feegrant_allowance(&grant("g1", "a2", 12, true))
        .await
        .unwrap();
    storage
        .store_feegrant_allowance(&grant("g2", "a1", 14, true))
        .await
        .unwrap();
    // revocation writes a newer inactive row
    storage
        .store_feegrant_allowance(&grant("g1", "a2", 20, false))
        .await
        .unwrap();

    let granted = storage.get_feegrant_allowances_granted("g1", 30).await.unwrap();
    assert_eq!(granted.len(), 2);
    assert!(granted.iter().any(|row| row.grantee == "a2" && !row.active));

    let received = storage
        .get_feegrant_allowances_received("a1", 30)
        .await
        .unwrap();
    assert_eq!(received.len(), 2);
    assert!(received.iter().all(|row| row.grantee == "a1"));

    let change = storage
        .first_change_matching(&DependentKey::feegrant("g1", "*"), 12, None)
        .await
        .unwrap();
    assert_eq!(change, Some(20));
    let received_change = storage
        .first_change_matching(&DependentKey::feegrant("*", "a1"), 10, None)
        .await
        .unwrap();
    assert_eq!(received_change, Some(14));
}

#[tokio::test]
async fn test_bank_snapshot_and_history() {
    let storage = seeded_storage(50).await;
    let mut balances = indexmap::IndexMap::new();
    balances.insert("utoken".to_string(), "500".to_string());
    storage
        .set_bank_balance(&BankBalance {
            address: "acct1".to_string(),
            block: test_block(40),
            balances,
        })
        .await
        .unwrap();

    for (height, amount) in [(10u64, "100"), (30, "250")] {
        storage
            .store_bank_state(&BankStateEvent {
                address: "acct1".to_string(),
                denom: "utoken".to_string(),
                block: test_block(height),
                balance: amount.to_string(),
            })
            .await
            .unwrap();
    }

    let at_20 = storage
        .get_bank_state_at_maximum_height("acct1", "utoken", 20)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(at_20.balance, "100");

    // Snapshot row advances count as changes for the address
    let change = storage
        .first_change_matching(&DependentKey::bank_all("acct1"), 30, None)
        .await
        .unwrap();
    assert_eq!(change, Some(40));
}

#[tokio::test]
async fn test_computation_round_trip_and_validity_update() {
    let storage = seeded_storage(50).await;
    let computation = crate::core::storage::Computation {
        target_address: "c1".to_string(),
        formula: "contract:cw20/balance".to_string(),
        args: r#"{"address":"alice"}"#.to_string(),
        block: test_block(10),
        output: num(1),
        dependent_events: vec![DependentKey::wasm_state_exact("c1", b"k")],
        dependent_transformations: Vec::new(),
        latest_block_height_valid: 19,
    };
    storage.store_computation(&computation).await.unwrap();

    let found = storage
        .get_latest_computation("c1", &computation.formula, &computation.args, 15)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found, computation);
    assert!(found.valid_at(15));
    assert!(!found.valid_at(20));

    storage
        .set_computation_validity("c1", &computation.formula, &computation.args, 10, 30)
        .await
        .unwrap();
    let extended = storage
        .get_latest_computation("c1", &computation.formula, &computation.args, 15)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(extended.latest_block_height_valid, 30);

    let in_range = storage
        .get_computations_in_range("c1", &computation.formula, &computation.args, 5, 30)
        .await
        .unwrap();
    assert_eq!(in_range.len(), 1);

    assert_eq!(
        storage
            .delete_computations_for("c1", &computation.formula)
            .await
            .unwrap(),
        1
    );
    assert!(storage
        .get_latest_computation("c1", &computation.formula, &computation.args, 50)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_block_time_lookups() {
    let storage = seeded_storage(30).await;
    use crate::core::storage::BlockProvider;

    let exact = storage.get_block_at_height(12).await.unwrap().unwrap();
    assert_eq!(exact, test_block(12));

    let below = storage
        .get_block_at_or_below_time(12_500)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(below.height, 12);

    let after = storage
        .get_block_at_or_after_time(12_500)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.height, 13);

    let latest = storage.get_latest_block().await.unwrap().unwrap();
    assert_eq!(latest.height, 30);
}
