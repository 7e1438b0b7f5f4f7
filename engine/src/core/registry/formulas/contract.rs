//! Contract formulas: cw20 token state, dao-core views, raw items.

use serde_json::Value;
use vantage_common::key::MapKeyType;

use crate::core::compute::Environment;

pub(crate) async fn cw20_token_info(
    env: &mut Environment,
) -> Result<Option<Value>, anyhow::Error> {
    let contract = env.target_address().to_string();
    Ok(env.get(&contract, &[b"token_info"]).await?)
}

/// cw20 balance of `address` held on the target token contract.
pub(crate) async fn cw20_balance(env: &mut Environment) -> Result<Option<Value>, anyhow::Error> {
    let contract = env.target_address().to_string();
    let owner = env.arg_str("address")?.to_string();
    Ok(env.get(&contract, &[b"balance", owner.as_bytes()]).await?)
}

pub(crate) async fn cw20_all_balances(
    env: &mut Environment,
) -> Result<Option<Value>, anyhow::Error> {
    let contract = env.target_address().to_string();
    let balances = env
        .get_map(&contract, &[b"balance"], MapKeyType::String)
        .await?;
    Ok(Some(serde_json::to_value(balances)?))
}

pub(crate) async fn dao_core_config(
    env: &mut Environment,
) -> Result<Option<Value>, anyhow::Error> {
    let contract = env.target_address().to_string();
    let found = env
        .get_transformation_match(Some(&contract), "config", None)
        .await?;
    Ok(found.and_then(|event| event.value))
}

pub(crate) async fn dao_core_proposal_modules(
    env: &mut Environment,
) -> Result<Option<Value>, anyhow::Error> {
    let contract = env.target_address().to_string();
    let modules = env
        .get_transformation_map(&contract, "proposalModule")
        .await?;
    Ok(Some(serde_json::to_value(modules)?))
}

/// Raw dao-style item lookup by key argument.
pub(crate) async fn item(env: &mut Environment) -> Result<Option<Value>, anyhow::Error> {
    let contract = env.target_address().to_string();
    let key = env.arg_str("key")?.to_string();
    Ok(env.get(&contract, &[b"item", key.as_bytes()]).await?)
}

pub(crate) async fn instantiated_at(
    env: &mut Environment,
) -> Result<Option<Value>, anyhow::Error> {
    let contract = env.target_address().to_string();
    let found = env.get_contract(&contract, None).await?;
    Ok(found.map(|contract| serde_json::json!(contract.instantiated_at)))
}
