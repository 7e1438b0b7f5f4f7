//! Chain-wide formulas: governance, community pool, chain identity.

use serde_json::Value;

use crate::core::compute::Environment;

pub(crate) async fn gov_proposal(env: &mut Environment) -> Result<Option<Value>, anyhow::Error> {
    let id = env.arg_u64("id")?;
    Ok(env.get_proposal(id).await?)
}

pub(crate) async fn gov_proposals(env: &mut Environment) -> Result<Option<Value>, anyhow::Error> {
    let ascending = env
        .args()
        .get("ascending")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let limit = env.opt_arg_u64("limit")?.map(|limit| limit as usize);
    let offset = env.opt_arg_u64("offset")?.unwrap_or(0) as usize;
    let proposals = env.get_proposals(ascending, limit, offset).await?;
    Ok(Some(Value::Array(proposals)))
}

pub(crate) async fn gov_proposal_count(
    env: &mut Environment,
) -> Result<Option<Value>, anyhow::Error> {
    Ok(Some(Value::from(env.get_proposal_count().await?)))
}

pub(crate) async fn gov_vote_count(
    env: &mut Environment,
) -> Result<Option<Value>, anyhow::Error> {
    let id = env.arg_u64("id")?;
    Ok(Some(Value::from(env.get_proposal_vote_count(id).await?)))
}

pub(crate) async fn community_pool_balances(
    env: &mut Environment,
) -> Result<Option<Value>, anyhow::Error> {
    let balances = env.get_community_pool_balances().await?;
    Ok(match balances {
        Some(balances) => Some(serde_json::to_value(balances)?),
        None => None,
    })
}

pub(crate) async fn chain_id(env: &mut Environment) -> Result<Option<Value>, anyhow::Error> {
    Ok(Some(Value::String(env.chain_id().to_string())))
}
