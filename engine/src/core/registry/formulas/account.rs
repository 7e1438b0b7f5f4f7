//! Account formulas: bank balances, fee grants, tx activity.

use serde_json::Value;

use crate::core::compute::Environment;

pub(crate) async fn bank_balance(env: &mut Environment) -> Result<Option<Value>, anyhow::Error> {
    let address = env.target_address().to_string();
    let denom = env.arg_str("denom")?.to_string();
    Ok(env
        .get_balance(&address, &denom)
        .await?
        .map(Value::String))
}

pub(crate) async fn bank_balances(env: &mut Environment) -> Result<Option<Value>, anyhow::Error> {
    let address = env.target_address().to_string();
    let balances = env.get_balances(&address).await?;
    Ok(Some(serde_json::to_value(balances)?))
}

pub(crate) async fn feegrant_granted(
    env: &mut Environment,
) -> Result<Option<Value>, anyhow::Error> {
    let address = env.target_address().to_string();
    let allowances = env.get_feegrant_allowances_granted(&address).await?;
    Ok(Some(serde_json::to_value(allowances)?))
}

pub(crate) async fn feegrant_received(
    env: &mut Environment,
) -> Result<Option<Value>, anyhow::Error> {
    let address = env.target_address().to_string();
    let allowances = env.get_feegrant_allowances_received(&address).await?;
    Ok(Some(serde_json::to_value(allowances)?))
}

/// Granted allowances still active and unexpired at the evaluation's
/// notion of now. Dynamic: the answer may change with the wall clock
/// alone, so it is never cached.
pub(crate) async fn feegrant_active_granted(
    env: &mut Environment,
) -> Result<Option<Value>, anyhow::Error> {
    let address = env.target_address().to_string();
    let now = env.date();
    let active: Vec<_> = env
        .get_feegrant_allowances_granted(&address)
        .await?
        .into_iter()
        .filter(|allowance| allowance.active && !expired(allowance.allowance.as_ref(), now))
        .collect();
    Ok(Some(serde_json::to_value(active)?))
}

// expiration.at_time_unix_ms inside the allowance payload; absent
// means the grant never expires
fn expired(allowance: Option<&Value>, now: u64) -> bool {
    allowance
        .and_then(|value| value.get("expiration"))
        .and_then(|expiration| expiration.get("at_time_unix_ms"))
        .and_then(Value::as_u64)
        .is_some_and(|at| at <= now)
}

pub(crate) async fn tx_count(env: &mut Environment) -> Result<Option<Value>, anyhow::Error> {
    let address = env.target_address().to_string();
    let events = env.get_tx_events(&address, None, None).await?;
    Ok(Some(Value::from(events.len() as u64)))
}
