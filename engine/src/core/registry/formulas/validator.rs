//! Validator formulas.

use serde_json::Value;

use crate::core::compute::Environment;

pub(crate) async fn slashes(env: &mut Environment) -> Result<Option<Value>, anyhow::Error> {
    let operator = env.target_address().to_string();
    let events = env.get_slash_events(&operator).await?;
    Ok(Some(serde_json::to_value(events)?))
}

pub(crate) async fn slash_count(env: &mut Environment) -> Result<Option<Value>, anyhow::Error> {
    let operator = env.target_address().to_string();
    let events = env.get_slash_events(&operator).await?;
    Ok(Some(Value::from(events.len() as u64)))
}
