//! Formula registry.
//!
//! Formulas are a compile-time catalogue: pure async functions from an
//! [`Environment`] to a JSON value, looked up by `(type, name)`. The
//! registry is the only compatibility boundary the query surface sees.

mod formulas;

use std::collections::HashMap;

use futures::future::BoxFuture;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::core::{compute::Environment, error::IndexerError};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FormulaType {
    Contract,
    Validator,
    Account,
    Generic,
}

pub type FormulaFn =
    for<'a> fn(&'a mut Environment) -> BoxFuture<'a, Result<Option<Value>, anyhow::Error>>;

pub struct Formula {
    pub name: &'static str,
    pub formula_type: FormulaType,
    /// Contract formulas only: the code-id keys the target contract
    /// must match. Empty means no filter.
    pub code_ids_keys: &'static [&'static str],
    /// Dynamic formulas may observe the wall clock; they are never
    /// cached and never evaluated over a range.
    pub dynamic: bool,
    compute: FormulaFn,
}

impl Formula {
    fn new(formula_type: FormulaType, name: &'static str, compute: FormulaFn) -> Self {
        Self {
            name,
            formula_type,
            code_ids_keys: &[],
            dynamic: false,
            compute,
        }
    }

    fn with_code_ids_keys(mut self, code_ids_keys: &'static [&'static str]) -> Self {
        self.code_ids_keys = code_ids_keys;
        self
    }

    fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// Qualified `type:name` identifier, the formula's persistent key.
    pub fn id(&self) -> String {
        format!("{}:{}", self.formula_type, self.name)
    }

    pub fn run<'a>(
        &self,
        env: &'a mut Environment,
    ) -> BoxFuture<'a, Result<Option<Value>, anyhow::Error>> {
        (self.compute)(env)
    }
}

impl std::fmt::Debug for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Formula")
            .field("name", &self.name)
            .field("formula_type", &self.formula_type)
            .field("dynamic", &self.dynamic)
            .finish()
    }
}

// Wrap an `async fn(&mut Environment) -> Result<Option<Value>>` into a
// registry function pointer.
macro_rules! boxed_formula {
    ($func:path) => {{
        fn wrapped<'a>(
            env: &'a mut Environment,
        ) -> BoxFuture<'a, Result<Option<Value>, anyhow::Error>> {
            Box::pin($func(env))
        }
        wrapped as FormulaFn
    }};
}

lazy_static! {
    static ref REGISTRY: HashMap<String, Formula> = build_registry();
}

fn build_registry() -> HashMap<String, Formula> {
    use FormulaType::{Account, Contract, Generic, Validator};

    let catalogue = vec![
        // contract
        Formula::new(Contract, "cw20/tokenInfo", boxed_formula!(formulas::contract::cw20_token_info)),
        Formula::new(Contract, "cw20/balance", boxed_formula!(formulas::contract::cw20_balance)),
        Formula::new(Contract, "cw20/allBalances", boxed_formula!(formulas::contract::cw20_all_balances)),
        Formula::new(Contract, "daoCore/config", boxed_formula!(formulas::contract::dao_core_config))
            .with_code_ids_keys(&["dao-core"]),
        Formula::new(Contract, "daoCore/proposalModules", boxed_formula!(formulas::contract::dao_core_proposal_modules))
            .with_code_ids_keys(&["dao-core"]),
        Formula::new(Contract, "item", boxed_formula!(formulas::contract::item)),
        Formula::new(Contract, "instantiatedAt", boxed_formula!(formulas::contract::instantiated_at)),
        // account
        Formula::new(Account, "bank/balance", boxed_formula!(formulas::account::bank_balance)),
        Formula::new(Account, "bank/balances", boxed_formula!(formulas::account::bank_balances)),
        Formula::new(Account, "feegrant/granted", boxed_formula!(formulas::account::feegrant_granted)),
        Formula::new(Account, "feegrant/received", boxed_formula!(formulas::account::feegrant_received)),
        Formula::new(Account, "feegrant/activeGranted", boxed_formula!(formulas::account::feegrant_active_granted))
            .dynamic(),
        Formula::new(Account, "tx/count", boxed_formula!(formulas::account::tx_count)),
        // validator
        Formula::new(Validator, "slashes", boxed_formula!(formulas::validator::slashes)),
        Formula::new(Validator, "slashCount", boxed_formula!(formulas::validator::slash_count)),
        // generic
        Formula::new(Generic, "gov/proposal", boxed_formula!(formulas::generic::gov_proposal)),
        Formula::new(Generic, "gov/proposals", boxed_formula!(formulas::generic::gov_proposals)),
        Formula::new(Generic, "gov/proposalCount", boxed_formula!(formulas::generic::gov_proposal_count)),
        Formula::new(Generic, "gov/voteCount", boxed_formula!(formulas::generic::gov_vote_count)),
        Formula::new(Generic, "communityPool/balances", boxed_formula!(formulas::generic::community_pool_balances)),
        Formula::new(Generic, "chain/id", boxed_formula!(formulas::generic::chain_id)),
    ];

    catalogue
        .into_iter()
        .map(|formula| (formula.id(), formula))
        .collect()
}

/// Look a formula up by `(type, name)`.
pub fn resolve(formula_type: FormulaType, name: &str) -> Result<&'static Formula, IndexerError> {
    let id = format!("{}:{}", formula_type, name);
    REGISTRY
        .get(&id)
        .ok_or(IndexerError::FormulaNotFound(id))
}

/// Every registered formula, for introspection surfaces.
pub fn all() -> impl Iterator<Item = &'static Formula> {
    REGISTRY.values()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_formula() {
        let formula = resolve(FormulaType::Contract, "cw20/balance").unwrap();
        assert_eq!(formula.id(), "contract:cw20/balance");
        assert!(!formula.dynamic);
    }

    #[test]
    fn test_resolve_is_type_scoped() {
        assert!(resolve(FormulaType::Account, "cw20/balance").is_err());
    }

    #[test]
    fn test_unknown_formula() {
        let err = resolve(FormulaType::Generic, "nope").unwrap_err();
        assert!(matches!(err, IndexerError::FormulaNotFound(_)));
    }

    #[test]
    fn test_ids_are_unique() {
        let count = all().count();
        let ids: std::collections::HashSet<String> = all().map(|formula| formula.id()).collect();
        assert_eq!(count, ids.len());
    }

    #[test]
    fn test_dynamic_flag() {
        let formula = resolve(FormulaType::Account, "feegrant/activeGranted").unwrap();
        assert!(formula.dynamic);
    }
}
