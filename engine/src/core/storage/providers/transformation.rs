use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vantage_common::block::{Block, BlockHeight};

use crate::core::error::IndexerError;

/// A derived view of wasm state, produced by an external transformer.
/// `value` of `None` means the transformer unset the name at this height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationEvent {
    pub contract_address: String,
    pub name: String,
    pub block: Block,
    pub value: Option<Value>,
}

/// Transformation name pattern: a literal name, or a glob where `*`
/// matches any run of characters. Globs only exist in this namespace.
#[derive(Debug, Clone)]
pub struct NamePattern {
    raw: String,
    regex: Option<Regex>,
}

impl NamePattern {
    pub fn new(pattern: &str) -> Result<Self, IndexerError> {
        let regex = if pattern.contains('*') {
            let escaped = regex::escape(pattern).replace("\\*", ".*");
            let anchored = format!("^{}$", escaped);
            Some(
                Regex::new(&anchored)
                    .with_context(|| format!("invalid name pattern {:?}", pattern))?,
            )
        } else {
            None
        };
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_exact(&self) -> bool {
        self.regex.is_none()
    }

    /// Literal part up to the first glob, usable to narrow a scan.
    pub fn literal_prefix(&self) -> &str {
        match self.raw.find('*') {
            Some(at) => &self.raw[..at],
            None => &self.raw,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(name),
            None => self.raw == name,
        }
    }
}

#[async_trait]
pub trait TransformationProvider {
    /// Most-recent transformation per `(contract, name)` at or below
    /// `height` whose name matches the pattern, across all contracts
    /// when `contract` is `None`. `null`-valued rows are included;
    /// code-id filtering and absence handling happen above the adapter.
    async fn get_transformations_matching(
        &self,
        contract: Option<&str>,
        pattern: &NamePattern,
        height: BlockHeight,
        limit: Option<usize>,
    ) -> Result<Vec<TransformationEvent>, IndexerError>;

    /// Most-recent transformations whose name starts with
    /// `name_prefix`, keyed by the remainder of the name.
    async fn get_transformation_map(
        &self,
        contract: &str,
        name_prefix: &str,
        height: BlockHeight,
    ) -> Result<Vec<TransformationEvent>, IndexerError>;

    /// Earliest row for the exact name at or below `height`, ascending
    /// order, no memo.
    async fn get_first_transformation(
        &self,
        contract: &str,
        name: &str,
        height: BlockHeight,
    ) -> Result<Option<TransformationEvent>, IndexerError>;

    async fn store_transformation(&self, event: &TransformationEvent)
        -> Result<(), IndexerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_pattern() {
        let pattern = NamePattern::new("config").unwrap();
        assert!(pattern.is_exact());
        assert!(pattern.matches("config"));
        assert!(!pattern.matches("config2"));
    }

    #[test]
    fn test_glob_pattern() {
        let pattern = NamePattern::new("balance:*").unwrap();
        assert!(!pattern.is_exact());
        assert_eq!(pattern.literal_prefix(), "balance:");
        assert!(pattern.matches("balance:addr1"));
        assert!(!pattern.matches("balances:addr1"));
    }

    #[test]
    fn test_glob_escapes_regex_metachars() {
        let pattern = NamePattern::new("proposal(1).*").unwrap();
        assert!(pattern.matches("proposal(1).x"));
        assert!(!pattern.matches("proposal1abc"));
    }

    #[test]
    fn test_inner_glob() {
        let pattern = NamePattern::new("dao:*:config").unwrap();
        assert!(pattern.matches("dao:abc:config"));
        assert!(!pattern.matches("dao:abc:settings"));
    }
}
