//! Dependent keys.
//!
//! Every read a formula performs is summarised as a dependent key: a
//! namespace tag plus a canonical `subject[:suffix]` string. A stored
//! computation is valid exactly as long as no new event row matches one of
//! its dependent keys, so the canonical form has to be stable and ordered
//! the same way the underlying tables are:
//!
//! - wasm state suffixes are hex-encoded key bytes (hex preserves the
//!   byte-prefix relation),
//! - proposal ids are zero-padded to 20 digits so lexicographic order
//!   equals numeric order,
//! - the feegrant namespace uses a literal `*` subject/suffix as an opaque
//!   "either side" sentinel; it is *not* a glob,
//! - transformation suffixes are name patterns where `*` *is* a glob, and
//!   a `*` subject means "any contract".

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Matches either granter or grantee in the feegrant namespace.
pub const EITHER_PARTY: &str = "*";

/// Matches any contract address in the transformation namespace.
pub const ANY_CONTRACT: &str = "*";

/// Event family tag. One per exported table family; the dependent-key
/// namespace string is the wire form used in canonical keys.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Namespace {
    WasmState,
    WasmTransformation,
    WasmTx,
    Bank,
    StakingSlash,
    GovProposal,
    GovProposalVote,
    CommunityPool,
    Extraction,
    FeegrantAllowance,
}

/// A single recorded dependency: `key` is the canonical
/// `subject[:suffix]` remainder, `prefix` selects prefix matching
/// instead of exact matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependentKey {
    pub namespace: Namespace,
    pub key: String,
    pub prefix: bool,
}

impl DependentKey {
    pub fn exact(namespace: Namespace, key: String) -> Self {
        Self {
            namespace,
            key,
            prefix: false,
        }
    }

    pub fn prefixed(namespace: Namespace, key: String) -> Self {
        Self {
            namespace,
            key,
            prefix: true,
        }
    }

    pub fn wasm_state_exact(contract: &str, key: &[u8]) -> Self {
        Self::exact(
            Namespace::WasmState,
            format!("{}:{}", contract, hex::encode(key)),
        )
    }

    pub fn wasm_state_prefix(contract: &str, key_prefix: &[u8]) -> Self {
        Self::prefixed(
            Namespace::WasmState,
            format!("{}:{}", contract, hex::encode(key_prefix)),
        )
    }

    /// Transformation match pattern; `contract` of `None` matches any
    /// contract, `name_pattern` may contain `*` globs.
    pub fn transformation_pattern(contract: Option<&str>, name_pattern: &str) -> Self {
        Self::exact(
            Namespace::WasmTransformation,
            format!("{}:{}", contract.unwrap_or(ANY_CONTRACT), name_pattern),
        )
    }

    /// Transformation name-prefix dependency (map reads).
    pub fn transformation_prefix(contract: &str, name_prefix: &str) -> Self {
        Self::prefixed(
            Namespace::WasmTransformation,
            format!("{}:{}", contract, name_prefix),
        )
    }

    pub fn wasm_tx(contract: &str) -> Self {
        Self::prefixed(Namespace::WasmTx, contract.to_string())
    }

    pub fn bank_denom(address: &str, denom: &str) -> Self {
        Self::exact(Namespace::Bank, format!("{}:{}", address, denom))
    }

    pub fn bank_all(address: &str) -> Self {
        Self::prefixed(Namespace::Bank, address.to_string())
    }

    pub fn staking_slashes(validator: &str) -> Self {
        Self::prefixed(Namespace::StakingSlash, validator.to_string())
    }

    pub fn gov_proposal(id: u64) -> Self {
        Self::exact(Namespace::GovProposal, pad_proposal_id(id))
    }

    pub fn gov_proposals() -> Self {
        Self::prefixed(Namespace::GovProposal, String::new())
    }

    pub fn gov_vote(id: u64, voter: &str) -> Self {
        Self::exact(
            Namespace::GovProposalVote,
            format!("{}:{}", pad_proposal_id(id), voter),
        )
    }

    pub fn gov_votes(id: u64) -> Self {
        Self::prefixed(Namespace::GovProposalVote, pad_proposal_id(id))
    }

    pub fn community_pool() -> Self {
        Self::prefixed(Namespace::CommunityPool, String::new())
    }

    pub fn extraction(address: &str, name: &str) -> Self {
        Self::exact(Namespace::Extraction, format!("{}:{}", address, name))
    }

    /// Feegrant pair; pass [`EITHER_PARTY`] on the side that should match
    /// any address.
    pub fn feegrant(granter: &str, grantee: &str) -> Self {
        Self::exact(
            Namespace::FeegrantAllowance,
            format!("{}:{}", granter, grantee),
        )
    }

    /// Canonical `namespace:subject[:suffix]` rendering, used for memo
    /// keys and persisted dependency lists.
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.namespace, self.key)
    }

    /// The part of `key` before the first `:` (contract address, account,
    /// validator, padded proposal id, or a sentinel).
    pub fn subject(&self) -> &str {
        match self.key.split_once(':') {
            Some((subject, _)) => subject,
            None => &self.key,
        }
    }

    /// The part of `key` after the first `:`, when present. Transformation
    /// names may themselves contain `:`; only the first separator splits.
    pub fn suffix(&self) -> Option<&str> {
        self.key.split_once(':').map(|(_, suffix)| suffix)
    }

    pub fn is_transformation(&self) -> bool {
        self.namespace == Namespace::WasmTransformation
    }
}

impl std::fmt::Display for DependentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.prefix {
            write!(f, "{}*", self.canonical())
        } else {
            write!(f, "{}", self.canonical())
        }
    }
}

/// Zero-pad a proposal id so string order matches numeric order.
pub fn pad_proposal_id(id: u64) -> String {
    format!("{:020}", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_wasm_state() {
        let key = DependentKey::wasm_state_exact("contract1", b"\x00\x07balanceaddr");
        assert_eq!(
            key.canonical(),
            format!("wasm_state:contract1:{}", hex::encode(b"\x00\x07balanceaddr"))
        );
        assert!(!key.prefix);
    }

    #[test]
    fn test_subject_suffix_split() {
        let key = DependentKey::transformation_pattern(Some("c1"), "balance:addr:extra");
        assert_eq!(key.subject(), "c1");
        assert_eq!(key.suffix(), Some("balance:addr:extra"));
    }

    #[test]
    fn test_proposal_id_order() {
        assert!(pad_proposal_id(2) < pad_proposal_id(10));
        assert_eq!(DependentKey::gov_proposal(7).subject(), &pad_proposal_id(7));
    }

    #[test]
    fn test_feegrant_sentinel_is_not_prefix() {
        let key = DependentKey::feegrant("granter1", EITHER_PARTY);
        assert!(!key.prefix);
        assert_eq!(key.suffix(), Some("*"));
    }

    #[test]
    fn test_namespace_round_trip() {
        use std::str::FromStr;
        for ns in [
            Namespace::WasmState,
            Namespace::WasmTransformation,
            Namespace::FeegrantAllowance,
        ] {
            assert_eq!(Namespace::from_str(&ns.to_string()).unwrap(), ns);
        }
    }
}
