use anyhow::Context;
use async_trait::async_trait;
use log::trace;
use vantage_common::{
    block::BlockHeight,
    dependent_key::{DependentKey, Namespace, ANY_CONTRACT, EITHER_PARTY},
};

use crate::core::{
    error::{DiskContext, IndexerError},
    storage::{BankBalance, DependencyProvider, NamePattern, SledStorage},
};

// (height, 4-byte discriminator) suffix used by tx and slash entries
const WIDE_SUFFIX: usize = 12;

fn in_window(height: BlockHeight, after: BlockHeight, up_to: Option<BlockHeight>) -> bool {
    height > after && up_to.map_or(true, |bound| height <= bound)
}

fn narrower(a: Option<BlockHeight>, b: Option<BlockHeight>) -> Option<BlockHeight> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (found, None) | (None, found) => found,
    }
}

impl SledStorage {
    /// First matching transformation write in the window. Exact
    /// subject + literal name is a bounded range scan; globs and
    /// any-contract patterns fall back to a narrowed prefix scan with
    /// per-entry name matching.
    fn first_transformation_change(
        &self,
        key: &DependentKey,
        after: BlockHeight,
        up_to: Option<BlockHeight>,
    ) -> Result<Option<BlockHeight>, IndexerError> {
        let subject = key.subject();
        let name = key.suffix().unwrap_or("");

        if key.prefix {
            // Name starts-with dependency from a map read
            let mut prefix = Self::len_prefixed_key(&[subject.as_bytes()]);
            prefix.extend_from_slice(name.as_bytes());
            return Self::first_change_under_prefix(
                &self.transformations,
                &prefix,
                8,
                after,
                up_to,
            );
        }

        let pattern = NamePattern::new(name)?;
        if subject != ANY_CONTRACT && pattern.is_exact() {
            let mut prefix = Self::len_prefixed_key(&[subject.as_bytes()]);
            prefix.extend_from_slice(name.as_bytes());
            return Self::first_version_in(&self.transformations, &prefix, after, up_to);
        }

        let scan_prefix = if subject == ANY_CONTRACT {
            Vec::new()
        } else {
            let mut prefix = Self::len_prefixed_key(&[subject.as_bytes()]);
            prefix.extend_from_slice(pattern.literal_prefix().as_bytes());
            prefix
        };

        let mut earliest: Option<BlockHeight> = None;
        for entry in self.transformations.scan_prefix(&scan_prefix) {
            let (entry_key, _) = entry?;
            let Some(height) = Self::height_at_suffix(&entry_key, 8) else {
                continue;
            };
            if !in_window(height, after, up_to) {
                continue;
            }
            if earliest.is_some_and(|found| height >= found) {
                continue;
            }
            let Some(entry_name) = parse_transformation_name(&entry_key) else {
                continue;
            };
            if pattern.matches(&entry_name) {
                earliest = Some(height);
            }
        }
        Ok(earliest)
    }

    /// Bank changes come from two places: the per-denom history rows
    /// and the latest-snapshot row, which the exporter replaces at the
    /// same heights. The snapshot does not say which denom moved, so a
    /// denom-exact key treats any snapshot advance as a change; that
    /// can only shorten a validity interval, never overextend it.
    fn first_bank_change(
        &self,
        key: &DependentKey,
        after: BlockHeight,
        up_to: Option<BlockHeight>,
    ) -> Result<Option<BlockHeight>, IndexerError> {
        let address = key.subject();

        let history = match key.suffix() {
            Some(denom) if !key.prefix => {
                let prefix =
                    Self::len_prefixed_key(&[address.as_bytes(), denom.as_bytes()]);
                Self::first_version_in(&self.bank_state, &prefix, after, up_to)?
            }
            _ => {
                let prefix = Self::len_prefixed_key(&[address.as_bytes()]);
                Self::first_change_under_prefix(&self.bank_state, &prefix, 8, after, up_to)?
            }
        };

        let snapshot: Option<BankBalance> = Self::load_optional_json(
            &self.bank_balances,
            address.as_bytes(),
            DiskContext::BankBalance,
        )?;
        let snapshot_change = snapshot
            .map(|row| row.block.height)
            .filter(|height| in_window(*height, after, up_to));

        Ok(narrower(history, snapshot_change))
    }

    fn first_feegrant_change(
        &self,
        key: &DependentKey,
        after: BlockHeight,
        up_to: Option<BlockHeight>,
    ) -> Result<Option<BlockHeight>, IndexerError> {
        let granter = key.subject();
        let grantee = key.suffix().unwrap_or(EITHER_PARTY);

        match (granter == EITHER_PARTY, grantee == EITHER_PARTY) {
            (false, false) => {
                let prefix =
                    Self::len_prefixed_key(&[granter.as_bytes(), grantee.as_bytes()]);
                Self::first_version_in(&self.feegrants, &prefix, after, up_to)
            }
            (false, true) => {
                let prefix = Self::len_prefixed_key(&[granter.as_bytes()]);
                Self::first_change_under_prefix(&self.feegrants, &prefix, 8, after, up_to)
            }
            (true, false) => {
                let prefix = Self::len_prefixed_key(&[grantee.as_bytes()]);
                Self::first_change_under_prefix(
                    &self.feegrants_by_grantee,
                    &prefix,
                    8,
                    after,
                    up_to,
                )
            }
            (true, true) => {
                Self::first_change_under_prefix(&self.feegrants, &[], 8, after, up_to)
            }
        }
    }
}

// name part of lp(contract) || name || be64(height)
fn parse_transformation_name(entry_key: &[u8]) -> Option<String> {
    let len_raw: [u8; 2] = entry_key.get(..2)?.try_into().ok()?;
    let address_len = u16::from_be_bytes(len_raw) as usize;
    let name_end = entry_key.len().checked_sub(8)?;
    let name = entry_key.get(2 + address_len..name_end)?;
    Some(String::from_utf8_lossy(name).into_owned())
}

#[async_trait]
impl DependencyProvider for SledStorage {
    async fn first_change_matching(
        &self,
        key: &DependentKey,
        after: BlockHeight,
        up_to: Option<BlockHeight>,
    ) -> Result<Option<BlockHeight>, IndexerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "first change matching {} after {} up to {:?}",
                key,
                after,
                up_to
            );
        }

        match key.namespace {
            Namespace::WasmState => {
                let contract = key.subject();
                let state_key = hex::decode(key.suffix().unwrap_or(""))
                    .with_context(|| format!("malformed wasm state dependency {}", key))?;
                let mut prefix = Self::len_prefixed_key(&[contract.as_bytes()]);
                prefix.extend_from_slice(&state_key);
                if key.prefix {
                    Self::first_change_under_prefix(&self.wasm_state, &prefix, 8, after, up_to)
                } else {
                    Self::first_version_in(&self.wasm_state, &prefix, after, up_to)
                }
            }

            Namespace::WasmTransformation => {
                self.first_transformation_change(key, after, up_to)
            }

            Namespace::WasmTx => {
                let prefix = Self::len_prefixed_key(&[key.subject().as_bytes()]);
                Self::first_change_under_prefix(
                    &self.wasm_txs,
                    &prefix,
                    WIDE_SUFFIX,
                    after,
                    up_to,
                )
            }

            Namespace::Bank => self.first_bank_change(key, after, up_to),

            Namespace::StakingSlash => {
                let prefix = Self::len_prefixed_key(&[key.subject().as_bytes()]);
                Self::first_change_under_prefix(
                    &self.staking_slashes,
                    &prefix,
                    WIDE_SUFFIX,
                    after,
                    up_to,
                )
            }

            Namespace::GovProposal => {
                if key.prefix && key.key.is_empty() {
                    Self::first_change_under_prefix(&self.gov_proposals, &[], 8, after, up_to)
                } else {
                    let id: u64 = key
                        .subject()
                        .parse()
                        .with_context(|| format!("malformed proposal dependency {}", key))?;
                    Self::first_version_in(
                        &self.gov_proposals,
                        &id.to_be_bytes(),
                        after,
                        up_to,
                    )
                }
            }

            Namespace::GovProposalVote => {
                let id: u64 = key
                    .subject()
                    .parse()
                    .with_context(|| format!("malformed vote dependency {}", key))?;
                match key.suffix() {
                    Some(voter) if !key.prefix => {
                        let mut prefix = id.to_be_bytes().to_vec();
                        Self::push_len_prefixed(&mut prefix, voter.as_bytes());
                        Self::first_version_in(&self.gov_votes, &prefix, after, up_to)
                    }
                    _ => Self::first_change_under_prefix(
                        &self.gov_votes,
                        &id.to_be_bytes(),
                        8,
                        after,
                        up_to,
                    ),
                }
            }

            Namespace::CommunityPool => {
                Self::first_change_under_prefix(&self.community_pool, &[], 8, after, up_to)
            }

            Namespace::Extraction => {
                let name = key.suffix().unwrap_or("");
                let prefix =
                    Self::len_prefixed_key(&[key.subject().as_bytes(), name.as_bytes()]);
                Self::first_version_in(&self.extractions, &prefix, after, up_to)
            }

            Namespace::FeegrantAllowance => self.first_feegrant_change(key, after, up_to),
        }
    }
}
