use std::cmp::Ordering;
use std::collections::BTreeMap;

use async_trait::async_trait;
use log::trace;
use vantage_common::block::BlockHeight;

use crate::core::{
    error::{DiskContext, IndexerError},
    storage::{GovProposal, GovProposalVote, GovProvider, SledStorage},
};

// proposals: be64(id) || be64(height)
fn proposal_entry_key(proposal_id: u64, height: BlockHeight) -> Vec<u8> {
    SledStorage::versioned_key(&proposal_id.to_be_bytes(), height)
}

// votes: be64(id) || lp(voter) || be64(height)
fn vote_key_prefix(proposal_id: u64, voter: &str) -> Vec<u8> {
    let mut prefix = proposal_id.to_be_bytes().to_vec();
    SledStorage::push_len_prefixed(&mut prefix, voter.as_bytes());
    prefix
}

impl SledStorage {
    /// Distinct-on-id projection: latest row height per proposal id at
    /// or below `height`, ascending by id. Full rows are re-fetched
    /// per page by the caller.
    fn project_proposals(
        &self,
        height: BlockHeight,
    ) -> Result<Vec<(u64, BlockHeight)>, IndexerError> {
        let mut best: BTreeMap<u64, BlockHeight> = BTreeMap::new();
        for entry in self.gov_proposals.iter() {
            let (entry_key, _) = entry?;
            if entry_key.len() != 16 {
                continue;
            }
            let Some(entry_height) = Self::height_at_suffix(&entry_key, 8) else {
                continue;
            };
            if entry_height > height {
                continue;
            }
            let id_raw: [u8; 8] = match entry_key[..8].try_into() {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            let id = u64::from_be_bytes(id_raw);
            match best.get(&id) {
                Some(found) if *found >= entry_height => {}
                _ => {
                    best.insert(id, entry_height);
                }
            }
        }
        Ok(best.into_iter().collect())
    }

    /// Distinct-on-voter projection for one proposal: latest row per
    /// voter at or below `height`.
    fn project_votes(
        &self,
        proposal_id: u64,
        height: BlockHeight,
    ) -> Result<Vec<(String, BlockHeight, sled::IVec)>, IndexerError> {
        let prefix = proposal_id.to_be_bytes();
        let mut best: BTreeMap<String, (BlockHeight, sled::IVec)> = BTreeMap::new();
        for entry in self.gov_votes.scan_prefix(prefix) {
            let (entry_key, raw) = entry?;
            let Some(entry_height) = Self::height_at_suffix(&entry_key, 8) else {
                continue;
            };
            if entry_height > height {
                continue;
            }
            let Some(voter) = parse_voter(&entry_key) else {
                continue;
            };
            match best.get(&voter) {
                Some((found, _)) if *found >= entry_height => {}
                _ => {
                    best.insert(voter, (entry_height, raw));
                }
            }
        }
        Ok(best
            .into_iter()
            .map(|(voter, (found, raw))| (voter, found, raw))
            .collect())
    }
}

// voter part of be64(id) || lp(voter) || be64(height)
fn parse_voter(entry_key: &[u8]) -> Option<String> {
    let len_raw: [u8; 2] = entry_key.get(8..10)?.try_into().ok()?;
    let voter_len = u16::from_be_bytes(len_raw) as usize;
    let voter = entry_key.get(10..10 + voter_len)?;
    Some(String::from_utf8_lossy(voter).into_owned())
}

#[async_trait]
impl GovProvider for SledStorage {
    async fn get_proposal(
        &self,
        proposal_id: u64,
        height: BlockHeight,
    ) -> Result<Option<GovProposal>, IndexerError> {
        trace!("get proposal {} at maximum height {}", proposal_id, height);
        let prefix = proposal_id.to_be_bytes();
        match Self::last_version_at_most(&self.gov_proposals, &prefix, height)? {
            Some(raw) => Ok(Some(Self::decode_row(&raw, DiskContext::GovProposal)?)),
            None => Ok(None),
        }
    }

    async fn get_proposals(
        &self,
        height: BlockHeight,
        ascending: bool,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<GovProposal>, IndexerError> {
        trace!("get proposals at maximum height {}", height);
        let mut projected = self.project_proposals(height)?;
        if !ascending {
            projected.reverse();
        }

        let page: Vec<(u64, BlockHeight)> = projected
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();

        let mut proposals = Vec::with_capacity(page.len());
        for (id, row_height) in page {
            let raw = self
                .gov_proposals
                .get(proposal_entry_key(id, row_height))?
                .ok_or(IndexerError::NotFoundOnDisk(DiskContext::GovProposal))?;
            proposals.push(Self::decode_row(&raw, DiskContext::GovProposal)?);
        }
        Ok(proposals)
    }

    async fn get_proposal_count(&self, height: BlockHeight) -> Result<u64, IndexerError> {
        Ok(self.project_proposals(height)?.len() as u64)
    }

    async fn get_proposal_vote(
        &self,
        proposal_id: u64,
        voter: &str,
        height: BlockHeight,
    ) -> Result<Option<GovProposalVote>, IndexerError> {
        trace!(
            "get vote on {} by {} at maximum height {}",
            proposal_id,
            voter,
            height
        );
        let prefix = vote_key_prefix(proposal_id, voter);
        match Self::last_version_at_most(&self.gov_votes, &prefix, height)? {
            Some(raw) => Ok(Some(Self::decode_row(&raw, DiskContext::GovProposalVote)?)),
            None => Ok(None),
        }
    }

    async fn get_proposal_votes(
        &self,
        proposal_id: u64,
        height: BlockHeight,
        ascending: bool,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<GovProposalVote>, IndexerError> {
        let mut projected = self.project_votes(proposal_id, height)?;
        // Order by block height; equal heights tie-break by voter
        // ascending (proposal is fixed here)
        projected.sort_by(|(voter_a, height_a, _), (voter_b, height_b, _)| {
            let by_height = if ascending {
                height_a.cmp(height_b)
            } else {
                height_b.cmp(height_a)
            };
            match by_height {
                Ordering::Equal => voter_a.cmp(voter_b),
                other => other,
            }
        });

        let mut votes = Vec::new();
        for (_, _, raw) in projected
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
        {
            votes.push(Self::decode_row(&raw, DiskContext::GovProposalVote)?);
        }
        Ok(votes)
    }

    async fn get_proposal_vote_count(
        &self,
        proposal_id: u64,
        height: BlockHeight,
    ) -> Result<u64, IndexerError> {
        Ok(self.project_votes(proposal_id, height)?.len() as u64)
    }

    async fn store_proposal(&self, proposal: &GovProposal) -> Result<(), IndexerError> {
        let key = proposal_entry_key(proposal.proposal_id, proposal.block.height);
        Self::insert_json(&self.gov_proposals, &key, proposal)
    }

    async fn store_proposal_vote(&self, vote: &GovProposalVote) -> Result<(), IndexerError> {
        let prefix = vote_key_prefix(vote.proposal_id, &vote.voter);
        let key = Self::versioned_key(&prefix, vote.block.height);
        Self::insert_json(&self.gov_votes, &key, vote)
    }
}
