use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vantage_common::block::{Block, BlockHeight};

use crate::core::error::IndexerError;

/// Versioned proposal row; the exporter writes one row per status
/// change, so the greatest height at or below the target block is the
/// proposal as of that block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovProposal {
    pub proposal_id: u64,
    pub block: Block,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovProposalVote {
    pub proposal_id: u64,
    pub voter: String,
    pub block: Block,
    pub vote: Value,
}

#[async_trait]
pub trait GovProvider {
    async fn get_proposal(
        &self,
        proposal_id: u64,
        height: BlockHeight,
    ) -> Result<Option<GovProposal>, IndexerError>;

    /// Distinct-on-id page. The implementation projects `(id, height)`
    /// first and re-fetches full rows for the selected page only, so a
    /// large catalogue never materializes whole.
    async fn get_proposals(
        &self,
        height: BlockHeight,
        ascending: bool,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<GovProposal>, IndexerError>;

    async fn get_proposal_count(&self, height: BlockHeight) -> Result<u64, IndexerError>;

    async fn get_proposal_vote(
        &self,
        proposal_id: u64,
        voter: &str,
        height: BlockHeight,
    ) -> Result<Option<GovProposalVote>, IndexerError>;

    /// Distinct-on `(voter, proposal)` page. `ascending` orders by
    /// block height; equal heights tie-break by voter then proposal.
    async fn get_proposal_votes(
        &self,
        proposal_id: u64,
        height: BlockHeight,
        ascending: bool,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<GovProposalVote>, IndexerError>;

    async fn get_proposal_vote_count(
        &self,
        proposal_id: u64,
        height: BlockHeight,
    ) -> Result<u64, IndexerError>;

    async fn store_proposal(&self, proposal: &GovProposal) -> Result<(), IndexerError>;

    async fn store_proposal_vote(&self, vote: &GovProposalVote) -> Result<(), IndexerError>;
}
