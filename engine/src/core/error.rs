use strum::Display;
use thiserror::Error;
use vantage_common::{
    block::BlockHeight,
    dependent_key::Namespace,
    key::KeyError,
    time::TimestampMillis,
};

/// What a disk read was looking for, carried in not-found/corruption
/// errors so transport failures stay diagnosable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DiskContext {
    Block,
    ChainState,
    Contract,
    Validator,
    WasmState,
    Transformation,
    WasmTx,
    BankBalance,
    BankState,
    SlashEvent,
    GovProposal,
    GovProposalVote,
    CommunityPool,
    Extraction,
    FeegrantAllowance,
    Computation,
}

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("formula {0} was not found")]
    FormulaNotFound(String),

    #[error("contract {0} was not found")]
    ContractNotFound(String),

    #[error("validator {0} was not found")]
    ValidatorNotFound(String),

    #[error("no block found at or below height {0}")]
    BlockNotFound(BlockHeight),

    #[error("no block found for time {0}")]
    BlockNotFoundForTime(TimestampMillis),

    #[error("chain state has not been exported yet")]
    ChainStateNotFound,

    #[error("formula {formula} does not apply to {address}")]
    FormulaNotApplicable { formula: String, address: String },

    #[error("dynamic formula {0} cannot be evaluated over a block range")]
    DynamicOverRange(String),

    #[error("invalid range: start {0} must be strictly before end {1}")]
    InvalidRange(u64, u64),

    #[error("step must be greater than zero")]
    InvalidStep,

    #[error("formula {formula} failed: {source:#}")]
    FormulaFailed {
        formula: String,
        #[source]
        source: anyhow::Error,
    },

    // A row decoded under a namespace it does not belong to. Should be
    // impossible as long as the store adapter routes trees correctly.
    #[error("unexpected event family under namespace {0}")]
    EventTypeMismatch(Namespace),

    #[error("{0} was not found on disk")]
    NotFoundOnDisk(DiskContext),

    #[error("corrupted {context} row on disk: {source}")]
    CorruptedData {
        context: DiskContext,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Disk(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

/// Coarse classification used by callers to decide whether an error is
/// the requester's fault, a cache/storage outage, or an internal
/// invariant violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    NotApplicable,
    BadInput,
    Formula,
    Transport,
    Internal,
}

impl IndexerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FormulaNotFound(_)
            | Self::ContractNotFound(_)
            | Self::ValidatorNotFound(_)
            | Self::BlockNotFound(_)
            | Self::BlockNotFoundForTime(_)
            | Self::ChainStateNotFound => ErrorKind::NotFound,
            Self::FormulaNotApplicable { .. } | Self::DynamicOverRange(_) => {
                ErrorKind::NotApplicable
            }
            Self::InvalidRange(_, _) | Self::InvalidStep => ErrorKind::BadInput,
            Self::FormulaFailed { .. } | Self::Key(_) => ErrorKind::Formula,
            Self::Disk(_) | Self::Any(_) => ErrorKind::Transport,
            Self::EventTypeMismatch(_)
            | Self::NotFoundOnDisk(_)
            | Self::CorruptedData { .. }
            | Self::Serde(_) => ErrorKind::Internal,
        }
    }

    /// User errors are surfaced verbatim and never retried.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::NotApplicable | ErrorKind::BadInput | ErrorKind::Formula
        )
    }
}
