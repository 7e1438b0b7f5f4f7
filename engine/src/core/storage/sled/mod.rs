//! Sled reference backend.
//!
//! One tree per exported table. Versioned trees append the 8-byte
//! big-endian block height to the logical key, so "greatest height at
//! or below H" point reads and "first change after H" scans are both
//! bounded range scans. Variable-length key parts that precede other
//! parts carry a 2-byte big-endian length prefix; trailing byte-string
//! keys (wasm state, transformation names) stay raw so byte-prefix
//! scans keep working. Rows are stored as self-describing JSON, which
//! keeps scan folds free of byte-level key parsing.

mod providers;

use std::num::NonZeroUsize;
use std::path::Path;

use lru::LruCache;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use vantage_common::{block::BlockHeight, time::TimestampMillis};

use crate::core::error::{DiskContext, IndexerError};

pub const TREE_BLOCKS: &str = "blocks";
pub const TREE_BLOCKS_BY_TIME: &str = "blocks_by_time";
pub const TREE_STATE: &str = "state";
pub const TREE_CONTRACTS: &str = "contracts";
pub const TREE_VALIDATORS: &str = "validators";
pub const TREE_WASM_STATE: &str = "wasm_state";
pub const TREE_TRANSFORMATIONS: &str = "transformations";
pub const TREE_WASM_TXS: &str = "wasm_txs";
pub const TREE_BANK_BALANCES: &str = "bank_balances";
pub const TREE_BANK_STATE: &str = "bank_state";
pub const TREE_STAKING_SLASHES: &str = "staking_slashes";
pub const TREE_GOV_PROPOSALS: &str = "gov_proposals";
pub const TREE_GOV_VOTES: &str = "gov_votes";
pub const TREE_COMMUNITY_POOL: &str = "community_pool";
pub const TREE_EXTRACTIONS: &str = "extractions";
pub const TREE_FEEGRANTS: &str = "feegrants";
pub const TREE_FEEGRANTS_BY_GRANTEE: &str = "feegrants_by_grantee";
pub const TREE_COMPUTATIONS: &str = "computations";

const SINGLETON_CHAIN_STATE: &[u8] = b"chain_state";

// Block rows are tiny but the range evaluator re-reads the same
// heights constantly while walking cursors
const BLOCK_CACHE_SIZE: usize = 1024;

pub struct SledStorage {
    db: sled::Db,
    pub(super) blocks: sled::Tree,
    pub(super) blocks_by_time: sled::Tree,
    pub(super) state: sled::Tree,
    pub(super) contracts: sled::Tree,
    pub(super) validators: sled::Tree,
    pub(super) wasm_state: sled::Tree,
    pub(super) transformations: sled::Tree,
    pub(super) wasm_txs: sled::Tree,
    pub(super) bank_balances: sled::Tree,
    pub(super) bank_state: sled::Tree,
    pub(super) staking_slashes: sled::Tree,
    pub(super) gov_proposals: sled::Tree,
    pub(super) gov_votes: sled::Tree,
    pub(super) community_pool: sled::Tree,
    pub(super) extractions: sled::Tree,
    pub(super) feegrants: sled::Tree,
    pub(super) feegrants_by_grantee: sled::Tree,
    pub(super) computations: sled::Tree,
    pub(super) block_time_cache: Mutex<LruCache<BlockHeight, TimestampMillis>>,
}

impl SledStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IndexerError> {
        log::info!("opening sled storage at {}", path.as_ref().display());
        let db = sled::open(path)?;
        Self::with_db(db)
    }

    /// In-memory store for tests and tooling; nothing touches disk.
    pub fn temporary() -> Result<Self, IndexerError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(db)
    }

    fn with_db(db: sled::Db) -> Result<Self, IndexerError> {
        let cache_size =
            NonZeroUsize::new(BLOCK_CACHE_SIZE).expect("Non zero value for cache");
        Ok(Self {
            blocks: db.open_tree(TREE_BLOCKS)?,
            blocks_by_time: db.open_tree(TREE_BLOCKS_BY_TIME)?,
            state: db.open_tree(TREE_STATE)?,
            contracts: db.open_tree(TREE_CONTRACTS)?,
            validators: db.open_tree(TREE_VALIDATORS)?,
            wasm_state: db.open_tree(TREE_WASM_STATE)?,
            transformations: db.open_tree(TREE_TRANSFORMATIONS)?,
            wasm_txs: db.open_tree(TREE_WASM_TXS)?,
            bank_balances: db.open_tree(TREE_BANK_BALANCES)?,
            bank_state: db.open_tree(TREE_BANK_STATE)?,
            staking_slashes: db.open_tree(TREE_STAKING_SLASHES)?,
            gov_proposals: db.open_tree(TREE_GOV_PROPOSALS)?,
            gov_votes: db.open_tree(TREE_GOV_VOTES)?,
            community_pool: db.open_tree(TREE_COMMUNITY_POOL)?,
            extractions: db.open_tree(TREE_EXTRACTIONS)?,
            feegrants: db.open_tree(TREE_FEEGRANTS)?,
            feegrants_by_grantee: db.open_tree(TREE_FEEGRANTS_BY_GRANTEE)?,
            computations: db.open_tree(TREE_COMPUTATIONS)?,
            block_time_cache: Mutex::new(LruCache::new(cache_size)),
            db,
        })
    }

    pub async fn flush(&self) -> Result<(), IndexerError> {
        self.db.flush_async().await?;
        Ok(())
    }

    pub(super) fn tree_by_name(&self, name: &str) -> Option<&sled::Tree> {
        match name {
            TREE_BLOCKS => Some(&self.blocks),
            TREE_BLOCKS_BY_TIME => Some(&self.blocks_by_time),
            TREE_STATE => Some(&self.state),
            TREE_CONTRACTS => Some(&self.contracts),
            TREE_VALIDATORS => Some(&self.validators),
            TREE_WASM_STATE => Some(&self.wasm_state),
            TREE_TRANSFORMATIONS => Some(&self.transformations),
            TREE_WASM_TXS => Some(&self.wasm_txs),
            TREE_BANK_BALANCES => Some(&self.bank_balances),
            TREE_BANK_STATE => Some(&self.bank_state),
            TREE_STAKING_SLASHES => Some(&self.staking_slashes),
            TREE_GOV_PROPOSALS => Some(&self.gov_proposals),
            TREE_GOV_VOTES => Some(&self.gov_votes),
            TREE_COMMUNITY_POOL => Some(&self.community_pool),
            TREE_EXTRACTIONS => Some(&self.extractions),
            TREE_FEEGRANTS => Some(&self.feegrants),
            TREE_FEEGRANTS_BY_GRANTEE => Some(&self.feegrants_by_grantee),
            TREE_COMPUTATIONS => Some(&self.computations),
            _ => None,
        }
    }

    pub(super) fn chain_state_key() -> &'static [u8] {
        SINGLETON_CHAIN_STATE
    }

    // ---- key building ----

    /// Append a 2-byte BE length-prefixed part.
    pub(super) fn push_len_prefixed(key: &mut Vec<u8>, part: &[u8]) {
        key.extend_from_slice(&(part.len() as u16).to_be_bytes());
        key.extend_from_slice(part);
    }

    /// Key made of length-prefixed parts only.
    pub(super) fn len_prefixed_key(parts: &[&[u8]]) -> Vec<u8> {
        let mut key = Vec::with_capacity(parts.iter().map(|p| p.len() + 2).sum());
        for part in parts {
            Self::push_len_prefixed(&mut key, part);
        }
        key
    }

    /// `prefix || be64(height)`.
    pub(super) fn versioned_key(prefix: &[u8], height: BlockHeight) -> Vec<u8> {
        let mut key = Vec::with_capacity(prefix.len() + 8);
        key.extend_from_slice(prefix);
        key.extend_from_slice(&height.to_be_bytes());
        key
    }

    /// Block height read from a fixed position counting back from the
    /// end of an entry key.
    pub(super) fn height_at_suffix(key: &[u8], suffix_len: usize) -> Option<BlockHeight> {
        if key.len() < suffix_len {
            return None;
        }
        let start = key.len() - suffix_len;
        let raw: [u8; 8] = key.get(start..start + 8)?.try_into().ok()?;
        Some(BlockHeight::from_be_bytes(raw))
    }

    // ---- row codecs ----

    pub(super) fn decode_row<T: DeserializeOwned>(
        raw: &[u8],
        context: DiskContext,
    ) -> Result<T, IndexerError> {
        serde_json::from_slice(raw)
            .map_err(|source| IndexerError::CorruptedData { context, source })
    }

    pub(super) fn load_optional_json<T: DeserializeOwned>(
        tree: &sled::Tree,
        key: &[u8],
        context: DiskContext,
    ) -> Result<Option<T>, IndexerError> {
        match tree.get(key)? {
            Some(raw) => Ok(Some(Self::decode_row(&raw, context)?)),
            None => Ok(None),
        }
    }

    pub(super) fn insert_json<T: Serialize>(
        tree: &sled::Tree,
        key: &[u8],
        value: &T,
    ) -> Result<(), IndexerError> {
        let raw = serde_json::to_vec(value)?;
        tree.insert(key, raw)?;
        Ok(())
    }

    // ---- version scans ----
    //
    // Entries under an exact logical key are `prefix || be64(height)`.
    // Keys extending the logical key sort inside the same range, so
    // every scan filters on entry length before decoding.

    /// Row with the greatest height at or below `height`.
    pub(super) fn last_version_at_most(
        tree: &sled::Tree,
        prefix: &[u8],
        height: BlockHeight,
    ) -> Result<Option<sled::IVec>, IndexerError> {
        let end = Self::versioned_key(prefix, height);
        for entry in tree.range(prefix.to_vec()..=end).rev() {
            let (key, value) = entry?;
            if key.len() == prefix.len() + 8 {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Row with the smallest height at or below `height`.
    pub(super) fn first_version_at_most(
        tree: &sled::Tree,
        prefix: &[u8],
        height: BlockHeight,
    ) -> Result<Option<sled::IVec>, IndexerError> {
        let end = Self::versioned_key(prefix, height);
        for entry in tree.range(prefix.to_vec()..=end) {
            let (key, value) = entry?;
            if key.len() == prefix.len() + 8 {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// All rows with the smallest height at or below `height`,
    /// ascending; used when a first-match read also carries a filter.
    pub(super) fn versions_at_most(
        tree: &sled::Tree,
        prefix: &[u8],
        height: BlockHeight,
    ) -> Result<Vec<sled::IVec>, IndexerError> {
        let end = Self::versioned_key(prefix, height);
        let mut rows = Vec::new();
        for entry in tree.range(prefix.to_vec()..=end) {
            let (key, value) = entry?;
            if key.len() == prefix.len() + 8 {
                rows.push(value);
            }
        }
        Ok(rows)
    }

    /// First height in `(after, up_to]` under the exact logical key,
    /// `up_to` unbounded when `None`.
    pub(super) fn first_version_in(
        tree: &sled::Tree,
        prefix: &[u8],
        after: BlockHeight,
        up_to: Option<BlockHeight>,
    ) -> Result<Option<BlockHeight>, IndexerError> {
        let Some(start_height) = after.checked_add(1) else {
            return Ok(None);
        };
        let start = Self::versioned_key(prefix, start_height);
        let end = Self::versioned_key(prefix, up_to.unwrap_or(BlockHeight::MAX));
        for entry in tree.range(start..=end) {
            let (key, _) = entry?;
            if key.len() == prefix.len() + 8 {
                if let Some(height) = Self::height_at_suffix(&key, 8) {
                    return Ok(Some(height));
                }
            }
        }
        Ok(None)
    }

    /// Minimum height in `(after, up_to]` across every entry under a
    /// byte prefix; `height_suffix_len` locates the height inside the
    /// entry key (8 for plain versioned trees, 12 where a 4-byte
    /// discriminator follows).
    pub(super) fn first_change_under_prefix(
        tree: &sled::Tree,
        prefix: &[u8],
        height_suffix_len: usize,
        after: BlockHeight,
        up_to: Option<BlockHeight>,
    ) -> Result<Option<BlockHeight>, IndexerError> {
        let mut earliest: Option<BlockHeight> = None;
        for entry in tree.scan_prefix(prefix) {
            let (key, _) = entry?;
            let Some(height) = Self::height_at_suffix(&key, height_suffix_len) else {
                continue;
            };
            if height <= after {
                continue;
            }
            if let Some(bound) = up_to {
                if height > bound {
                    continue;
                }
            }
            if earliest.map_or(true, |found| height < found) {
                earliest = Some(height);
            }
        }
        Ok(earliest)
    }
}
