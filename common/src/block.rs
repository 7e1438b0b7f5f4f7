use serde::{Deserialize, Serialize};

use crate::time::TimestampMillis;

// Monotonic integer identifying a chain state
pub type BlockHeight = u64;

/// A block reference as the indexer sees it: the height and the block
/// timestamp are always consistent because both come from the same
/// exported block row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: BlockHeight,
    #[serde(rename = "timeUnixMs")]
    pub timestamp: TimestampMillis,
}

impl Block {
    pub fn new(height: BlockHeight, timestamp: TimestampMillis) -> Self {
        Self { height, timestamp }
    }
}

impl PartialOrd for Block {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Block {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.height.cmp(&other.height)
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ({}ms)", self.height, self.timestamp)
    }
}
