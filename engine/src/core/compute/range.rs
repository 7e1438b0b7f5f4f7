//! Range assembler: project a piecewise-constant series onto a
//! caller-supplied sampling grid.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vantage_common::{block::Block, time::TimestampMillis};

use crate::core::{error::IndexerError, storage::Computation};

/// Sampling grid for one range query. `blocks` and `times` both carry
/// the closed range bounds; which one drives sampling depends on the
/// step that is set. With neither step the raw pieces are emitted.
#[derive(Debug, Clone)]
pub struct RangeGrid {
    pub blocks: (Block, Block),
    pub times: (TimestampMillis, TimestampMillis),
    pub block_step: Option<u64>,
    pub time_step: Option<u64>,
}

/// One emitted sample. `at` is the grid coordinate (block height or
/// unix-ms time) when stepping, absent for raw pieces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSample {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<u64>,
    pub block: Block,
    pub value: Option<Value>,
}

/// Left-closed, right-closed sampling: one sample per step from the
/// range start, plus a final sample at the range end when the step
/// does not land on it exactly. The value at a boundary is the piece
/// whose validity interval contains it.
pub fn process_computation_range(
    outputs: &[Computation],
    grid: &RangeGrid,
) -> Result<Vec<RangeSample>, IndexerError> {
    if let Some(step) = grid.block_step.or(grid.time_step) {
        if step == 0 {
            return Err(IndexerError::InvalidStep);
        }
    }

    if let Some(step) = grid.block_step {
        let (start, end) = (grid.blocks.0.height, grid.blocks.1.height);
        return Ok(sample_points(start, end, step)
            .map(|height| {
                let piece = piece_at_height(outputs, height);
                RangeSample {
                    at: Some(height),
                    block: piece.map(|piece| piece.block).unwrap_or(grid.blocks.0),
                    value: piece.and_then(|piece| piece.output.clone()),
                }
            })
            .collect());
    }

    if let Some(step) = grid.time_step {
        let (start, end) = grid.times;
        return Ok(sample_points(start, end, step)
            .map(|time| {
                let piece = piece_at_time(outputs, time);
                RangeSample {
                    at: Some(time),
                    block: piece.map(|piece| piece.block).unwrap_or(grid.blocks.0),
                    value: piece.and_then(|piece| piece.output.clone()),
                }
            })
            .collect());
    }

    Ok(outputs
        .iter()
        .map(|piece| RangeSample {
            at: None,
            block: piece.block,
            value: piece.output.clone(),
        })
        .collect())
}

// start, start+step, ... then the end itself when the last step
// undershoots it
fn sample_points(start: u64, end: u64, step: u64) -> impl Iterator<Item = u64> {
    let stepped = (start..=end).step_by(step.min(usize::MAX as u64) as usize);
    let tail = if start <= end && (end - start) % step != 0 {
        Some(end)
    } else {
        None
    };
    stepped.chain(tail)
}

// Pieces are ascending by block height; the piece owning `height` is
// the last one starting at or below it, provided its interval reaches.
fn piece_at_height(outputs: &[Computation], height: u64) -> Option<&Computation> {
    outputs
        .iter()
        .take_while(|piece| piece.block.height <= height)
        .last()
        .filter(|piece| piece.latest_block_height_valid >= height)
}

// Same by block time; validity intervals are height-based, so a piece
// owns every instant from its block time up to the next piece's.
fn piece_at_time(outputs: &[Computation], time: TimestampMillis) -> Option<&Computation> {
    outputs
        .iter()
        .take_while(|piece| piece.block.timestamp <= time)
        .last()
}
