// Millisecond unix timestamps are the only time representation the
// indexer stores: block times come from exported block rows and are
// deterministic by construction. The wall clock below exists solely
// for dynamic formula evaluation and must never feed a cached
// computation.

use std::time::{SystemTime, UNIX_EPOCH};

pub type TimestampMillis = u64;

/// Wall-clock unix time in milliseconds. Non-deterministic; a clock
/// set before the epoch reads as 0 rather than failing the evaluation.
pub fn wall_clock_unix_ms() -> TimestampMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as TimestampMillis)
        .unwrap_or(0)
}
