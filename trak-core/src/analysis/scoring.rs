//! Deterministic quality score.
//!
//! ```text
//! score = 100 - 18*high - 8*medium - 3*low
//!             - min(12, floor(complexity / 25) * 3)
//!             - min(10, duplication)
//! ```
//!
//! clamped to `[0, 100]`. A session with no issues never scores below
//! [`CLEAN_FLOOR`].

use crate::types::IssueCount;

pub const HIGH_PENALTY: i64 = 18;
pub const MEDIUM_PENALTY: i64 = 8;
pub const LOW_PENALTY: i64 = 3;

const COMPLEXITY_STEP: u32 = 25;
const COMPLEXITY_PENALTY_PER_STEP: i64 = 3;
const MAX_COMPLEXITY_PENALTY: i64 = 12;
const MAX_DUPLICATION_PENALTY: i64 = 10;

/// Minimum score for a session with zero issues
pub const CLEAN_FLOOR: u8 = 85;

pub fn quality_score(counts: &IssueCount, complexity: u32, duplication: u32) -> u8 {
    let issue_penalty = HIGH_PENALTY * i64::from(counts.high)
        + MEDIUM_PENALTY * i64::from(counts.medium)
        + LOW_PENALTY * i64::from(counts.low);
    let complexity_penalty = (i64::from(complexity / COMPLEXITY_STEP)
        * COMPLEXITY_PENALTY_PER_STEP)
        .min(MAX_COMPLEXITY_PENALTY);
    let duplication_penalty = i64::from(duplication).min(MAX_DUPLICATION_PENALTY);

    let score = (100 - issue_penalty - complexity_penalty - duplication_penalty).clamp(0, 100) as u8;

    if counts.total() == 0 {
        score.max(CLEAN_FLOOR)
    } else {
        score
    }
}
