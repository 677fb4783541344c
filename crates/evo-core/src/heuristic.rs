//! Deterministic half of the artifact score.

use crate::artifact::ArtifactSummary;

pub const MAX_SCORE: u32 = 100;
pub const NODE_WEIGHT: u32 = 5;
pub const BRANCHING_BONUS: u32 = 15;
pub const ERROR_HANDLING_BONUS: u32 = 15;
pub const MULTI_API_BONUS: u32 = 10;

/// Weighted sum over the summary, clamped to [0, 100].
pub fn heuristic_score(summary: &ArtifactSummary) -> u32 {
    let nodes = u32::try_from(summary.total).unwrap_or(u32::MAX);
    let mut score = nodes.saturating_mul(NODE_WEIGHT);
    if summary.has_branching {
        score = score.saturating_add(BRANCHING_BONUS);
    }
    if summary.has_error {
        score = score.saturating_add(ERROR_HANDLING_BONUS);
    }
    if summary.external_apis >= 2 {
        score = score.saturating_add(MULTI_API_BONUS);
    }
    score.min(MAX_SCORE)
}

/// Mean of the two components, rounded down. Both inputs are clamped
/// first, so the result always lies in [0, 100].
pub fn blend(heuristic: u32, qualitative: u32) -> u32 {
    (heuristic.min(MAX_SCORE) + qualitative.min(MAX_SCORE)) / 2
}
