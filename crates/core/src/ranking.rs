//! Ordering scored candidates into a recommendation list.

use serde::{Deserialize, Serialize};

use crate::candidates::CandidateRow;
use crate::errors::DataError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub stock_code: String,
    pub description: String,
    pub score: f32,
}

/// Pair candidates with their scores, sort by descending score and keep `count`.
///
/// The sort is stable, so equal scores keep candidate (popularity) order.
pub fn rank(
    candidates: Vec<CandidateRow>,
    scores: &[f32],
    count: usize,
) -> Result<Vec<Recommendation>, DataError> {
    if candidates.len() != scores.len() {
        return Err(DataError::ScoreCountMismatch {
            expected: candidates.len(),
            actual: scores.len(),
        });
    }

    let mut ranked: Vec<Recommendation> = candidates
        .into_iter()
        .zip(scores)
        .map(|(candidate, score)| Recommendation {
            stock_code: candidate.stock_code,
            description: candidate.description,
            score: *score,
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(count);
    Ok(ranked)
}
