//! Similarity ranker: scores every job vector against the resume vector and
//! keeps the best `top_n`.
//!
//! Ordering is a stable sort on similarity, so ties keep their input order and
//! reruns over the same file produce the same ranking.

use std::cmp::Ordering;

use tracing::warn;

use crate::models::{EmbeddingRecord, RankedResult};

pub mod output;
pub mod similarity;
pub mod stage;

pub use similarity::cosine_similarity;
pub use stage::RankStage;

#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    /// The first `min(top_n, candidates)` results, ranked from 1.
    pub results: Vec<RankedResult>,
    pub candidates: usize,
    /// Candidates whose vector length did not match the reference.
    pub rejected: usize,
}

pub fn rank_candidates(reference: &[f32], candidates: Vec<EmbeddingRecord>, top_n: usize) -> Ranking {
    let total = candidates.len();
    let mut rejected = 0usize;

    let mut scored: Vec<(f64, EmbeddingRecord)> = candidates
        .into_iter()
        .map(|record| {
            if record.embedding.len() != reference.len() {
                rejected += 1;
                warn!(
                    "Job {} has a {}-dimensional vector, resume has {}; scoring it 0",
                    record.job_key.as_deref().unwrap_or("<no key>"),
                    record.embedding.len(),
                    reference.len()
                );
            }
            (cosine_similarity(reference, &record.embedding), record)
        })
        .collect();

    // sort_by is stable
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    let results = scored
        .into_iter()
        .take(top_n)
        .enumerate()
        .map(|(idx, (similarity, record))| RankedResult {
            rank: idx + 1,
            title: record.meta.display_title().map(str::to_string),
            company: record.meta.display_company().map(str::to_string),
            location: record.meta.display_location().map(str::to_string),
            job_key: record.job_key,
            similarity,
            meta: record.meta,
        })
        .collect();

    Ranking {
        results,
        candidates: total,
        rejected,
    }
}
