//! Additive token-distance relevance scoring.
//!
//! `score = Σ_q Σ_d distance(q, d)` over query stems `q` and document stems
//! `d`, counting only pairs whose distance exceeds [`RELEVANCE_THRESHOLD`].
//! Scores are not normalized by keyword count, so documents with more
//! keywords can accumulate higher scores.

use std::cmp::Ordering;

use anyhow::{bail, Result};

use crate::text::Distance;

pub const RELEVANCE_THRESHOLD: f64 = 0.5;

fn stem_contribution(stem: &str, doc_stems: &[String], distance: &dyn Distance) -> Result<f64> {
    let mut total = 0.0;
    for other in doc_stems {
        let d = distance.distance(stem, other)?;
        if !d.is_finite() {
            bail!("distance between '{}' and '{}' is not finite: {}", stem, other, d);
        }
        if d > RELEVANCE_THRESHOLD {
            total += d;
        }
    }
    Ok(total)
}

/// Relevance of a document's keyword set to the query stems.
pub fn score(query_stems: &[String], doc_stems: &[String], distance: &dyn Distance) -> Result<f64> {
    query_stems
        .iter()
        .try_fold(0.0, |acc, stem| Ok(acc + stem_contribution(stem, doc_stems, distance)?))
}

/// Descending score, then ascending id so equal scores order
/// deterministically.
pub fn rank_order(a: (&str, f64), b: (&str, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0))
}
