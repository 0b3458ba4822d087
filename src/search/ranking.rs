//! Ordering and fusion utilities shared by every backend.

use std::cmp::Ordering;

use crate::config::{DENSE_EPSILON, MAX_TOP_K, RRF_K};

/// Indices of `scores` from best to worst. Ties keep corpus order, so the
/// ordering is reproducible for identical input.
pub fn rank_order(scores: &[f32]) -> Vec<usize> {
   let mut order: Vec<usize> = (0..scores.len()).collect();
   order.sort_by(|&a, &b| descending(scores[a], scores[b]));
   order
}

fn descending(a: f32, b: f32) -> Ordering {
   b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Reciprocal Rank Fusion over `rankings` of the same `n_docs` documents:
/// `score[d] = sum(1 / (RRF_K + rank))` with ranks starting at 1.
pub fn reciprocal_rank_fusion(rankings: &[Vec<usize>], n_docs: usize) -> Vec<f32> {
   let mut fused = vec![0.0f32; n_docs];
   for ranking in rankings {
      for (rank, &doc) in ranking.iter().enumerate() {
         if let Some(slot) = fused.get_mut(doc) {
            *slot += 1.0 / (RRF_K + (rank + 1) as f32);
         }
      }
   }
   fused
}

/// Combines per-signal score vectors into one hybrid score per document.
///
/// A single signal is returned as-is rather than rank-fused, which keeps the
/// magnitude of sparse-only results meaningful.
pub fn fuse(signals: &[&[f32]], n_docs: usize) -> Vec<f32> {
   match signals {
      [] => vec![0.0; n_docs],
      [only] => only.to_vec(),
      many => {
         let rankings: Vec<Vec<usize>> = many.iter().map(|s| rank_order(s)).collect();
         reciprocal_rank_fusion(&rankings, n_docs)
      },
   }
}

/// Min-max normalizes into `[0, 1]`. A collapsed range zeroes everything.
pub fn min_max_normalize(scores: &mut [f32]) {
   let (min, max) = scores
      .iter()
      .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));

   if scores.is_empty() || max - min < DENSE_EPSILON {
      scores.fill(0.0);
      return;
   }
   for s in scores.iter_mut() {
      *s = (*s - min) / (max - min);
   }
}

/// Clamps a requested hit count to `[1, min(MAX_TOP_K, corpus_size)]`.
pub fn clamp_top_k(requested: usize, corpus_size: usize) -> usize {
   requested.min(MAX_TOP_K).min(corpus_size).max(1)
}
