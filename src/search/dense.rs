//! Optional embedding-based relevance. Any embedder failure turns the dense
//! signal off instead of failing the caller.

use std::sync::Arc;

use ndarray::{Array1, Array2};

use crate::{embed::Embedder, search::ranking::min_max_normalize};

/// Unit-normalized document embeddings, one row per indexed document.
pub struct DenseIndex {
   embedder: Arc<dyn Embedder>,
   vectors:  Array2<f32>,
}

impl DenseIndex {
   /// Embeds `docs`. Returns `None` (dense scoring unavailable) when the
   /// embedder cannot load or produces inconsistent output.
   pub fn build(embedder: Arc<dyn Embedder>, docs: &[String]) -> Option<Self> {
      if docs.is_empty() {
         return None;
      }

      let embeddings = match embedder.embed_documents(docs) {
         Ok(embeddings) => embeddings,
         Err(e) => {
            tracing::warn!("dense scoring unavailable, continuing sparse-only: {e}");
            return None;
         },
      };

      let dim = embeddings.first().map_or(0, Vec::len);
      if embeddings.len() != docs.len() || dim == 0 || embeddings.iter().any(|v| v.len() != dim) {
         tracing::warn!("embedder returned malformed vectors, continuing sparse-only");
         return None;
      }

      let flat: Vec<f32> = embeddings.into_iter().flatten().collect();
      let vectors = Array2::from_shape_vec((docs.len(), dim), flat).ok()?;

      tracing::debug!(docs = docs.len(), dim, "dense index built");
      Some(Self { embedder, vectors })
   }

   /// Cosine similarity per document, min-max normalized into `[0, 1]`.
   /// `None` when the query cannot be embedded.
   pub fn scores(&self, query: &str) -> Option<Vec<f32>> {
      let query_vec = match self.embedder.embed_query(query) {
         Ok(v) => v,
         Err(e) => {
            tracing::warn!("query embedding failed, continuing sparse-only: {e}");
            return None;
         },
      };
      if query_vec.len() != self.vectors.ncols() {
         tracing::warn!(
            expected = self.vectors.ncols(),
            got = query_vec.len(),
            "query embedding dimension mismatch"
         );
         return None;
      }

      let mut scores = self.vectors.dot(&Array1::from(query_vec)).to_vec();
      min_max_normalize(&mut scores);
      Some(scores)
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::{
      embed::HashingEmbedder,
      error::{Error, Result},
   };

   struct BrokenEmbedder;

   impl Embedder for BrokenEmbedder {
      fn embed_documents(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
         Err(Error::Embedding("model missing".to_string()))
      }

      fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
         Err(Error::Embedding("model missing".to_string()))
      }

      fn warm_up(&self) -> Result<()> {
         Err(Error::Embedding("model missing".to_string()))
      }
   }

   fn docs() -> Vec<String> {
      vec![
         "matplotlib seaborn plotting charts".to_string(),
         "pytorch cuda training loop".to_string(),
         "opencv contour detection edges".to_string(),
      ]
   }

   #[test]
   fn scores_are_min_max_normalized() {
      let index = DenseIndex::build(Arc::new(HashingEmbedder::default()), &docs()).unwrap();

      let scores = index.scores("seaborn charts").unwrap();
      assert_eq!(scores.len(), 3);
      assert!((scores[0] - 1.0).abs() < 1e-6);
      assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
   }

   #[test]
   fn failing_embedder_disables_dense() {
      assert!(DenseIndex::build(Arc::new(BrokenEmbedder), &docs()).is_none());
   }

   #[test]
   fn empty_corpus_has_no_dense_index() {
      assert!(DenseIndex::build(Arc::new(HashingEmbedder::default()), &[]).is_none());
   }

   #[test]
   fn unmatched_query_collapses_to_zero() {
      let index = DenseIndex::build(Arc::new(HashingEmbedder::default()), &docs()).unwrap();
      // an empty query embeds to the zero vector, so every similarity is equal
      assert_eq!(index.scores("???").unwrap(), vec![0.0, 0.0, 0.0]);
   }
}
