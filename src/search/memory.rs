use std::sync::Arc;

use crate::{
   embed::Embedder,
   error::Result,
   search::{
      Backend, BackendKind, collect_hits, dense::DenseIndex, document, ranking,
      sparse::{SparseIndex, SparseMode},
   },
   types::{Card, RetrievalHit},
};

/// Fully in-process backend: BM25 over the composite texts, optionally fused
/// with embedding similarity.
pub struct MemoryBackend {
   embedder: Option<Arc<dyn Embedder>>,
   mode:     SparseMode,
   cards:    Vec<Arc<Card>>,
   sparse:   SparseIndex,
   dense:    Option<DenseIndex>,
}

impl MemoryBackend {
   pub fn new(mode: SparseMode) -> Self {
      Self {
         embedder: None,
         mode,
         cards: Vec::new(),
         sparse: SparseIndex::build(&[], mode),
         dense: None,
      }
   }

   /// Enables dense scoring with `embedder`. Documents are embedded at index
   /// time; if that fails the backend silently stays sparse-only.
   pub fn with_dense(mut self, embedder: Arc<dyn Embedder>) -> Self {
      self.embedder = Some(embedder);
      self
   }

   pub const fn has_dense(&self) -> bool {
      self.dense.is_some()
   }
}

impl Default for MemoryBackend {
   fn default() -> Self {
      Self::new(SparseMode::default())
   }
}

impl Backend for MemoryBackend {
   fn index(&mut self, cards: Vec<Card>) -> Result<()> {
      let docs: Vec<String> = cards.iter().map(document::compose).collect();

      self.sparse = SparseIndex::build(&docs, self.mode);
      self.dense = self
         .embedder
         .as_ref()
         .and_then(|embedder| DenseIndex::build(Arc::clone(embedder), &docs));
      self.cards = cards.into_iter().map(Arc::new).collect();

      tracing::debug!(
         cards = self.cards.len(),
         dense = self.dense.is_some(),
         "indexed in-process backend"
      );
      Ok(())
   }

   fn query(&self, text: &str, top_k: usize) -> Vec<RetrievalHit> {
      if self.cards.is_empty() {
         return Vec::new();
      }
      let k = ranking::clamp_top_k(top_k, self.cards.len());

      let sparse = self.sparse.scores(text);
      let dense = self.dense.as_ref().and_then(|d| d.scores(text));

      let hybrid = match &dense {
         Some(dense) => ranking::fuse(&[sparse.as_slice(), dense.as_slice()], self.cards.len()),
         None => ranking::fuse(&[sparse.as_slice()], self.cards.len()),
      };

      collect_hits(&self.cards, &hybrid, &sparse, dense.as_deref(), k)
   }

   fn kind(&self) -> BackendKind {
      BackendKind::Memory
   }

   fn len(&self) -> usize {
      self.cards.len()
   }
}
