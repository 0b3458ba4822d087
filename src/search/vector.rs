use std::{collections::HashMap, sync::Arc};

use crate::{
   config::{STORE_BATCH_SIZE, STORE_CANDIDATE_FLOOR},
   embed::create_embedder,
   error::Result,
   search::{
      Backend, BackendKind, BackendOptions, collect_hits, document, ranking,
      sparse::{SparseIndex, SparseMode},
   },
   store::{LocalStore, VectorStore},
   types::{Card, RetrievalHit, StoreCandidate},
};

/// Backend that delegates dense similarity to a [`VectorStore`] and fuses it
/// with locally computed sparse scores.
pub struct VectorBackend {
   store:      Arc<dyn VectorStore>,
   collection: String,
   mode:       SparseMode,
   cards:      Vec<Arc<Card>>,
   positions:  HashMap<String, usize>,
   sparse:     SparseIndex,
}

impl VectorBackend {
   pub fn new(
      store: Arc<dyn VectorStore>,
      collection: impl Into<String>,
      mode: SparseMode,
   ) -> Self {
      Self {
         store,
         collection: collection.into(),
         mode,
         cards: Vec::new(),
         positions: HashMap::new(),
         sparse: SparseIndex::build(&[], mode),
      }
   }

   /// Opens the configured [`LocalStore`]. Errors here are what the backend
   /// selector falls back on.
   pub fn open(options: &BackendOptions) -> Result<Self> {
      let embedder = create_embedder(options.embedder);
      let store = LocalStore::open(options.store.location.clone(), embedder)?;
      Ok(Self::new(Arc::new(store), options.store.collection.clone(), options.sparse))
   }

   pub fn collection(&self) -> &str {
      &self.collection
   }

   fn clear(&mut self) {
      self.cards.clear();
      self.positions.clear();
      self.sparse = SparseIndex::build(&[], self.mode);
   }

   /// Per-document similarity from the store's candidates, min-max normalized
   /// over the candidate set. Documents the store did not return score 0.
   fn dense_from_candidates(&self, candidates: &[StoreCandidate]) -> Vec<f32> {
      let mut dense = vec![0.0f32; self.cards.len()];
      let mut seen: Vec<usize> = Vec::with_capacity(candidates.len());
      let mut values: Vec<f32> = Vec::with_capacity(candidates.len());

      for (rank, candidate) in candidates.iter().enumerate() {
         let Some(&idx) = self.positions.get(&candidate.id) else {
            continue;
         };
         if seen.contains(&idx) {
            continue;
         }
         let similarity = candidate
            .distance
            .map_or_else(|| 1.0 / (rank + 1) as f32, |d| 1.0 - d);
         seen.push(idx);
         values.push(similarity);
      }

      ranking::min_max_normalize(&mut values);
      for (idx, value) in seen.into_iter().zip(values) {
         dense[idx] = value;
      }
      dense
   }
}

impl Backend for VectorBackend {
   fn index(&mut self, cards: Vec<Card>) -> Result<()> {
      self.clear();
      if cards.is_empty() {
         return Ok(());
      }

      let docs: Vec<String> = cards.iter().map(document::compose).collect();
      let sparse = SparseIndex::build(&docs, self.mode);

      let documents: Vec<_> = cards
         .iter()
         .zip(docs)
         .map(|(card, text)| document::store_document(card, text))
         .collect();

      self.store.recreate_collection(&self.collection)?;
      for batch in documents.chunks(STORE_BATCH_SIZE) {
         self.store.upsert(&self.collection, batch)?;
      }

      self.positions = cards
         .iter()
         .enumerate()
         .map(|(i, c)| (c.id.clone(), i))
         .collect();
      self.cards = cards.into_iter().map(Arc::new).collect();
      self.sparse = sparse;

      tracing::debug!(
         cards = self.cards.len(),
         collection = %self.collection,
         "indexed vector-store backend"
      );
      Ok(())
   }

   fn query(&self, text: &str, top_k: usize) -> Vec<RetrievalHit> {
      let n = self.cards.len();
      if n == 0 {
         return Vec::new();
      }
      let k = ranking::clamp_top_k(top_k, n);
      let n_candidates = (k * 3).max(STORE_CANDIDATE_FLOOR).min(n);

      let sparse = self.sparse.scores(text);

      match self.store.query(&self.collection, text, n_candidates) {
         Ok(candidates) => {
            let dense = self.dense_from_candidates(&candidates);
            let hybrid = ranking::fuse(&[sparse.as_slice(), dense.as_slice()], n);
            collect_hits(&self.cards, &hybrid, &sparse, Some(&dense), k)
         },
         Err(e) => {
            tracing::warn!("vector store query failed, continuing sparse-only: {e}");
            let hybrid = ranking::fuse(&[sparse.as_slice()], n);
            collect_hits(&self.cards, &hybrid, &sparse, None, k)
         },
      }
   }

   fn kind(&self) -> BackendKind {
      BackendKind::Store
   }

   fn len(&self) -> usize {
      self.cards.len()
   }
}

#[cfg(test)]
mod tests {
   use parking_lot::Mutex;

   use super::*;
   use crate::{
      embed::HashingEmbedder,
      error::Error,
      search::tests::{many_cards, sample_cards, scenario_cards},
      types::StoreDocument,
   };

   fn backend() -> VectorBackend {
      let store = LocalStore::ephemeral(Arc::new(HashingEmbedder::default())).unwrap();
      VectorBackend::new(Arc::new(store), "test_cards", SparseMode::Bm25)
   }

   /// Returns canned candidates and records upsert batch sizes.
   #[derive(Default)]
   struct ScriptedStore {
      candidates: Vec<StoreCandidate>,
      fail_query: bool,
      batches:    Mutex<Vec<usize>>,
   }

   impl VectorStore for ScriptedStore {
      fn recreate_collection(&self, _collection: &str) -> Result<()> {
         self.batches.lock().clear();
         Ok(())
      }

      fn upsert(&self, _collection: &str, documents: &[StoreDocument]) -> Result<()> {
         self.batches.lock().push(documents.len());
         Ok(())
      }

      fn query(&self, _collection: &str, _text: &str, n: usize) -> Result<Vec<StoreCandidate>> {
         if self.fail_query {
            return Err(Error::Store("connection reset".to_string()));
         }
         Ok(self.candidates.iter().take(n).cloned().collect())
      }

      fn count(&self, _collection: &str) -> Result<usize> {
         Ok(self.batches.lock().iter().sum())
      }
   }

   fn candidate(id: &str, distance: Option<f32>) -> StoreCandidate {
      StoreCandidate { id: id.to_string(), distance }
   }

   #[test]
   fn seaborn_query_returns_plotting_card() {
      let mut backend = backend();
      backend.index(scenario_cards()).unwrap();

      let hits = backend.query("build seaborn heatmap chart", 1);
      assert_eq!(hits.len(), 1);
      assert_eq!(hits[0].card.id, "a");
      assert!(hits[0].dense_score.is_some());
   }

   #[test]
   fn empty_index_clears_state() {
      let mut backend = backend();
      backend.index(scenario_cards()).unwrap();
      backend.index(Vec::new()).unwrap();
      assert!(backend.query("seaborn", 3).is_empty());
   }

   #[test]
   fn reindex_with_new_corpus_forgets_old_ids() {
      let store = Arc::new(LocalStore::ephemeral(Arc::new(HashingEmbedder::default())).unwrap());
      let mut backend = VectorBackend::new(store.clone(), "reindexed", SparseMode::Bm25);
      backend.index(scenario_cards()).unwrap();
      assert_eq!(backend.query("pytorch cuda training", 1)[0].card.id, "b");

      backend.index(sample_cards()).unwrap();
      assert_eq!(backend.len(), 6);
      assert_eq!(store.count("reindexed").unwrap(), 6);

      let hits = backend.query("pytorch cuda training loop", 20);
      assert_eq!(hits.len(), 6);
      assert_eq!(hits[0].card.id, "ml.pytorch");
      assert!(hits.iter().all(|h| !["a", "b", "c"].contains(&h.card.id.as_str())));
   }

   #[test]
   fn large_corpora_cap_at_twenty_hits() {
      let mut backend = backend();
      backend.index(many_cards(30)).unwrap();

      let hits = backend.query("topic 12 instructions", 25);
      assert_eq!(hits.len(), 20);
      assert_eq!(hits[0].card.id, "card-12");
      assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
   }

   #[test]
   fn top_k_is_clamped_and_ordered() {
      let mut backend = backend();
      backend.index(sample_cards()).unwrap();

      let hits = backend.query("training loop with cuda", 100);
      assert_eq!(hits.len(), sample_cards().len());
      assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
   }

   #[test]
   fn upserts_in_bounded_batches() {
      let store = Arc::new(ScriptedStore::default());
      let mut backend = VectorBackend::new(store.clone(), "big", SparseMode::Bm25);
      let cards: Vec<Card> = (0..1203)
         .map(|i| Card::new(format!("card-{i}"), "generic instructions"))
         .collect();
      backend.index(cards).unwrap();

      assert_eq!(*store.batches.lock(), vec![500, 500, 203]);
   }

   #[test]
   fn distances_become_normalized_similarities() {
      let store = Arc::new(ScriptedStore {
         candidates: vec![
            candidate("c", Some(0.1)),
            candidate("unknown", Some(0.0)),
            candidate("a", Some(0.5)),
         ],
         ..ScriptedStore::default()
      });
      let mut backend = VectorBackend::new(store, "scripted", SparseMode::Bm25);
      backend.index(scenario_cards()).unwrap();

      let hits = backend.query("???", 3);
      let dense: HashMap<&str, f32> = hits
         .iter()
         .map(|h| (h.card.id.as_str(), h.dense_score.unwrap()))
         .collect();
      assert!((dense["c"] - 1.0).abs() < 1e-6);
      assert_eq!(dense["a"], 0.0);
      assert_eq!(dense["b"], 0.0);
   }

   #[test]
   fn missing_distances_fall_back_to_rank() {
      let store = Arc::new(ScriptedStore {
         candidates: vec![candidate("b", None), candidate("a", None), candidate("c", None)],
         ..ScriptedStore::default()
      });
      let mut backend = VectorBackend::new(store, "scripted", SparseMode::Bm25);
      backend.index(scenario_cards()).unwrap();

      // similarities 1, 1/2, 1/3 before normalization
      let hits = backend.query("???", 3);
      let dense: HashMap<&str, f32> = hits
         .iter()
         .map(|h| (h.card.id.as_str(), h.dense_score.unwrap()))
         .collect();
      assert!((dense["b"] - 1.0).abs() < 1e-6);
      assert!((dense["a"] - 0.25).abs() < 1e-6);
      assert_eq!(dense["c"], 0.0);
      assert_eq!(hits[2].card.id, "c");
   }

   #[test]
   fn failing_store_query_degrades_to_sparse_only() {
      let store = Arc::new(ScriptedStore { fail_query: true, ..ScriptedStore::default() });
      let mut backend = VectorBackend::new(store, "scripted", SparseMode::Bm25);
      backend.index(scenario_cards()).unwrap();

      let hits = backend.query("build seaborn heatmap chart", 2);
      assert_eq!(hits[0].card.id, "a");
      assert_eq!(hits[0].score, hits[0].sparse_score);
      assert!(hits.iter().all(|h| h.dense_score.is_none()));
   }
}
