//! Cosine nearest-neighbour store over an HNSW graph, either purely in memory
//! or persisted as one postcard file of records per collection.
//!
//! The graph is append-only: re-upserting an id inserts a fresh node and the
//! old node stays behind as a stale slot that queries skip. Persisting writes
//! only live records, so a reopened collection starts without stale slots.

use std::{
   collections::HashMap,
   fs,
   path::{Path, PathBuf},
   sync::Arc,
};

use hnsw::{Hnsw, Searcher};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use space::{Metric, Neighbor};

use crate::{
   embed::Embedder,
   error::{Error, Result},
   store::VectorStore,
   types::{StoreCandidate, StoreDocument},
};

const COLLECTION_EXT: &str = "postcard";

/// Lower bound on the HNSW search beam.
const MIN_EF_SEARCH: usize = 50;

/// Cosine distances in `[0, 2]` are mapped onto the full `u32` range.
const DISTANCE_SCALE: f32 = u32::MAX as f32 / 2.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
   /// Nothing touches disk; contents vanish with the store.
   Ephemeral,
   Persistent(PathBuf),
}

struct CosineDistance;

impl Metric<Box<[f32]>> for CosineDistance {
   type Unit = u32;

   fn distance(&self, a: &Box<[f32]>, b: &Box<[f32]>) -> u32 {
      let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
      let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
      let norm_b = b.iter().map(|y| y * y).sum::<f32>().sqrt();
      if norm_a == 0.0 || norm_b == 0.0 {
         return u32::MAX;
      }
      let distance = (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0);
      (distance * DISTANCE_SCALE) as u32
   }
}

type Graph = Hnsw<CosineDistance, Box<[f32]>, StdRng, 16, 32>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
   document: StoreDocument,
   vector:   Vec<f32>,
}

struct Collection {
   /// Indexed by graph node.
   records:  Vec<Record>,
   /// Live node per document id.
   live:     HashMap<String, usize>,
   graph:    Graph,
   searcher: Searcher<u32>,
}

impl Collection {
   fn new() -> Self {
      Self {
         records:  Vec::new(),
         live:     HashMap::new(),
         graph:    Hnsw::new(CosineDistance),
         searcher: Searcher::default(),
      }
   }

   fn from_records(records: Vec<Record>) -> Self {
      let mut collection = Self::new();
      for record in records {
         collection.insert(record);
      }
      collection
   }

   fn insert(&mut self, record: Record) {
      let node = self
         .graph
         .insert(record.vector.clone().into_boxed_slice(), &mut self.searcher);
      debug_assert_eq!(node, self.records.len());
      self.live.insert(record.document.id.clone(), node);
      self.records.push(record);
   }

   fn is_live(&self, node: usize) -> bool {
      self
         .records
         .get(node)
         .is_some_and(|r| self.live.get(&r.document.id) == Some(&node))
   }

   fn len(&self) -> usize {
      self.live.len()
   }

   fn live_records(&self) -> Vec<&Record> {
      (0..self.records.len())
         .filter(|&node| self.is_live(node))
         .map(|node| &self.records[node])
         .collect()
   }

   fn nearest(&self, query: &[f32], n: usize) -> Vec<StoreCandidate> {
      let wanted = n.min(self.len());
      if wanted == 0 {
         return Vec::new();
      }

      // Stale nodes can crowd the beam, so over-fetch by their count.
      let stale = self.records.len() - self.len();
      let fetch = (wanted + stale).min(self.records.len());
      let mut neighbors = vec![Neighbor { index: !0, distance: !0 }; fetch];
      let mut searcher = Searcher::default();
      let query = query.to_vec().into_boxed_slice();
      let found = self.graph.nearest(
         &query,
         (fetch * 2).max(MIN_EF_SEARCH),
         &mut searcher,
         &mut neighbors,
      );

      found
         .iter()
         .filter(|n| self.is_live(n.index))
         .take(wanted)
         .map(|n| StoreCandidate {
            id:       self.records[n.index].document.id.clone(),
            distance: Some(n.distance as f32 / DISTANCE_SCALE),
         })
         .collect()
   }
}

pub struct LocalStore {
   embedder:    Arc<dyn Embedder>,
   root:        Option<PathBuf>,
   collections: RwLock<HashMap<String, Collection>>,
}

impl LocalStore {
   /// Opens the store. Fails with [`Error::StoreUnavailable`] when the
   /// embedder cannot be loaded or the persistence directory is unusable.
   pub fn open(location: StoreLocation, embedder: Arc<dyn Embedder>) -> Result<Self> {
      embedder
         .warm_up()
         .map_err(|e| Error::StoreUnavailable(format!("embedder failed to load: {e}")))?;

      let (root, collections) = match location {
         StoreLocation::Ephemeral => (None, HashMap::new()),
         StoreLocation::Persistent(dir) => {
            let collections = load_collections(&dir).map_err(|e| {
               Error::StoreUnavailable(format!("cannot open store at {}: {e}", dir.display()))
            })?;
            (Some(dir), collections)
         },
      };

      tracing::debug!(
         persistent = root.is_some(),
         collections = collections.len(),
         "opened hnsw vector store"
      );

      Ok(Self { embedder, root, collections: RwLock::new(collections) })
   }

   pub fn ephemeral(embedder: Arc<dyn Embedder>) -> Result<Self> {
      Self::open(StoreLocation::Ephemeral, embedder)
   }

   fn persist(&self, name: &str, collection: &Collection) -> Result<()> {
      let Some(root) = &self.root else {
         return Ok(());
      };
      let bytes = postcard::to_allocvec(&collection.live_records())?;
      fs::write(collection_path(root, name), bytes)?;
      Ok(())
   }
}

fn collection_path(root: &Path, name: &str) -> PathBuf {
   root.join(format!("{name}.{COLLECTION_EXT}"))
}

fn load_collections(dir: &Path) -> Result<HashMap<String, Collection>> {
   fs::create_dir_all(dir)?;

   let mut collections = HashMap::new();
   for entry in fs::read_dir(dir)? {
      let path = entry?.path();
      if path.extension().is_none_or(|ext| ext != COLLECTION_EXT) {
         continue;
      }
      let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
         continue;
      };
      let records: Vec<Record> = postcard::from_bytes(&fs::read(&path)?)?;
      collections.insert(name.to_string(), Collection::from_records(records));
   }
   Ok(collections)
}

fn validate_name(name: &str) -> Result<()> {
   let valid = !name.is_empty()
      && name.len() <= 63
      && name
         .chars()
         .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
   if valid {
      Ok(())
   } else {
      Err(Error::Store(format!("invalid collection name '{name}'")))
   }
}

fn missing(name: &str) -> Error {
   Error::Store(format!("collection '{name}' does not exist"))
}

impl VectorStore for LocalStore {
   fn recreate_collection(&self, collection: &str) -> Result<()> {
      validate_name(collection)?;

      let mut collections = self.collections.write();
      let fresh = Collection::new();
      self.persist(collection, &fresh)?;
      collections.insert(collection.to_string(), fresh);
      Ok(())
   }

   fn upsert(&self, collection: &str, documents: &[StoreDocument]) -> Result<()> {
      if documents.is_empty() {
         return Ok(());
      }

      let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
      let vectors = self.embedder.embed_documents(&texts)?;
      if vectors.len() != documents.len() {
         return Err(Error::Store(format!(
            "embedder returned {} vectors for {} documents",
            vectors.len(),
            documents.len()
         )));
      }

      let mut collections = self.collections.write();
      let target = collections
         .get_mut(collection)
         .ok_or_else(|| missing(collection))?;

      for (document, vector) in documents.iter().zip(vectors) {
         target.insert(Record { document: document.clone(), vector });
      }

      self.persist(collection, target)
   }

   fn query(&self, collection: &str, text: &str, n: usize) -> Result<Vec<StoreCandidate>> {
      let query = self.embedder.embed_query(text)?;

      let collections = self.collections.read();
      let target = collections.get(collection).ok_or_else(|| missing(collection))?;
      Ok(target.nearest(&query, n))
   }

   fn count(&self, collection: &str) -> Result<usize> {
      self
         .collections
         .read()
         .get(collection)
         .map(Collection::len)
         .ok_or_else(|| missing(collection))
   }
}

#[cfg(test)]
mod tests {
   use tempfile::TempDir;

   use super::*;
   use crate::{embed::HashingEmbedder, types::StoreMetadata};

   fn doc(id: &str, text: &str) -> StoreDocument {
      StoreDocument {
         id:       id.to_string(),
         text:     text.to_string(),
         metadata: StoreMetadata::default(),
      }
   }

   fn embedder() -> Arc<dyn Embedder> {
      Arc::new(HashingEmbedder::default())
   }

   #[test]
   fn query_returns_nearest_first() {
      let store = LocalStore::ephemeral(embedder()).unwrap();
      store.recreate_collection("cards").unwrap();
      store
         .upsert("cards", &[
            doc("a", "matplotlib seaborn plotting charts"),
            doc("b", "pytorch cuda training loop"),
         ])
         .unwrap();

      let hits = store.query("cards", "seaborn charts", 2).unwrap();
      assert_eq!(hits.len(), 2);
      assert_eq!(hits[0].id, "a");
      assert!(hits[0].distance.unwrap() < hits[1].distance.unwrap());
   }

   #[test]
   fn upsert_replaces_by_id() {
      let store = LocalStore::ephemeral(embedder()).unwrap();
      store.recreate_collection("cards").unwrap();
      store.upsert("cards", &[doc("a", "one"), doc("b", "two")]).unwrap();
      store.upsert("cards", &[doc("a", "three")]).unwrap();
      assert_eq!(store.count("cards").unwrap(), 2);
   }

   #[test]
   fn replaced_documents_are_not_returned_twice() {
      let store = LocalStore::ephemeral(embedder()).unwrap();
      store.recreate_collection("cards").unwrap();
      store.upsert("cards", &[doc("a", "seaborn charts"), doc("b", "cuda training")]).unwrap();
      store.upsert("cards", &[doc("a", "opencv contours")]).unwrap();

      let hits = store.query("cards", "opencv contours", 10).unwrap();
      assert_eq!(hits.len(), 2);
      assert_eq!(hits[0].id, "a");
      assert!(hits[0].distance.unwrap() < 1e-3);
      assert_eq!(hits.iter().filter(|h| h.id == "a").count(), 1);
   }

   #[test]
   fn query_never_exceeds_collection_size() {
      let store = LocalStore::ephemeral(embedder()).unwrap();
      store.recreate_collection("cards").unwrap();
      assert!(store.query("cards", "anything", 5).unwrap().is_empty());

      let docs: Vec<StoreDocument> =
         (0..40).map(|i| doc(&format!("d{i}"), &format!("topic {i} notes"))).collect();
      store.upsert("cards", &docs).unwrap();
      let hits = store.query("cards", "topic 7 notes", 25).unwrap();
      assert_eq!(hits.len(), 25);
      assert_eq!(hits[0].id, "d7");
      assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
   }

   #[test]
   fn recreate_drops_previous_contents() {
      let store = LocalStore::ephemeral(embedder()).unwrap();
      store.recreate_collection("cards").unwrap();
      store.upsert("cards", &[doc("a", "one")]).unwrap();
      store.recreate_collection("cards").unwrap();
      assert_eq!(store.count("cards").unwrap(), 0);
   }

   #[test]
   fn unknown_collection_is_an_error() {
      let store = LocalStore::ephemeral(embedder()).unwrap();
      assert!(store.query("nope", "text", 3).is_err());
      assert!(store.upsert("nope", &[doc("a", "one")]).is_err());
   }

   #[test]
   fn rejects_bad_collection_names() {
      let store = LocalStore::ephemeral(embedder()).unwrap();
      assert!(store.recreate_collection("").is_err());
      assert!(store.recreate_collection("has space").is_err());
   }

   #[test]
   fn persistent_store_survives_reopen() {
      let dir = TempDir::new().unwrap();
      let location = StoreLocation::Persistent(dir.path().to_path_buf());
      {
         let store = LocalStore::open(location.clone(), embedder()).unwrap();
         store.recreate_collection("cards").unwrap();
         store.upsert("cards", &[doc("a", "one"), doc("b", "two")]).unwrap();
      }

      let reopened = LocalStore::open(location, embedder()).unwrap();
      assert_eq!(reopened.count("cards").unwrap(), 2);
      assert_eq!(reopened.query("cards", "one two", 10).unwrap().len(), 2);
      let hits = reopened.query("cards", "two", 1).unwrap();
      assert_eq!(hits[0].id, "b");
   }

   #[test]
   fn unusable_directory_is_unavailable() {
      let dir = TempDir::new().unwrap();
      let file = dir.path().join("not-a-dir");
      std::fs::write(&file, b"x").unwrap();

      let err = LocalStore::open(StoreLocation::Persistent(file), embedder())
         .err()
         .unwrap();
      assert!(matches!(err, Error::StoreUnavailable(_)));
   }
}
