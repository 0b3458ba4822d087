pub mod local;

use std::sync::Arc;

pub use local::LocalStore;

use crate::{
   error::Result,
   types::{StoreCandidate, StoreDocument},
};

/// External nearest-neighbour store. Implementations own the embedding of
/// document and query text.
pub trait VectorStore: Send + Sync {
   /// Drops the collection if present and creates it empty.
   fn recreate_collection(&self, collection: &str) -> Result<()>;

   /// Inserts or replaces documents by id.
   fn upsert(&self, collection: &str, documents: &[StoreDocument]) -> Result<()>;

   /// Returns up to `n` candidates, nearest first.
   fn query(&self, collection: &str, text: &str, n: usize) -> Result<Vec<StoreCandidate>>;

   fn count(&self, collection: &str) -> Result<usize>;
}

impl<T: VectorStore + ?Sized> VectorStore for Arc<T> {
   fn recreate_collection(&self, collection: &str) -> Result<()> {
      (**self).recreate_collection(collection)
   }

   fn upsert(&self, collection: &str, documents: &[StoreDocument]) -> Result<()> {
      (**self).upsert(collection, documents)
   }

   fn query(&self, collection: &str, text: &str, n: usize) -> Result<Vec<StoreCandidate>> {
      (**self).query(collection, text, n)
   }

   fn count(&self, collection: &str) -> Result<usize> {
      (**self).count(collection)
   }
}
