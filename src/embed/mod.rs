//! Text embedding providers for the dense scorer and the vector store.
//!
//! Every provider returns unit-length vectors so that a dot product is the
//! cosine similarity.

pub mod candle;
pub mod hashed;

use std::sync::Arc;

pub use candle::CandleEmbedder;
pub use hashed::HashingEmbedder;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Text embedding trait used by dense scoring and the vector store.
pub trait Embedder: Send + Sync {
   /// Embeds a batch of documents, one unit vector per text.
   fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
   /// Embeds a single query.
   fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
   /// Loads whatever the embedder needs up front. Failing here means the
   /// embedder is unusable.
   fn warm_up(&self) -> Result<()>;
}

impl<T: Embedder + ?Sized> Embedder for Arc<T> {
   fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
      (**self).embed_documents(texts)
   }

   fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
      (**self).embed_query(text)
   }

   fn warm_up(&self) -> Result<()> {
      (**self).warm_up()
   }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
   /// BGE small (English) through candle.
   #[default]
   Bge,
   /// Feature-hashing embedder; offline and deterministic.
   Hashing,
}

pub fn create_embedder(kind: EmbedderKind) -> Arc<dyn Embedder> {
   match kind {
      EmbedderKind::Bge => Arc::new(CandleEmbedder::new()),
      EmbedderKind::Hashing => Arc::new(HashingEmbedder::default()),
   }
}

pub(crate) fn normalize_l2(embedding: &mut [f32]) {
   let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
   if norm > f32::EPSILON {
      for x in embedding.iter_mut() {
         *x /= norm;
      }
   }
}
