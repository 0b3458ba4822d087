pub mod dense;
pub mod document;
pub mod memory;
pub mod ranking;
pub mod sparse;
pub mod vector;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use memory::MemoryBackend;
pub use vector::VectorBackend;

use crate::{
   config::{Config, STORE_THRESHOLD},
   embed::{EmbedderKind, create_embedder},
   error::Result,
   search::sparse::SparseMode,
   store::local::StoreLocation,
   types::{Card, RetrievalHit},
};

/// A ranking backend over one indexed corpus of cards.
///
/// `query` never fails: a backend that loses its dense signal answers from
/// sparse scores alone.
pub trait Backend: Send + Sync {
   /// Replaces the indexed corpus. An empty list clears it.
   fn index(&mut self, cards: Vec<Card>) -> Result<()>;

   /// Best `top_k` hits (clamped to `[1, min(20, len)]`), highest score first.
   fn query(&self, text: &str, top_k: usize) -> Vec<RetrievalHit>;

   fn kind(&self) -> BackendKind;

   fn len(&self) -> usize;

   fn is_empty(&self) -> bool {
      self.len() == 0
   }
}

#[derive(
   Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
   /// In-process below the size threshold, vector store above it.
   #[default]
   Auto,
   Memory,
   #[serde(alias = "chroma")]
   #[value(alias = "chroma")]
   Store,
}

impl BackendKind {
   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Auto => "auto",
         Self::Memory => "memory",
         Self::Store => "store",
      }
   }
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
   pub collection: String,
   pub location:   StoreLocation,
}

/// Everything needed to pick and construct a backend.
#[derive(Debug, Clone)]
pub struct BackendOptions {
   pub kind:     BackendKind,
   /// Enables the dense signal of the in-process backend. The vector-store
   /// backend is always hybrid.
   pub dense:    bool,
   pub embedder: EmbedderKind,
   pub sparse:   SparseMode,
   pub store:    StoreOptions,
}

impl From<&Config> for BackendOptions {
   fn from(config: &Config) -> Self {
      let location = if config.ephemeral {
         StoreLocation::Ephemeral
      } else {
         StoreLocation::Persistent(config.store_dir())
      };
      Self {
         kind:     config.backend,
         dense:    config.dense,
         embedder: config.embedder,
         sparse:   config.sparse,
         store:    StoreOptions { collection: config.collection.clone(), location },
      }
   }
}

impl Default for BackendOptions {
   fn default() -> Self {
      Self::from(&Config::default())
   }
}

fn memory_backend(options: &BackendOptions) -> MemoryBackend {
   let backend = MemoryBackend::new(options.sparse);
   if options.dense {
      backend.with_dense(create_embedder(options.embedder))
   } else {
      backend
   }
}

/// Chooses the backend for a corpus of `corpus_size` cards.
///
/// `memory` always succeeds. `store` propagates construction errors. `auto`
/// stays in-process for small corpora and falls back to it whenever the
/// store cannot be constructed.
pub fn open_backend(options: &BackendOptions, corpus_size: usize) -> Result<Box<dyn Backend>> {
   match options.kind {
      BackendKind::Memory => Ok(Box::new(memory_backend(options))),
      BackendKind::Store => Ok(Box::new(VectorBackend::open(options)?)),
      BackendKind::Auto if corpus_size < STORE_THRESHOLD => Ok(Box::new(memory_backend(options))),
      BackendKind::Auto => match VectorBackend::open(options) {
         Ok(backend) => Ok(Box::new(backend)),
         Err(e) => {
            tracing::warn!("vector store unavailable, using in-process backend: {e}");
            Ok(Box::new(memory_backend(options)))
         },
      },
   }
}

/// Facade that owns a selected backend and its indexed corpus.
pub struct SkillRetriever {
   backend: Box<dyn Backend>,
}

impl SkillRetriever {
   pub fn new(cards: Vec<Card>, options: &BackendOptions) -> Result<Self> {
      let mut backend = open_backend(options, cards.len())?;
      backend.index(cards)?;
      tracing::info!(
         backend = backend.kind().as_str(),
         cards = backend.len(),
         "retriever ready"
      );
      Ok(Self { backend })
   }

   pub fn retrieve(&self, query: &str, top_k: usize) -> Vec<RetrievalHit> {
      self.backend.query(query, top_k)
   }

   pub fn backend_kind(&self) -> BackendKind {
      self.backend.kind()
   }

   pub fn len(&self) -> usize {
      self.backend.len()
   }

   pub fn is_empty(&self) -> bool {
      self.backend.is_empty()
   }
}

/// Turns per-document score vectors into the top `k` hits by `hybrid`.
pub(crate) fn collect_hits(
   cards: &[Arc<Card>],
   hybrid: &[f32],
   sparse: &[f32],
   dense: Option<&[f32]>,
   k: usize,
) -> Vec<RetrievalHit> {
   ranking::rank_order(hybrid)
      .into_iter()
      .take(k)
      .map(|i| RetrievalHit {
         card:         Arc::clone(&cards[i]),
         score:        hybrid[i],
         sparse_score: sparse[i],
         dense_score:  dense.map(|d| d[i]),
      })
      .collect()
}
