//! Hybrid retrieval of skill cards: BM25 lexical scoring, optional embedding
//! similarity, and reciprocal rank fusion over an in-process or vector-store
//! backend.

pub mod config;
pub mod embed;
pub mod error;
pub mod mcp;
pub mod registry;
pub mod render;
pub mod search;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use registry::{compile_registry, load_registry};
pub use render::{Provider, render_context};
pub use search::{Backend, BackendKind, BackendOptions, SkillRetriever, open_backend};
pub use types::{Card, HitPayload, RetrievalHit};
