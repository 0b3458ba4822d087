use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
   #[error("{0}")]
   Registry(String),

   #[error("invalid configuration: {0}")]
   Config(String),

   #[error("embedding error: {0}")]
   Embedding(String),

   #[error("vector store error: {0}")]
   Store(String),

   /// The vector store could not be constructed. Callers that asked for the
   /// store implicitly fall back to the in-process backend on this variant.
   #[error("vector store unavailable: {0}")]
   StoreUnavailable(String),

   #[error(transparent)]
   Io(#[from] std::io::Error),

   #[error(transparent)]
   Json(#[from] serde_json::Error),

   #[error(transparent)]
   Yaml(#[from] serde_yaml::Error),

   #[error(transparent)]
   Postcard(#[from] postcard::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
