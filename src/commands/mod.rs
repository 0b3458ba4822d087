pub mod compile;
pub mod emit;
pub mod index;
pub mod mcp;
pub mod retrieve;

use std::path::Path;

use skillmesh::{
   Card, RetrievalHit, SkillRetriever, config, load_registry, search::BackendOptions,
};

/// Resolves and loads the registry. Registry errors are returned unwrapped so
/// `main` can report them with their dedicated exit status.
pub fn load_cards(registry: Option<&Path>) -> skillmesh::Result<Vec<Card>> {
   let path = config::resolve_registry_path(registry)?;
   load_registry(path)
}

pub fn retrieve_hits(
   registry: Option<&Path>,
   query: &str,
   config: &config::Config,
) -> anyhow::Result<Vec<RetrievalHit>> {
   let cards = load_cards(registry)?;
   let retriever = SkillRetriever::new(cards, &BackendOptions::from(config))?;
   tracing::debug!(backend = retriever.backend_kind().as_str(), "retrieving");
   Ok(retriever.retrieve(query, config.top_k))
}
