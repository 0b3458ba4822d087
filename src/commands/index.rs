use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use skillmesh::{
   Backend,
   config::Config,
   embed::create_embedder,
   search::{BackendOptions, VectorBackend},
   store::LocalStore,
};

pub fn execute(registry: Option<PathBuf>, config: &Config) -> Result<()> {
   let cards = super::load_cards(registry.as_deref())?;
   let count = cards.len();
   let options = BackendOptions::from(config);

   let spinner = ProgressBar::new_spinner();
   spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
   spinner.enable_steady_tick(Duration::from_millis(100));
   spinner.set_message(format!("Embedding {count} experts..."));

   let store = LocalStore::open(options.store.location.clone(), create_embedder(options.embedder))
      .context("failed to open vector store")?;
   let mut backend =
      VectorBackend::new(Arc::new(store), options.store.collection.clone(), options.sparse);
   let indexed = backend.index(cards);
   spinner.finish_and_clear();
   indexed.context("failed to index registry")?;

   println!("Indexed {count} experts into collection '{}'", backend.collection());
   Ok(())
}
