use std::path::PathBuf;

use anyhow::Result;
use console::style;
use skillmesh::{compile_registry, config};

pub fn execute(source: PathBuf, dest: Option<PathBuf>) -> Result<()> {
   let dest = dest.unwrap_or_else(config::bundled_registry_path);
   let count = compile_registry(&source, &dest)?;
   println!(
      "{} Compiled {} tools -> {}",
      style("✓").green(),
      count,
      style(dest.display()).dim()
   );
   Ok(())
}
