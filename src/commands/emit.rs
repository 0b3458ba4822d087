use anyhow::Result;
use skillmesh::{Provider, config::Config, render_context};

use crate::EngineArgs;

pub fn execute(provider: Provider, args: &EngineArgs, config: &Config) -> Result<()> {
   let hits = super::retrieve_hits(args.registry.as_deref(), &args.query, config)?;
   print!("{}", render_context(provider, &args.query, &hits, config.instruction_chars));
   Ok(())
}
