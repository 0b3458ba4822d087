use anyhow::Result;
use serde::Serialize;
use skillmesh::{HitPayload, config::Config};

use crate::EngineArgs;

#[derive(Serialize)]
struct JsonOutput<'a> {
   query: &'a str,
   hits:  Vec<HitPayload<'a>>,
}

pub fn execute(args: &EngineArgs, config: &Config) -> Result<()> {
   let hits = super::retrieve_hits(args.registry.as_deref(), &args.query, config)?;
   let output = JsonOutput {
      query: &args.query,
      hits:  hits.iter().map(HitPayload::from).collect(),
   };
   println!("{}", serde_json::to_string_pretty(&output)?);
   Ok(())
}
