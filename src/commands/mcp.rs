use anyhow::{Context, Result};
use skillmesh::{config::Config, mcp};

pub async fn execute(config: Config) -> Result<()> {
   mcp::serve(config).await.context("MCP server failed")
}
