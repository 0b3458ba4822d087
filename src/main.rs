use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use skillmesh::{
   BackendKind, Error, Provider, config::Config, embed::EmbedderKind, search::sparse::SparseMode,
};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "skillmesh")]
#[command(about = "Top-k skill card retrieval for Codex/Claude style runtimes", long_about = None)]
#[command(version)]
struct Cli {
   #[command(subcommand)]
   command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Index the registry into the persistent vector store")]
   Index {
      #[arg(long, help = "Path to the registry (JSON or YAML)")]
      registry: Option<PathBuf>,

      #[arg(long, help = "Vector store collection name")]
      collection: Option<String>,

      #[arg(long, help = "Vector store persistence directory")]
      data_dir: Option<PathBuf>,

      #[arg(long, help = "Keep the store in memory only")]
      ephemeral: bool,

      #[arg(long, value_enum, help = "Embedding provider")]
      embedder: Option<EmbedderKind>,
   },

   #[command(about = "Retrieve the top-k cards for a query as JSON")]
   Retrieve {
      #[command(flatten)]
      engine: EngineArgs,
   },

   #[command(about = "Emit a provider-specific context block")]
   Emit {
      #[arg(long, value_enum, help = "Target provider")]
      provider: Provider,

      #[command(flatten)]
      engine: EngineArgs,

      #[arg(long, help = "Max instruction characters per card")]
      instruction_chars: Option<usize>,
   },

   #[command(about = "Inline instruction files into a self-contained registry")]
   Compile {
      #[arg(long, help = "Source registry")]
      source: PathBuf,

      #[arg(long, help = "Destination (defaults to the bundled registry location)")]
      dest: Option<PathBuf>,
   },

   #[command(about = "Serve the retrieval tools over MCP on stdio")]
   Mcp,
}

/// Options shared by the querying commands.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
   #[arg(long, help = "Path to the registry (JSON or YAML)")]
   pub registry: Option<PathBuf>,

   #[arg(long, short, help = "User query")]
   pub query: String,

   #[arg(long, short = 'k', value_parser = parse_top_k, help = "Number of hits")]
   pub top_k: Option<usize>,

   #[arg(long, help = "Enable dense scoring")]
   pub dense: bool,

   #[arg(long, value_enum, help = "Retrieval backend")]
   pub backend: Option<BackendKind>,

   #[arg(long, value_enum, help = "Embedding provider")]
   pub embedder: Option<EmbedderKind>,

   #[arg(long, value_enum, help = "Lexical scorer")]
   pub sparse: Option<SparseMode>,
}

impl EngineArgs {
   /// Flags override the loaded configuration.
   pub fn apply(&self, config: &mut Config) {
      if self.dense {
         config.dense = true;
      }
      if let Some(backend) = self.backend {
         config.backend = backend;
      }
      if let Some(embedder) = self.embedder {
         config.embedder = embedder;
      }
      if let Some(sparse) = self.sparse {
         config.sparse = sparse;
      }
      if let Some(top_k) = self.top_k {
         config.top_k = top_k;
      }
   }
}

fn parse_top_k(raw: &str) -> Result<usize, String> {
   match raw.parse::<i64>() {
      Ok(k) if k >= 1 => usize::try_from(k).map_err(|e| e.to_string()),
      Ok(_) => Err("top-k must be >= 1".to_string()),
      Err(e) => Err(e.to_string()),
   }
}

fn init_tracing() {
   let filter = EnvFilter::try_from_env("SKILLMESH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
   tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .with_target(false)
      .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
   let mut config = Config::load()?;

   match cli.command {
      Cmd::Index { registry, collection, data_dir, ephemeral, embedder } => {
         if let Some(collection) = collection {
            config.collection = collection;
         }
         if data_dir.is_some() {
            config.data_dir = data_dir;
         }
         if ephemeral {
            config.ephemeral = true;
         }
         if let Some(embedder) = embedder {
            config.embedder = embedder;
         }
         commands::index::execute(registry, &config)
      },
      Cmd::Retrieve { engine } => {
         engine.apply(&mut config);
         commands::retrieve::execute(&engine, &config)
      },
      Cmd::Emit { provider, engine, instruction_chars } => {
         engine.apply(&mut config);
         if let Some(chars) = instruction_chars {
            config.instruction_chars = chars;
         }
         commands::emit::execute(provider, &engine, &config)
      },
      Cmd::Compile { source, dest } => commands::compile::execute(source, dest),
      Cmd::Mcp => commands::mcp::execute(config).await,
   }
}

#[tokio::main]
async fn main() -> ExitCode {
   init_tracing();
   let cli = Cli::parse();

   match run(cli).await {
      Ok(()) => ExitCode::SUCCESS,
      Err(err) => {
         if let Some(Error::Registry(msg)) = err.chain().find_map(|e| e.downcast_ref::<Error>()) {
            eprintln!("RegistryError: {msg}");
            return ExitCode::from(2);
         }
         eprintln!("Error: {err:#}");
         ExitCode::FAILURE
      },
   }
}
