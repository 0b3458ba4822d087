//! Model Context Protocol server exposing card retrieval to agents.

use std::path::{Path, PathBuf};

use rmcp::{
   ErrorData, ServerHandler, ServiceExt,
   handler::server::{router::tool::ToolRouter, wrapper::Parameters},
   model::{
      CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
   },
   schemars, tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};

use crate::{
   config::{self, Config},
   error::Error,
   registry::load_registry,
   render::{self, DEFAULT_INSTRUCTION_CHARS, MIN_INSTRUCTION_CHARS, Provider},
   search::{BackendKind, BackendOptions, SkillRetriever},
   types::{HitPayload, RetrievalHit},
};

pub const DEFAULT_MCP_TOP_K: i64 = 5;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RetrieveParams {
   /// Task description to route.
   pub query:    String,
   /// Number of cards to return (default 5).
   #[serde(default)]
   pub top_k:    Option<i64>,
   /// Registry path. Resolved from the environment when omitted.
   #[serde(default)]
   pub registry: Option<String>,
   /// One of auto, memory, store.
   #[serde(default)]
   pub backend:  Option<String>,
   /// Enable embedding similarity for the in-process backend.
   #[serde(default)]
   pub dense:    Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RouteParams {
   #[serde(flatten)]
   pub retrieve:          RetrieveParams,
   /// Target format: claude or codex (default claude).
   #[serde(default)]
   pub provider:          Option<String>,
   /// Instruction excerpt length per card, at least 100 (default 700).
   #[serde(default)]
   pub instruction_chars: Option<i64>,
}

#[derive(Debug, Serialize)]
struct RetrievePayload<'a> {
   query:    &'a str,
   registry: String,
   hits:     Vec<HitPayload<'a>>,
}

/// Checked form of the parameters shared by both tools.
#[derive(Debug)]
struct Request {
   query:    String,
   top_k:    usize,
   registry: Option<PathBuf>,
   backend:  BackendKind,
   dense:    bool,
}

pub fn normalize_query(query: &str) -> Result<String, String> {
   let query = query.trim();
   if query.is_empty() {
      return Err("`query` must be a non-empty string.".to_string());
   }
   Ok(query.to_string())
}

pub fn normalize_top_k(top_k: i64) -> Result<usize, String> {
   usize::try_from(top_k)
      .ok()
      .filter(|k| *k >= 1)
      .ok_or_else(|| "`top_k` must be >= 1.".to_string())
}

pub fn normalize_backend(backend: Option<&str>) -> Result<BackendKind, String> {
   match backend.map(|b| b.trim().to_ascii_lowercase()).as_deref() {
      None | Some("" | "auto") => Ok(BackendKind::Auto),
      Some("memory") => Ok(BackendKind::Memory),
      Some("store" | "chroma") => Ok(BackendKind::Store),
      Some(_) => Err("`backend` must be one of: auto, memory, store.".to_string()),
   }
}

pub fn normalize_provider(provider: Option<&str>) -> Result<Provider, String> {
   match provider {
      None => Ok(Provider::Claude),
      Some(raw) => {
         Provider::parse(raw).ok_or_else(|| "`provider` must be one of: claude, codex.".to_string())
      },
   }
}

pub fn normalize_instruction_chars(chars: Option<i64>) -> Result<usize, String> {
   let Some(chars) = chars else {
      return Ok(DEFAULT_INSTRUCTION_CHARS);
   };
   usize::try_from(chars)
      .ok()
      .filter(|c| *c >= MIN_INSTRUCTION_CHARS)
      .ok_or_else(|| format!("`instruction_chars` must be >= {MIN_INSTRUCTION_CHARS}."))
}

impl TryFrom<RetrieveParams> for Request {
   type Error = String;

   fn try_from(params: RetrieveParams) -> Result<Self, String> {
      Ok(Self {
         query:    normalize_query(&params.query)?,
         top_k:    normalize_top_k(params.top_k.unwrap_or(DEFAULT_MCP_TOP_K))?,
         registry: params
            .registry
            .filter(|r| !r.trim().is_empty())
            .map(PathBuf::from),
         backend:  normalize_backend(params.backend.as_deref())?,
         dense:    params.dense.unwrap_or(false),
      })
   }
}

fn invalid(message: impl Into<String>) -> ErrorData {
   ErrorData::invalid_params(message.into(), None)
}

fn tool_error(err: Error) -> ErrorData {
   match err {
      Error::Registry(msg) => invalid(format!("Invalid registry: {msg}")),
      other => ErrorData::internal_error(other.to_string(), None),
   }
}

/// Tool server over the configured registry and backend settings.
#[derive(Clone)]
pub struct SkillMeshServer {
   config:      Config,
   tool_router: ToolRouter<Self>,
}

impl SkillMeshServer {
   pub fn new(config: Config) -> Self {
      Self { config, tool_router: Self::tool_router() }
   }

   fn retrieve_hits(&self, request: &Request) -> Result<(PathBuf, Vec<RetrievalHit>), Error> {
      let registry = config::resolve_registry_path(request.registry.as_deref())?;
      let cards = load_registry(&registry)?;

      let mut options = BackendOptions::from(&self.config);
      options.kind = request.backend;
      options.dense = request.dense;

      let retriever = SkillRetriever::new(cards, &options)?;
      Ok((registry, retriever.retrieve(&request.query, request.top_k)))
   }

   /// Routed context block for `params`, rendered for the chosen provider.
   pub fn route(&self, params: RouteParams) -> Result<String, ErrorData> {
      let provider = normalize_provider(params.provider.as_deref()).map_err(invalid)?;
      let instruction_chars =
         normalize_instruction_chars(params.instruction_chars).map_err(invalid)?;
      let request = Request::try_from(params.retrieve).map_err(invalid)?;

      let (_, hits) = self.retrieve_hits(&request).map_err(tool_error)?;
      Ok(render::render_context(provider, &request.query, &hits, instruction_chars))
   }

   /// JSON payload `{query, registry, hits}` for `params`.
   pub fn retrieve_json(&self, params: RetrieveParams) -> Result<String, ErrorData> {
      let request = Request::try_from(params).map_err(invalid)?;
      let (registry, hits) = self.retrieve_hits(&request).map_err(tool_error)?;

      let payload = RetrievePayload {
         query:    &request.query,
         registry: display_path(&registry),
         hits:     hits.iter().map(HitPayload::from).collect(),
      };
      serde_json::to_string_pretty(&payload)
         .map_err(|e| ErrorData::internal_error(format!("failed to serialize hits: {e}"), None))
   }
}

fn display_path(path: &Path) -> String {
   path.to_string_lossy().into_owned()
}

#[tool_router]
impl SkillMeshServer {
   #[tool(
      description = "Return a routed context block for Claude/Codex built from the top-K \
                     SkillMesh cards for a task."
   )]
   fn route_with_skillmesh(
      &self,
      Parameters(params): Parameters<RouteParams>,
   ) -> Result<CallToolResult, ErrorData> {
      let block = self.route(params)?;
      Ok(CallToolResult::success(vec![Content::text(block)]))
   }

   #[tool(description = "Return the top-K SkillMesh cards for a task as structured JSON.")]
   fn retrieve_skillmesh_cards(
      &self,
      Parameters(params): Parameters<RetrieveParams>,
   ) -> Result<CallToolResult, ErrorData> {
      let json = self.retrieve_json(params)?;
      Ok(CallToolResult::success(vec![Content::text(json)]))
   }
}

#[tool_handler]
impl ServerHandler for SkillMeshServer {
   fn get_info(&self) -> ServerInfo {
      ServerInfo {
         protocol_version: ProtocolVersion::V_2024_11_05,
         capabilities:     ServerCapabilities::builder().enable_tools().build(),
         server_info:      Implementation {
            name:        "skillmesh".to_string(),
            version:     env!("CARGO_PKG_VERSION").to_string(),
            title:       Some("SkillMesh card router".to_string()),
            icons:       None,
            website_url: None,
         },
         instructions:     Some(
            "Routes a task to the most relevant skill cards. Use 'route_with_skillmesh' for a \
             ready-to-paste context block or 'retrieve_skillmesh_cards' for structured hits."
               .to_string(),
         ),
      }
   }
}

/// Wire transport for the server, picked by `SKILLMESH_MCP_TRANSPORT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
   Stdio,
}

impl Transport {
   /// Blank selects stdio. Network transports are not served.
   pub fn parse(raw: &str) -> crate::Result<Self> {
      match raw.trim().to_ascii_lowercase().as_str() {
         "" | "stdio" => Ok(Self::Stdio),
         other => Err(Error::Config(format!(
            "unsupported MCP transport '{other}' (only 'stdio' is available)"
         ))),
      }
   }
}

/// Serves the tools on the configured transport until the client disconnects.
pub async fn serve(config: Config) -> anyhow::Result<()> {
   match Transport::parse(&config.mcp_transport)? {
      Transport::Stdio => {
         tracing::info!("starting MCP server on stdio");
         let service = SkillMeshServer::new(config)
            .serve(rmcp::transport::stdio())
            .await?;
         service.waiting().await?;
      },
   }
   Ok(())
}

#[cfg(test)]
mod tests {
   use std::fs;

   use serde_json::{Value, json};
   use tempfile::TempDir;

   use super::*;
   use crate::{embed::EmbedderKind, search::sparse::SparseMode};

   fn registry(dir: &TempDir) -> String {
      let tools = json!({
         "tools": [
            {
               "id": "viz", "title": "Plotting", "domain": "data-viz",
               "instruction_file": "viz.md",
               "instruction_text": "matplotlib seaborn plotting charts",
            },
            {
               "id": "ml", "title": "Training", "domain": "ml",
               "instruction_file": "ml.md",
               "instruction_text": "pytorch cuda training loop",
            },
            {
               "id": "cv", "title": "Vision", "domain": "vision",
               "instruction_file": "cv.md",
               "instruction_text": "opencv contour detection edges",
            },
         ]
      });
      let path = dir.path().join("tools.json");
      fs::write(&path, tools.to_string()).unwrap();
      path.to_string_lossy().into_owned()
   }

   fn server() -> SkillMeshServer {
      SkillMeshServer::new(Config {
         embedder: EmbedderKind::Hashing,
         sparse: SparseMode::Bm25,
         ephemeral: true,
         ..Config::default()
      })
   }

   fn retrieve(query: &str, registry: &str) -> RetrieveParams {
      RetrieveParams {
         query:    query.to_string(),
         top_k:    None,
         registry: Some(registry.to_string()),
         backend:  Some("memory".to_string()),
         dense:    None,
      }
   }

   #[test]
   fn validation_rules() {
      assert!(normalize_query("   ").is_err());
      assert_eq!(normalize_query("  hi ").unwrap(), "hi");
      assert!(normalize_top_k(0).is_err());
      assert!(normalize_top_k(-3).is_err());
      assert_eq!(normalize_top_k(4).unwrap(), 4);
      assert_eq!(normalize_backend(Some("Chroma")).unwrap(), BackendKind::Store);
      assert_eq!(normalize_backend(None).unwrap(), BackendKind::Auto);
      assert!(normalize_backend(Some("redis")).is_err());
      assert!(normalize_provider(Some("gemini")).is_err());
      assert_eq!(normalize_instruction_chars(None).unwrap(), DEFAULT_INSTRUCTION_CHARS);
      assert!(normalize_instruction_chars(Some(99)).is_err());
      assert_eq!(normalize_instruction_chars(Some(100)).unwrap(), 100);
   }

   #[test]
   fn retrieve_returns_structured_hits() {
      let dir = TempDir::new().unwrap();
      let registry = registry(&dir);

      let json = server().retrieve_json(retrieve(" seaborn charts ", &registry)).unwrap();
      let payload: Value = serde_json::from_str(&json).unwrap();
      assert_eq!(payload["query"], json!("seaborn charts"));
      assert!(payload["registry"].as_str().unwrap().ends_with("tools.json"));
      assert_eq!(payload["hits"].as_array().unwrap().len(), 3);
      assert_eq!(payload["hits"][0]["id"], json!("viz"));
      assert!(payload["hits"][0]["score"].as_f64().unwrap() > 0.0);
      assert_eq!(payload["hits"][1]["score"], json!(0.0));
      assert_eq!(payload["hits"][0]["dense_score"], Value::Null);
   }

   #[test]
   fn route_renders_requested_provider() {
      let dir = TempDir::new().unwrap();
      let registry = registry(&dir);

      let block = server()
         .route(RouteParams {
            retrieve:          retrieve("cuda training", &registry),
            provider:          Some("codex".to_string()),
            instruction_chars: Some(120),
         })
         .unwrap();
      assert!(block.starts_with("# Retrieved SkillMesh Cards\nQuery: cuda training\n"));
      assert!(block.contains("## 1. Training (`ml`)"));
      assert!(block.contains("## 3. "));
   }

   #[test]
   fn transport_defaults_to_stdio_and_rejects_others() {
      assert_eq!(Transport::parse("").unwrap(), Transport::Stdio);
      assert_eq!(Transport::parse(" STDIO ").unwrap(), Transport::Stdio);
      let err = Transport::parse("sse").unwrap_err();
      assert!(err.to_string().contains("unsupported MCP transport 'sse'"));
      assert_eq!(Config::default().mcp_transport, "stdio");
   }

   #[test]
   fn invalid_params_are_rejected_before_retrieval() {
      let dir = TempDir::new().unwrap();
      let registry = registry(&dir);

      let mut params = retrieve("", &registry);
      assert!(server().retrieve_json(params).is_err());

      params = retrieve("charts", &registry);
      params.top_k = Some(0);
      assert!(server().retrieve_json(params).is_err());

      let route = RouteParams {
         retrieve:          retrieve("charts", &registry),
         provider:          None,
         instruction_chars: Some(50),
      };
      assert!(server().route(route).is_err());
   }

   #[test]
   fn missing_registry_is_reported() {
      let dir = TempDir::new().unwrap();
      let missing = dir.path().join("nope.json");
      let err = server()
         .retrieve_json(retrieve("charts", &missing.to_string_lossy()))
         .unwrap_err();
      assert!(err.message.contains("Registry not found"));
   }
}
