use std::path::{Path, PathBuf};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
   embed::EmbedderKind,
   error::{Error, Result},
   render::DEFAULT_INSTRUCTION_CHARS,
   search::{BackendKind, sparse::SparseMode},
};

pub const DENSE_MODEL: &str = "BAAI/bge-small-en-v1.5";
pub const DENSE_DIM: usize = 384;

pub const QUERY_PREFIX: &str = "";

pub const DEFAULT_COLLECTION: &str = "skillmesh_experts";
pub const DEFAULT_TOP_K: usize = 3;

/// Upper bound on hits returned by a single query.
pub const MAX_TOP_K: usize = 20;
/// Corpora below this many cards never touch the vector store in `auto` mode.
pub const STORE_THRESHOLD: usize = 100;
/// Only this many characters of a card's instruction text are indexed.
pub const INSTRUCTION_PREFIX_CHARS: usize = 2000;

pub const RRF_K: f32 = 60.0;
pub const DENSE_EPSILON: f32 = 1e-9;

pub const STORE_BATCH_SIZE: usize = 500;
pub const STORE_CANDIDATE_FLOOR: usize = 20;
pub const STORE_TAG_LIMIT: usize = 20;

pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

const ENV_PREFIX: &str = "SKILLMESH_";
const REGISTRY_ENV: &str = "SKILLMESH_REGISTRY";
const DATA_DIR_ENV: &str = "SKILLMESH_DATA_DIR";
const CONFIG_ENV: &str = "SKILLMESH_CONFIG";

pub fn data_dir() -> PathBuf {
   BaseDirs::new().map_or_else(
      || PathBuf::from(".skillmesh"),
      |dirs| dirs.home_dir().join(".skillmesh"),
   )
}

pub fn model_dir() -> PathBuf {
   data_dir().join("models")
}

pub fn store_dir() -> PathBuf {
   std::env::var(DATA_DIR_ENV)
      .ok()
      .filter(|s| !s.trim().is_empty())
      .map_or_else(|| data_dir().join("store"), |s| expand_home(s.trim()))
}

pub fn bundled_registry_path() -> PathBuf {
   data_dir().join("registry").join("tools.compiled.json")
}

pub fn config_path() -> PathBuf {
   std::env::var(CONFIG_ENV)
      .ok()
      .filter(|s| !s.trim().is_empty())
      .map_or_else(|| data_dir().join("config.toml"), |s| expand_home(s.trim()))
}

pub fn embed_batch_size() -> usize {
   std::env::var("SKILLMESH_EMBED_BATCH_SIZE")
      .ok()
      .and_then(|s| s.parse().ok())
      .unwrap_or(DEFAULT_EMBED_BATCH_SIZE)
      .max(1)
}

pub fn debug_models() -> bool {
   std::env::var("SKILLMESH_DEBUG_MODELS")
      .ok()
      .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Runtime settings shared by the CLI and the MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   pub backend:           BackendKind,
   pub dense:             bool,
   pub embedder:          EmbedderKind,
   pub sparse:            SparseMode,
   pub collection:        String,
   pub data_dir:          Option<PathBuf>,
   pub ephemeral:         bool,
   pub top_k:             usize,
   pub instruction_chars: usize,
   /// Read from `SKILLMESH_MCP_TRANSPORT`; only `stdio` is served.
   pub mcp_transport:     String,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         backend:           BackendKind::Auto,
         dense:             false,
         embedder:          EmbedderKind::Bge,
         sparse:            SparseMode::Bm25,
         collection:        DEFAULT_COLLECTION.to_string(),
         data_dir:          None,
         ephemeral:         false,
         top_k:             DEFAULT_TOP_K,
         instruction_chars: DEFAULT_INSTRUCTION_CHARS,
         mcp_transport:     "stdio".to_string(),
      }
   }
}

impl Config {
   /// Loads defaults, then the config file, then `SKILLMESH_*` variables.
   pub fn load() -> Result<Self> {
      Self::figment(&config_path())
         .extract()
         .map_err(|e| Error::Config(e.to_string()))
   }

   fn figment(file: &Path) -> Figment {
      Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(file))
         .merge(Env::prefixed(ENV_PREFIX))
   }

   /// `data_dir` from the file or `SKILLMESH_DATA_DIR`, with `~/` expanded,
   /// else the default store directory.
   pub fn store_dir(&self) -> PathBuf {
      match &self.data_dir {
         Some(dir) => dir
            .to_str()
            .map_or_else(|| dir.clone(), |raw| expand_home(raw.trim())),
         None => store_dir(),
      }
   }
}

/// Resolves the registry to load: explicit argument, then `SKILLMESH_REGISTRY`,
/// then a `registry/tools.json` discovered from the working directory upwards,
/// then the compiled registry under the data directory.
pub fn resolve_registry_path(explicit: Option<&Path>) -> Result<PathBuf> {
   let cwd = std::env::current_dir()?;
   resolve_registry_from(
      explicit,
      std::env::var(REGISTRY_ENV).ok().as_deref(),
      &cwd,
      &bundled_registry_path(),
   )
}

fn resolve_registry_from(
   explicit: Option<&Path>,
   env_value: Option<&str>,
   start: &Path,
   bundled: &Path,
) -> Result<PathBuf> {
   if let Some(path) = explicit.filter(|p| !p.as_os_str().is_empty()) {
      let candidate = absolutize(&expand_home(&path.to_string_lossy()), start);
      if !candidate.exists() {
         return Err(Error::Registry(format!("Registry not found: {}", candidate.display())));
      }
      return Ok(candidate);
   }

   if let Some(value) = env_value.map(str::trim).filter(|v| !v.is_empty()) {
      let candidate = absolutize(&expand_home(value), start);
      if !candidate.exists() {
         return Err(Error::Registry(format!(
            "{REGISTRY_ENV} points to a missing file: {}",
            candidate.display()
         )));
      }
      return Ok(candidate);
   }

   if let Some(found) = discover_registry(start) {
      return Ok(found);
   }

   if bundled.exists() {
      return Ok(bundled.to_path_buf());
   }

   Err(Error::Registry(format!(
      "Missing registry path. Provide --registry, set {REGISTRY_ENV}, or run 'skillmesh \
       compile' to install a bundled registry."
   )))
}

fn discover_registry(start: &Path) -> Option<PathBuf> {
   const MARKERS: [&str; 2] = ["registry/tools.json", "examples/registry/tools.json"];

   start.ancestors().find_map(|dir| {
      MARKERS
         .iter()
         .map(|marker| dir.join(marker))
         .find(|candidate| candidate.is_file())
   })
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
   if path.is_absolute() {
      path.to_path_buf()
   } else {
      base.join(path)
   }
}

pub fn expand_home(raw: &str) -> PathBuf {
   if let Some(rest) = raw.strip_prefix("~/")
      && let Some(dirs) = BaseDirs::new()
   {
      return dirs.home_dir().join(rest);
   }
   PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
   use tempfile::TempDir;

   use super::*;

   fn touch(path: &Path) {
      std::fs::create_dir_all(path.parent().unwrap()).unwrap();
      std::fs::write(path, "[]").unwrap();
   }

   #[test]
   fn explicit_path_wins() {
      let dir = TempDir::new().unwrap();
      let explicit = dir.path().join("mine.json");
      let env = dir.path().join("env.json");
      touch(&explicit);
      touch(&env);

      let resolved = resolve_registry_from(
         Some(&explicit),
         Some(env.to_str().unwrap()),
         dir.path(),
         &dir.path().join("bundled.json"),
      )
      .unwrap();
      assert_eq!(resolved, explicit);
   }

   #[test]
   fn missing_explicit_path_is_an_error() {
      let dir = TempDir::new().unwrap();
      let err = resolve_registry_from(
         Some(Path::new("nope.json")),
         None,
         dir.path(),
         &dir.path().join("bundled.json"),
      )
      .unwrap_err();
      assert!(err.to_string().contains("Registry not found"));
   }

   #[test]
   fn env_var_beats_discovery() {
      let dir = TempDir::new().unwrap();
      let env = dir.path().join("env.json");
      touch(&env);
      touch(&dir.path().join("registry/tools.json"));

      let resolved =
         resolve_registry_from(None, Some(env.to_str().unwrap()), dir.path(), Path::new("/x"))
            .unwrap();
      assert_eq!(resolved, env);
   }

   #[test]
   fn env_var_pointing_nowhere_is_an_error() {
      let dir = TempDir::new().unwrap();
      let err = resolve_registry_from(None, Some("missing.json"), dir.path(), Path::new("/x"))
         .unwrap_err();
      assert!(err.to_string().contains(REGISTRY_ENV));
   }

   #[test]
   fn discovers_registry_in_ancestor() {
      let dir = TempDir::new().unwrap();
      let registry = dir.path().join("examples/registry/tools.json");
      touch(&registry);
      let nested = dir.path().join("a/b");
      std::fs::create_dir_all(&nested).unwrap();

      let resolved = resolve_registry_from(None, None, &nested, Path::new("/x")).unwrap();
      assert_eq!(resolved, registry);
   }

   #[test]
   fn falls_back_to_bundled_registry() {
      let dir = TempDir::new().unwrap();
      let bundled = dir.path().join("bundled/tools.compiled.json");
      touch(&bundled);
      let work = dir.path().join("work");
      std::fs::create_dir_all(&work).unwrap();

      let resolved = resolve_registry_from(None, Some("  "), &work, &bundled).unwrap();
      assert_eq!(resolved, bundled);
   }

   #[test]
   fn nothing_found_explains_how_to_fix() {
      let dir = TempDir::new().unwrap();
      let err =
         resolve_registry_from(None, None, dir.path(), &dir.path().join("none.json")).unwrap_err();
      assert!(err.to_string().contains("--registry"));
   }

   #[test]
   fn config_file_and_env_layers_apply() {
      let dir = TempDir::new().unwrap();
      let file = dir.path().join("config.toml");
      std::fs::write(
         &file,
         "backend = \"memory\"\ntop_k = 7\ncollection = \"custom\"\nmcp_transport = \"sse\"\n",
      )
      .unwrap();

      let config: Config = Config::figment(&file).extract().unwrap();
      assert_eq!(config.backend, BackendKind::Memory);
      assert_eq!(config.top_k, 7);
      assert_eq!(config.collection, "custom");
      assert_eq!(config.mcp_transport, "sse");
      assert!(!config.dense);
   }

   #[test]
   fn missing_config_file_yields_defaults() {
      let dir = TempDir::new().unwrap();
      let config: Config = Config::figment(&dir.path().join("absent.toml"))
         .extract()
         .unwrap();
      assert_eq!(config.collection, DEFAULT_COLLECTION);
      assert_eq!(config.instruction_chars, DEFAULT_INSTRUCTION_CHARS);
   }

   #[test]
   fn layered_data_dir_expands_home() {
      let dir = TempDir::new().unwrap();
      let file = dir.path().join("config.toml");
      std::fs::write(&file, "data_dir = \"~/skillmesh-store\"\n").unwrap();

      let config: Config = Config::figment(&file).extract().unwrap();
      if let Some(dirs) = BaseDirs::new() {
         assert_eq!(config.store_dir(), dirs.home_dir().join("skillmesh-store"));
      }

      let absolute = Config { data_dir: Some(dir.path().to_path_buf()), ..Config::default() };
      assert_eq!(absolute.store_dir(), dir.path());
   }
}
