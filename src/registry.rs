//! Card registry loading and compilation.
//!
//! A registry is JSON or YAML: either a bare list of entries or an object
//! holding a `tools` (or legacy `roles`) list. Instruction text lives in
//! separate files referenced by `instruction_file`, unless the registry was
//! compiled, in which case it is inlined as `instruction_text`.
//!
//! A `schema.json` next to the registry file is applied as a JSON Schema
//! before any entry is parsed.

use std::{
   collections::{BTreeMap, HashSet},
   fs,
   path::{Path, PathBuf},
};

use serde_json::{Map, Value};

use crate::{
   config::expand_home,
   error::{Error, Result},
   types::Card,
};

const REQUIRED: [&str; 4] = ["id", "title", "domain", "instruction_file"];

const SCHEMA_FILE: &str = "schema.json";

fn registry_err(msg: impl Into<String>) -> Error {
   Error::Registry(msg.into())
}

/// Loads and validates every card in the registry at `path`.
pub fn load_registry(path: impl AsRef<Path>) -> Result<Vec<Card>> {
   let path = absolute(path.as_ref());
   if !path.exists() {
      return Err(registry_err(format!("Registry not found: {}", path.display())));
   }

   let raw = read_structured(&path)?;
   let root = path.parent().unwrap_or_else(|| Path::new("."));
   let schema = root.join(SCHEMA_FILE);
   if schema.is_file() {
      validate_schema(&raw, &schema)?;
   }
   let entries = normalize_entries(&raw)?;

   let mut seen = HashSet::new();
   let mut cards = Vec::with_capacity(entries.len());
   for (idx, row) in entries.into_iter().enumerate() {
      let card = parse_card(row, idx, root)?;
      if !seen.insert(card.id.clone()) {
         return Err(registry_err(format!("Duplicate card id: '{}'", card.id)));
      }
      cards.push(card);
   }

   tracing::debug!(cards = cards.len(), path = %path.display(), "loaded registry");
   Ok(cards)
}

/// Writes a self-contained copy of the registry at `source` to `dest`, with
/// each entry's instruction file inlined as `instruction_text`. Returns the
/// number of entries.
pub fn compile_registry(source: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<usize> {
   let source = absolute(source.as_ref());
   let dest = dest.as_ref();
   if !source.exists() {
      return Err(registry_err(format!("Source registry not found: {}", source.display())));
   }

   let mut raw = read_structured(&source)?;
   let root = source.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();

   let entries = match &mut raw {
      Value::Array(entries) => entries,
      Value::Object(obj) => match obj.get_mut("tools") {
         Some(Value::Array(entries)) => entries,
         _ => match obj.get_mut("roles") {
            Some(Value::Array(entries)) => entries,
            _ => return Err(shape_error()),
         },
      },
      _ => return Err(shape_error()),
   };

   for entry in entries.iter_mut() {
      let Value::Object(entry) = entry else {
         continue;
      };
      let Some(file) = entry.get("instruction_file").and_then(scalar).filter(|f| !f.is_empty())
      else {
         continue;
      };
      let instruction_path = root.join(&file);
      let text = match fs::read_to_string(&instruction_path) {
         Ok(text) => text.trim().to_string(),
         Err(_) => {
            tracing::warn!(
               id = %entry.get("id").and_then(scalar).unwrap_or_default(),
               path = %instruction_path.display(),
               "instruction file missing, inlining empty text"
            );
            String::new()
         },
      };
      entry.insert("instruction_text".to_string(), Value::String(text));
   }
   let count = entries.len();

   if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent)?;
   }
   let mut out = serde_json::to_string_pretty(&raw)?;
   out.push('\n');
   fs::write(dest, out)?;

   tracing::info!(count, dest = %dest.display(), "compiled registry");
   Ok(count)
}

fn absolute(path: &Path) -> PathBuf {
   let expanded = path
      .to_str()
      .map_or_else(|| path.to_path_buf(), expand_home);
   expanded.canonicalize().unwrap_or(expanded)
}

fn read_structured(path: &Path) -> Result<Value> {
   let ext = path
      .extension()
      .and_then(|e| e.to_str())
      .map(str::to_ascii_lowercase)
      .unwrap_or_default();
   let text = fs::read_to_string(path)?;

   match ext.as_str() {
      "yaml" | "yml" => serde_yaml::from_str(&text)
         .map_err(|e| registry_err(format!("Failed to parse {}: {e}", path.display()))),
      "json" => serde_json::from_str(&text)
         .map_err(|e| registry_err(format!("Failed to parse {}: {e}", path.display()))),
      other => Err(registry_err(format!("Unsupported registry extension: .{other}"))),
   }
}

/// Checks `raw` against the JSON Schema at `schema_path` and reports the
/// first violation in document order.
fn validate_schema(raw: &Value, schema_path: &Path) -> Result<()> {
   let schema: Value = fs::read_to_string(schema_path)
      .ok()
      .and_then(|text| serde_json::from_str(&text).ok())
      .ok_or_else(|| {
         registry_err(format!("Failed to parse schema JSON: {}", schema_path.display()))
      })?;
   let validator = jsonschema::validator_for(&schema).map_err(|e| {
      registry_err(format!("Invalid schema {}: {e}", schema_path.display()))
   })?;

   let first = validator
      .iter_errors(raw)
      .map(|err| (pointer_segments(&err.instance_path.to_string()), err.to_string()))
      .min_by(|a, b| a.0.cmp(&b.0));

   match first {
      None => Ok(()),
      Some((segments, message)) => {
         let at = if segments.is_empty() {
            "<root>".to_string()
         } else {
            segments.iter().map(ToString::to_string).collect::<Vec<_>>().join(".")
         };
         Err(registry_err(format!("Schema validation failed at {at}: {message}")))
      },
   }
}

/// JSON pointer segment; array indices order numerically.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
   Index(usize),
   Key(String),
}

impl std::fmt::Display for Segment {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      match self {
         Self::Index(i) => write!(f, "{i}"),
         Self::Key(k) => f.write_str(k),
      }
   }
}

fn pointer_segments(pointer: &str) -> Vec<Segment> {
   pointer
      .split('/')
      .skip(1)
      .map(|raw| {
         let key = raw.replace("~1", "/").replace("~0", "~");
         key.parse().map_or(Segment::Key(key), Segment::Index)
      })
      .collect()
}

fn shape_error() -> Error {
   registry_err("Registry must be a list or an object with 'tools'/'roles'.")
}

fn normalize_entries(raw: &Value) -> Result<Vec<&Map<String, Value>>> {
   let entries = match raw {
      Value::Array(entries) => entries,
      Value::Object(obj) => match (obj.get("tools"), obj.get("roles")) {
         (Some(Value::Array(entries)), _) | (_, Some(Value::Array(entries))) => entries,
         _ => {
            return Err(registry_err(
               "Registry object must contain one of: 'tools' or 'roles'.",
            ));
         },
      },
      _ => return Err(shape_error()),
   };

   entries
      .iter()
      .enumerate()
      .map(|(i, row)| {
         row
            .as_object()
            .ok_or_else(|| registry_err(format!("Entry at index {i} is not an object.")))
      })
      .collect()
}

/// String form of a scalar value, trimmed. `None` for null, arrays and
/// objects.
fn scalar(value: &Value) -> Option<String> {
   match value {
      Value::String(s) => Some(s.trim().to_string()),
      Value::Number(n) => Some(n.to_string()),
      Value::Bool(b) => Some(b.to_string()),
      Value::Null | Value::Array(_) | Value::Object(_) => None,
   }
}

fn stringify(value: &Value) -> String {
   scalar(value).unwrap_or_else(|| match value {
      Value::Null => String::new(),
      other => other.to_string(),
   })
}

fn text_field(row: &Map<String, Value>, key: &str) -> String {
   row.get(key).map(stringify).unwrap_or_default()
}

fn list_field(row: &Map<String, Value>, key: &str, card_id: &str) -> Result<Vec<String>> {
   match row.get(key) {
      None | Some(Value::Null) => Ok(Vec::new()),
      Some(Value::Array(items)) => Ok(items
         .iter()
         .map(stringify)
         .filter(|s| !s.is_empty())
         .collect()),
      Some(_) => Err(registry_err(format!("'{key}' must be a list in card '{card_id}'."))),
   }
}

fn map_field(
   row: &Map<String, Value>,
   key: &str,
   card_id: &str,
) -> Result<BTreeMap<String, String>> {
   match row.get(key) {
      None | Some(Value::Null) => Ok(BTreeMap::new()),
      Some(Value::Object(obj)) => Ok(obj
         .iter()
         .map(|(k, v)| (k.trim().to_string(), stringify(v)))
         .filter(|(k, v)| !k.is_empty() && !v.is_empty())
         .collect()),
      Some(_) => Err(registry_err(format!("'{key}' must be an object in card '{card_id}'."))),
   }
}

fn any_map_field(row: &Map<String, Value>, key: &str, card_id: &str) -> Result<Map<String, Value>> {
   match row.get(key) {
      None | Some(Value::Null) => Ok(Map::new()),
      Some(Value::Object(obj)) => Ok(obj.clone()),
      Some(_) => Err(registry_err(format!("'{key}' must be an object in card '{card_id}'."))),
   }
}

fn parse_card(row: &Map<String, Value>, idx: usize, root: &Path) -> Result<Card> {
   for key in REQUIRED {
      if text_field(row, key).is_empty() {
         return Err(registry_err(format!(
            "Missing required field '{key}' at entry index {idx}."
         )));
      }
   }

   let id = text_field(row, "id");
   let instruction_file = text_field(row, "instruction_file");

   let mut instruction_text = text_field(row, "instruction_text");
   if instruction_text.is_empty() {
      let path = root.join(&instruction_file);
      instruction_text = fs::read_to_string(&path)
         .map_err(|_| {
            registry_err(format!("Instruction file missing for '{id}': {}", path.display()))
         })?
         .trim()
         .to_string();
   }

   Ok(Card {
      title: text_field(row, "title"),
      domain: text_field(row, "domain"),
      description: text_field(row, "description"),
      tags: list_field(row, "tags", &id)?,
      tool_hints: list_field(row, "tool_hints", &id)?,
      examples: list_field(row, "examples", &id)?,
      aliases: list_field(row, "aliases", &id)?,
      dependencies: list_field(row, "dependencies", &id)?,
      output_artifacts: list_field(row, "output_artifacts", &id)?,
      quality_checks: list_field(row, "quality_checks", &id)?,
      constraints: list_field(row, "constraints", &id)?,
      input_contract: map_field(row, "input_contract", &id)?,
      risk_level: text_field(row, "risk_level"),
      maturity: text_field(row, "maturity"),
      metadata: any_map_field(row, "metadata", &id)?,
      instruction_file,
      instruction_text,
      id,
   })
}
