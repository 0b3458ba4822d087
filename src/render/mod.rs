//! Renders retrieval hits as context blocks for downstream agents.

pub mod claude;
pub mod codex;

use serde::{Deserialize, Serialize};

use crate::types::RetrievalHit;

pub const DEFAULT_INSTRUCTION_CHARS: usize = 700;
/// Smallest excerpt the MCP surface accepts.
pub const MIN_INSTRUCTION_CHARS: usize = 100;

const DESCRIPTION_CHARS: usize = 260;
const TAG_LIMIT: usize = 12;
const HINT_LIMIT: usize = 8;
const DEPENDENCY_LIMIT: usize = 8;
const ARTIFACT_LIMIT: usize = 6;

#[derive(
   Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
   /// XML-tagged block.
   #[default]
   Claude,
   /// Markdown block.
   Codex,
}

impl Provider {
   pub fn parse(raw: &str) -> Option<Self> {
      match raw.trim().to_ascii_lowercase().as_str() {
         "claude" => Some(Self::Claude),
         "codex" => Some(Self::Codex),
         _ => None,
      }
   }
}

pub fn render_context(
   provider: Provider,
   query: &str,
   hits: &[RetrievalHit],
   instruction_chars: usize,
) -> String {
   match provider {
      Provider::Claude => claude::render(query, hits, instruction_chars),
      Provider::Codex => codex::render(query, hits, instruction_chars),
   }
}

/// Strips `text` and, when it is longer than `max_chars` characters, cuts it
/// there and appends ` ...`.
pub fn trim(text: &str, max_chars: usize) -> String {
   let text = text.trim();
   match text.char_indices().nth(max_chars) {
      None => text.to_string(),
      Some((cut, _)) => format!("{} ...", text[..cut].trim_end()),
   }
}

/// Comma-joined list of at most `limit` items.
fn joined(items: &[String], limit: usize) -> String {
   items[..items.len().min(limit)].join(", ")
}
