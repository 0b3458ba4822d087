//! Composite document text: the single blob per card that scorers and stores
//! actually see.

use sha2::{Digest, Sha256};

use crate::{
   config::{INSTRUCTION_PREFIX_CHARS, STORE_TAG_LIMIT},
   types::{Card, StoreDocument, StoreMetadata},
};

const HASH_INSTRUCTION_CHARS: usize = 500;

fn char_prefix(text: &str, max_chars: usize) -> &str {
   match text.char_indices().nth(max_chars) {
      Some((byte_idx, _)) => &text[..byte_idx],
      None => text,
   }
}

/// Concatenates every retrievable card field, one per line, followed by a
/// bounded prefix of the instruction text.
pub fn compose(card: &Card) -> String {
   let input_contract = card
      .input_contract
      .iter()
      .map(|(k, v)| format!("{k}:{v}"))
      .collect::<Vec<_>>()
      .join(", ");
   let metadata = card
      .metadata
      .iter()
      .map(|(k, v)| match v {
         serde_json::Value::String(s) => format!("{k}:{s}"),
         other => format!("{k}:{other}"),
      })
      .collect::<Vec<_>>()
      .join(", ");

   [
      card.id.clone(),
      card.title.clone(),
      card.domain.clone(),
      card.description.clone(),
      format!("tags: {}", card.tags.join(", ")),
      format!("tool_hints: {}", card.tool_hints.join(", ")),
      format!("examples: {}", card.examples.join(" | ")),
      format!("aliases: {}", card.aliases.join(", ")),
      format!("dependencies: {}", card.dependencies.join(", ")),
      format!("output_artifacts: {}", card.output_artifacts.join(", ")),
      format!("quality_checks: {}", card.quality_checks.join(", ")),
      format!("constraints: {}", card.constraints.join(", ")),
      format!("input_contract: {input_contract}"),
      format!("risk_level: {}", card.risk_level),
      format!("maturity: {}", card.maturity),
      format!("metadata: {metadata}"),
      char_prefix(&card.instruction_text, INSTRUCTION_PREFIX_CHARS).to_string(),
   ]
   .join("\n")
}

/// Short fingerprint of the fields that identify a card's content.
pub fn content_hash(card: &Card) -> String {
   let mut hasher = Sha256::new();
   hasher.update(card.id.as_bytes());
   hasher.update(b"|");
   hasher.update(card.title.as_bytes());
   hasher.update(b"|");
   hasher.update(card.description.as_bytes());
   hasher.update(b"|");
   hasher.update(card.tags.join(",").as_bytes());
   hasher.update(b"|");
   hasher.update(char_prefix(&card.instruction_text, HASH_INSTRUCTION_CHARS).as_bytes());
   let mut hash = hex::encode(hasher.finalize());
   hash.truncate(16);
   hash
}

pub fn store_document(card: &Card, text: String) -> StoreDocument {
   let tags = card
      .tags
      .iter()
      .take(STORE_TAG_LIMIT)
      .map(String::as_str)
      .collect::<Vec<_>>()
      .join(",");

   StoreDocument {
      id: card.id.clone(),
      text,
      metadata: StoreMetadata {
         domain: card.domain.clone(),
         risk_level: card.risk_level.clone(),
         maturity: card.maturity.clone(),
         tags,
         content_hash: content_hash(card),
      },
   }
}
