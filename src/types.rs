use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

/// One skill, tool or role from the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Card {
   pub id:               String,
   pub title:            String,
   pub domain:           String,
   pub instruction_file: String,
   pub description:      String,
   pub tags:             Vec<String>,
   pub tool_hints:       Vec<String>,
   pub examples:         Vec<String>,
   pub aliases:          Vec<String>,
   pub dependencies:     Vec<String>,
   pub output_artifacts: Vec<String>,
   pub quality_checks:   Vec<String>,
   pub constraints:      Vec<String>,
   pub input_contract:   BTreeMap<String, String>,
   pub risk_level:       String,
   pub maturity:         String,
   pub metadata:         serde_json::Map<String, serde_json::Value>,
   pub instruction_text: String,
}

impl Card {
   pub fn new(id: impl Into<String>, instruction_text: impl Into<String>) -> Self {
      Self { id: id.into(), instruction_text: instruction_text.into(), ..Self::default() }
   }
}

/// A scored card returned by a backend query.
#[derive(Debug, Clone)]
pub struct RetrievalHit {
   pub card:         Arc<Card>,
   pub score:        f32,
   pub sparse_score: f32,
   /// `None` when no dense signal took part in the ranking.
   pub dense_score:  Option<f32>,
}

/// Flat JSON shape of a hit, shared by `retrieve` output and the MCP payload.
#[derive(Debug, Clone, Serialize)]
pub struct HitPayload<'a> {
   pub id:               &'a str,
   pub title:            &'a str,
   pub domain:           &'a str,
   pub description:      &'a str,
   pub tags:             &'a [String],
   pub tool_hints:       &'a [String],
   pub aliases:          &'a [String],
   pub dependencies:     &'a [String],
   pub input_contract:   &'a BTreeMap<String, String>,
   pub output_artifacts: &'a [String],
   pub quality_checks:   &'a [String],
   pub constraints:      &'a [String],
   pub risk_level:       &'a str,
   pub maturity:         &'a str,
   pub metadata:         &'a serde_json::Map<String, serde_json::Value>,
   pub score:            f32,
   pub sparse_score:     f32,
   pub dense_score:      Option<f32>,
}

impl<'a> From<&'a RetrievalHit> for HitPayload<'a> {
   fn from(hit: &'a RetrievalHit) -> Self {
      let card = hit.card.as_ref();
      Self {
         id:               &card.id,
         title:            &card.title,
         domain:           &card.domain,
         description:      &card.description,
         tags:             &card.tags,
         tool_hints:       &card.tool_hints,
         aliases:          &card.aliases,
         dependencies:     &card.dependencies,
         input_contract:   &card.input_contract,
         output_artifacts: &card.output_artifacts,
         quality_checks:   &card.quality_checks,
         constraints:      &card.constraints,
         risk_level:       &card.risk_level,
         maturity:         &card.maturity,
         metadata:         &card.metadata,
         score:            hit.score,
         sparse_score:     hit.sparse_score,
         dense_score:      hit.dense_score,
      }
   }
}

/// A document handed to a vector store: composite text plus a small metadata
/// sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
   pub id:       String,
   pub text:     String,
   pub metadata: StoreMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
   pub domain:       String,
   pub risk_level:   String,
   pub maturity:     String,
   pub tags:         String,
   pub content_hash: String,
}

/// A nearest-neighbour candidate. `distance` is absent when the store only
/// reports an ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreCandidate {
   pub id:       String,
   pub distance: Option<f32>,
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn payload_serializes_missing_dense_as_null() {
      let hit = RetrievalHit {
         card:         Arc::new(Card::new("viz.seaborn", "plot things")),
         score:        0.5,
         sparse_score: 0.5,
         dense_score:  None,
      };

      let json = serde_json::to_value(HitPayload::from(&hit)).unwrap();
      assert_eq!(json["id"], "viz.seaborn");
      assert!(json["dense_score"].is_null());
      assert!(json.get("instruction_text").is_none());
   }
}
