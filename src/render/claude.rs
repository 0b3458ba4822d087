use std::fmt::Write;

use super::{
   ARTIFACT_LIMIT, DEPENDENCY_LIMIT, DESCRIPTION_CHARS, HINT_LIMIT, TAG_LIMIT, joined, trim,
};
use crate::types::RetrievalHit;

pub fn render(query: &str, hits: &[RetrievalHit], instruction_chars: usize) -> String {
   let mut out = String::new();
   writeln!(out, "<retrieved_cards>").unwrap();
   writeln!(out, "  <query>{query}</query>").unwrap();

   for hit in hits {
      let c = &hit.card;
      writeln!(out, "  <card>").unwrap();
      writeln!(out, "    <id>{}</id>", c.id).unwrap();
      writeln!(out, "    <title>{}</title>", c.title).unwrap();
      writeln!(out, "    <domain>{}</domain>", c.domain).unwrap();
      writeln!(out, "    <score>{:.4}</score>", hit.score).unwrap();
      writeln!(out, "    <description>{}</description>", trim(&c.description, DESCRIPTION_CHARS))
         .unwrap();
      if !c.tags.is_empty() {
         writeln!(out, "    <tags>{}</tags>", joined(&c.tags, TAG_LIMIT)).unwrap();
      }
      if !c.tool_hints.is_empty() {
         writeln!(out, "    <tool_hints>{}</tool_hints>", joined(&c.tool_hints, HINT_LIMIT))
            .unwrap();
      }
      if !c.dependencies.is_empty() {
         writeln!(
            out,
            "    <dependencies>{}</dependencies>",
            joined(&c.dependencies, DEPENDENCY_LIMIT)
         )
         .unwrap();
      }
      if !c.risk_level.is_empty() {
         writeln!(out, "    <risk_level>{}</risk_level>", c.risk_level).unwrap();
      }
      if !c.output_artifacts.is_empty() {
         writeln!(
            out,
            "    <output_artifacts>{}</output_artifacts>",
            joined(&c.output_artifacts, ARTIFACT_LIMIT)
         )
         .unwrap();
      }
      writeln!(out, "    <instructions>").unwrap();
      writeln!(out, "{}", trim(&c.instruction_text, instruction_chars)).unwrap();
      writeln!(out, "    </instructions>").unwrap();
      writeln!(out, "  </card>").unwrap();
   }

   writeln!(out, "</retrieved_cards>").unwrap();
   out
}
