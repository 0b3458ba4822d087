use std::fmt::Write;

use super::{
   ARTIFACT_LIMIT, DEPENDENCY_LIMIT, DESCRIPTION_CHARS, HINT_LIMIT, TAG_LIMIT, joined, trim,
};
use crate::types::RetrievalHit;

pub fn render(query: &str, hits: &[RetrievalHit], instruction_chars: usize) -> String {
   let mut out = String::new();
   writeln!(out, "# Retrieved SkillMesh Cards").unwrap();
   writeln!(out, "Query: {query}").unwrap();
   writeln!(out).unwrap();

   for (idx, hit) in hits.iter().enumerate() {
      let c = &hit.card;
      writeln!(out, "## {}. {} (`{}`)", idx + 1, c.title, c.id).unwrap();
      writeln!(out, "Domain: {}", c.domain).unwrap();
      if !c.description.is_empty() {
         writeln!(out, "Purpose: {}", trim(&c.description, DESCRIPTION_CHARS)).unwrap();
      }
      if !c.tags.is_empty() {
         writeln!(out, "Tags: {}", joined(&c.tags, TAG_LIMIT)).unwrap();
      }
      if !c.tool_hints.is_empty() {
         writeln!(out, "Tool hints: {}", joined(&c.tool_hints, HINT_LIMIT)).unwrap();
      }
      if !c.dependencies.is_empty() {
         writeln!(out, "Dependencies: {}", joined(&c.dependencies, DEPENDENCY_LIMIT)).unwrap();
      }
      if !c.risk_level.is_empty() {
         writeln!(out, "Risk level: {}", c.risk_level).unwrap();
      }
      if !c.output_artifacts.is_empty() {
         let artifacts = joined(&c.output_artifacts, ARTIFACT_LIMIT);
         writeln!(out, "Output artifacts: {artifacts}").unwrap();
      }
      writeln!(out, "Score: {:.4}", hit.score).unwrap();
      writeln!(out, "Instructions:").unwrap();
      writeln!(out, "```md").unwrap();
      writeln!(out, "{}", trim(&c.instruction_text, instruction_chars)).unwrap();
      writeln!(out, "```").unwrap();
      writeln!(out).unwrap();
   }

   let end = out.trim_end().len();
   out.truncate(end);
   out.push('\n');
   out
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::render::tests::hit;

   #[test]
   fn renders_markdown_block() {
      let out = render("plot a chart", &[hit(), hit()], 700);
      let expected_card = |i: usize| {
         format!(
            "## {i}. Matplotlib plotting (`viz.matplotlib`)
Domain: data-viz
Purpose: Charts and figures
Tags: t0, t1, t2, t3, t4, t5, t6, t7, t8, t9, t10, t11
Tool hints: matplotlib
Risk level: low
Score: 0.1235
Instructions:
```md
Use seaborn for statistical plots.
```
"
         )
      };
      let expected = format!(
         "# Retrieved SkillMesh Cards\nQuery: plot a chart\n\n{}\n{}",
         expected_card(1),
         expected_card(2)
      );
      assert_eq!(out, expected);
   }

   #[test]
   fn empty_hits_keep_header() {
      assert_eq!(render("nothing", &[], 700), "# Retrieved SkillMesh Cards\nQuery: nothing\n");
   }
}
