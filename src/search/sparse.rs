//! Lexical relevance: regex tokenization, BM25 through the `bm25` crate, and a
//! token-set Jaccard fallback.
//!
//! Every score vector leaving this module is normalized into `[0, 1]` by the
//! batch maximum, so it can be compared with (and fused against) the dense
//! signal.

use std::collections::HashSet;

use bm25::{Document, SearchEngine, SearchEngineBuilder, Tokenizer};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TOKEN_RE: Lazy<Regex> =
   Lazy::new(|| Regex::new(r"[a-zA-Z0-9_.]+").expect("token pattern is valid"));

/// Lowercases `text` and extracts runs of `[a-z0-9_.]`.
pub fn tokenize(text: &str) -> Vec<String> {
   let lowered = text.to_lowercase();
   TOKEN_RE
      .find_iter(&lowered)
      .map(|m| m.as_str().to_string())
      .collect()
}

/// Feeds [`tokenize`] to the BM25 engine in place of its stemming tokenizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardTokenizer;

impl Tokenizer for CardTokenizer {
   fn tokenize(&self, input_text: &str) -> Vec<String> {
      tokenize(input_text)
   }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SparseMode {
   #[default]
   Bm25,
   Jaccard,
}

/// BM25 engine keyed by corpus position.
pub struct Bm25 {
   engine: SearchEngine<usize, u32, CardTokenizer>,
   len:    usize,
}

impl Bm25 {
   const B: f32 = 0.75;
   const K1: f32 = 1.5;

   /// Returns `None` when the corpus carries no tokens at all, since document
   /// length normalization is undefined there.
   pub fn fit(docs: &[String], tokens: &[Vec<String>]) -> Option<Self> {
      if tokens.iter().all(Vec::is_empty) {
         return None;
      }

      let documents: Vec<Document<usize>> = docs
         .iter()
         .enumerate()
         .map(|(id, text)| Document { id, contents: text.clone() })
         .collect();
      let engine = SearchEngineBuilder::<usize, u32, CardTokenizer>::with_tokenizer_and_documents(
         CardTokenizer,
         documents,
      )
      .k1(Self::K1)
      .b(Self::B)
      .build();

      Some(Self { engine, len: docs.len() })
   }

   /// Raw BM25 score per document, 0 for documents sharing no query term.
   pub fn scores(&self, query: &str) -> Vec<f64> {
      let mut scores = vec![0.0; self.len];
      for hit in self.engine.search(query, self.len) {
         if let Some(slot) = scores.get_mut(hit.document.id) {
            *slot = f64::from(hit.score);
         }
      }
      scores
   }
}

enum Statistic {
   Bm25(Bm25),
   Jaccard(Vec<HashSet<String>>),
}

/// Tokenized corpus plus the fitted lexical statistic.
pub struct SparseIndex {
   len:       usize,
   statistic: Statistic,
}

impl SparseIndex {
   pub fn build(docs: &[String], mode: SparseMode) -> Self {
      let tokens: Vec<Vec<String>> = docs.par_iter().map(|doc| tokenize(doc)).collect();

      let bm25 = match mode {
         SparseMode::Bm25 => Bm25::fit(docs, &tokens),
         SparseMode::Jaccard => None,
      };

      let statistic = match bm25 {
         Some(model) => Statistic::Bm25(model),
         None => {
            if mode == SparseMode::Bm25 && !docs.is_empty() {
               tracing::warn!("bm25 statistics unavailable for this corpus, using jaccard overlap");
            }
            Statistic::Jaccard(tokens.into_iter().map(|t| t.into_iter().collect()).collect())
         },
      };

      Self { len: docs.len(), statistic }
   }

   pub const fn len(&self) -> usize {
      self.len
   }

   pub const fn is_empty(&self) -> bool {
      self.len == 0
   }

   pub const fn mode(&self) -> SparseMode {
      match self.statistic {
         Statistic::Bm25(_) => SparseMode::Bm25,
         Statistic::Jaccard(_) => SparseMode::Jaccard,
      }
   }

   /// One score in `[0, 1]` per indexed document. A query without tokens
   /// scores every document 0.
   pub fn scores(&self, query: &str) -> Vec<f32> {
      if self.len == 0 {
         return Vec::new();
      }
      let query_tokens = tokenize(query);
      if query_tokens.is_empty() {
         return vec![0.0; self.len];
      }

      let raw = match &self.statistic {
         Statistic::Bm25(model) => model.scores(query),
         Statistic::Jaccard(sets) => jaccard(&query_tokens, sets),
      };
      normalize_by_max(&raw)
   }
}

fn jaccard(query: &[String], docs: &[HashSet<String>]) -> Vec<f64> {
   let query: HashSet<&str> = query.iter().map(String::as_str).collect();
   docs
      .iter()
      .map(|doc| {
         let inter = query.iter().filter(|t| doc.contains(**t)).count();
         let union = query.len() + doc.len() - inter;
         if union == 0 {
            0.0
         } else {
            inter as f64 / union as f64
         }
      })
      .collect()
}

/// Divides by the batch maximum. A non-positive maximum yields all zeros, and
/// negative entries clamp to 0.
pub fn normalize_by_max(raw: &[f64]) -> Vec<f32> {
   let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
   if max.is_nan() || max <= 0.0 {
      return vec![0.0; raw.len()];
   }
   raw.iter()
      .map(|&s| (s / max).clamp(0.0, 1.0) as f32)
      .collect()
}
