//! Deterministic feature-hashing embedder.
//!
//! Each token is hashed (FNV-1a) into a fixed number of buckets and weighted by
//! its relative frequency, then the vector is L2-normalized. It captures
//! lexical overlap only, but never fails and needs no model download.

use std::collections::HashMap;

use crate::{
   config::DENSE_DIM,
   embed::{Embedder, normalize_l2},
   error::Result,
   search::sparse::tokenize,
};

#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
   dimensions: usize,
}

impl HashingEmbedder {
   pub fn new(dimensions: usize) -> Self {
      Self { dimensions: dimensions.max(1) }
   }

   fn bucket(&self, term: &str) -> usize {
      let mut h: u64 = 0xcbf29ce484222325;
      for b in term.as_bytes() {
         h ^= u64::from(*b);
         h = h.wrapping_mul(0x100000001b3);
      }
      (h % self.dimensions as u64) as usize
   }

   fn embed(&self, text: &str) -> Vec<f32> {
      let tokens = tokenize(text);
      let mut vector = vec![0.0f32; self.dimensions];
      if tokens.is_empty() {
         return vector;
      }

      let mut tf: HashMap<&str, f32> = HashMap::new();
      for token in &tokens {
         *tf.entry(token.as_str()).or_default() += 1.0;
      }

      let total = tokens.len() as f32;
      for (term, count) in tf {
         vector[self.bucket(term)] += count / total;
      }

      normalize_l2(&mut vector);
      vector
   }
}

impl Default for HashingEmbedder {
   fn default() -> Self {
      Self::new(DENSE_DIM)
   }
}

impl Embedder for HashingEmbedder {
   fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
      Ok(texts.iter().map(|t| self.embed(t)).collect())
   }

   fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
      Ok(self.embed(text))
   }

   fn warm_up(&self) -> Result<()> {
      Ok(())
   }
}
