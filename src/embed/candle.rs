//! BGE sentence embeddings on candle: CLS pooling, unit-normalized output.

use std::{fmt::Display, path::PathBuf};

use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::ApiBuilder};
use once_cell::sync::OnceCell;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};

use crate::{
   config::{DENSE_MODEL, QUERY_PREFIX, debug_models, embed_batch_size, model_dir},
   embed::{Embedder, normalize_l2},
   error::{Error, Result},
};

const MAX_SEQ_LEN: usize = 512;

fn embedding_error<E: Display>(context: &'static str) -> impl FnOnce(E) -> Error {
   move |e| Error::Embedding(format!("{context}: {e}"))
}

/// Lazily loaded [`DENSE_MODEL`]. A failed load leaves the cell empty, so the
/// next call retries.
#[derive(Default)]
pub struct CandleEmbedder {
   model: OnceCell<BgeModel>,
}

struct BgeModel {
   bert:      BertModel,
   tokenizer: Tokenizer,
   device:    Device,
}

struct ModelFiles {
   config:    PathBuf,
   tokenizer: PathBuf,
   weights:   PathBuf,
}

impl ModelFiles {
   fn fetch() -> Result<Self> {
      let cache = model_dir();
      std::fs::create_dir_all(&cache)?;

      let repo = ApiBuilder::new()
         .with_cache_dir(cache)
         .with_progress(false)
         .build()
         .map_err(embedding_error("hub client"))?
         .repo(Repo::new(DENSE_MODEL.to_string(), RepoType::Model));
      let get = |name: &str| {
         repo
            .get(name)
            .map_err(|e| Error::Embedding(format!("{DENSE_MODEL}/{name} unavailable: {e}")))
      };

      Ok(Self {
         config:    get("config.json")?,
         tokenizer: get("tokenizer.json")?,
         weights:   get("model.safetensors")?,
      })
   }
}

impl BgeModel {
   fn load() -> Result<Self> {
      let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
      let files = ModelFiles::fetch()?;
      if debug_models() {
         tracing::info!(model = DENSE_MODEL, ?device, "loading embedding model");
      }

      let mut tokenizer =
         Tokenizer::from_file(&files.tokenizer).map_err(embedding_error("tokenizer"))?;
      tokenizer
         .with_padding(Some(PaddingParams::default()))
         .with_truncation(Some(TruncationParams {
            max_length: MAX_SEQ_LEN,
            ..TruncationParams::default()
         }))
         .map_err(embedding_error("tokenizer truncation"))?;

      let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&files.config)?)?;
      // SAFETY: the safetensors file sits in the model cache and is not
      // rewritten while mapped.
      let vars = unsafe {
         VarBuilder::from_mmaped_safetensors(&[files.weights], DTYPE, &device)
            .map_err(embedding_error("weights"))?
      };
      let bert = BertModel::load(vars, &config).map_err(embedding_error("bert"))?;

      Ok(Self { bert, tokenizer, device })
   }

   /// One CLS vector per text, in input order.
   fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
      if texts.is_empty() {
         return Ok(Vec::new());
      }

      let encodings = self
         .tokenizer
         .encode_batch(texts.to_vec(), true)
         .map_err(embedding_error("tokenization"))?;

      let rows = |pick: fn(&tokenizers::Encoding) -> &[u32]| -> Result<Tensor> {
         let rows = encodings
            .iter()
            .map(|enc| Tensor::new(pick(enc), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()
            .map_err(embedding_error("input tensor"))?;
         Tensor::stack(&rows, 0).map_err(embedding_error("input batch"))
      };
      let ids = rows(tokenizers::Encoding::get_ids)?;
      let mask = rows(tokenizers::Encoding::get_attention_mask)?;
      let types = ids.zeros_like().map_err(embedding_error("token types"))?;

      let hidden = self
         .bert
         .forward(&ids, &types, Some(&mask))
         .map_err(embedding_error("forward pass"))?;
      let mut vectors: Vec<Vec<f32>> = hidden
         .i((.., 0))
         .and_then(|cls| cls.to_vec2())
         .map_err(embedding_error("cls pooling"))?;

      for v in &mut vectors {
         normalize_l2(v);
      }
      Ok(vectors)
   }
}

impl CandleEmbedder {
   pub fn new() -> Self {
      Self::default()
   }

   fn model(&self) -> Result<&BgeModel> {
      self.model.get_or_try_init(BgeModel::load)
   }
}

impl Embedder for CandleEmbedder {
   fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
      let model = self.model()?;
      let mut vectors = Vec::with_capacity(texts.len());
      for batch in texts.chunks(embed_batch_size()) {
         let batch: Vec<&str> = batch.iter().map(String::as_str).collect();
         vectors.extend(model.embed(&batch)?);
      }
      Ok(vectors)
   }

   fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
      let query = format!("{QUERY_PREFIX}{text}");
      self
         .model()?
         .embed(&[query.as_str()])?
         .pop()
         .ok_or_else(|| Error::Embedding("empty query embedding".to_string()))
   }

   fn warm_up(&self) -> Result<()> {
      self.model().map(|_| ())
   }
}
