use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use tokenizers::{
    PaddingParams,
    PaddingStrategy,
    Tokenizer,
    TruncationParams,
};
use tracing::{debug, info};

use crate::{
    embedding::Embedder,
    error::{Error, Result, map_candle_err},
};

pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Upper bound on tokens per chunk fed to the encoder.
pub const MAX_SEQUENCE_LENGTH: usize = 256;

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

/// Sentence embedder backed by a BERT encoder with mean pooling.
///
/// Every input is padded (and truncated) to the same fixed length, so the
/// vector for a text never depends on what else shares its batch.
pub struct SentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dimension: usize,
}

impl SentenceEmbedder {
    /// Load a model from a local directory or the Hugging Face Hub.
    ///
    /// A directory must contain `config.json`, `tokenizer.json` and
    /// `model.safetensors`. Anything else is fetched from the hub (and
    /// cached there) under the given repository id.
    pub fn load(model_id: &str) -> Result<Self> {
        let files = resolve_files(model_id)?;
        let device = default_device();
        info!(model = model_id, device = ?device, "loading sentence model");

        let config: Config =
            serde_json::from_str(&std::fs::read_to_string(&files.config)?)?;

        let mut tokenizer =
            Tokenizer::from_file(&files.tokenizer).map_err(|e| {
                Error::Model(format!("failed to load tokenizer: {e}"))
            })?;
        let seq_len = config.max_position_embeddings.min(MAX_SEQUENCE_LENGTH);
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(seq_len),
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: seq_len,
                ..Default::default()
            }))
            .map_err(|e| {
                Error::Model(format!("failed to configure truncation: {e}"))
            })?;

        // SAFETY: the weights file is only read through the mapping and is
        // not modified while the model is alive.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(
                &[files.weights],
                DTYPE,
                &device,
            )
            .map_err(map_candle_err)?
        };
        let model = BertModel::load(vb, &config).map_err(|e| {
            Error::Model(format!("failed to build {model_id}: {e}"))
        })?;

        Ok(Self {
            model,
            tokenizer,
            device,
            model_id: model_id.to_string(),
            dimension: config.hidden_size,
        })
    }

    fn encode(&self, texts: &[String]) -> Result<Tensor> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| {
                Error::Embedding(format!("tokenization failed: {e}"))
            })?;

        let mut ids = Vec::new();
        let mut type_ids = Vec::new();
        let mut mask = Vec::new();
        for encoding in &encodings {
            ids.extend_from_slice(encoding.get_ids());
            type_ids.extend_from_slice(encoding.get_type_ids());
            mask.extend_from_slice(encoding.get_attention_mask());
        }

        let batch = encodings.len();
        let seq_len = encodings.first().map_or(0, |e| e.len());
        let shape = (batch, seq_len);
        let input_ids =
            Tensor::from_vec(ids, shape, &self.device).map_err(map_candle_err)?;
        let token_type_ids = Tensor::from_vec(type_ids, shape, &self.device)
            .map_err(map_candle_err)?;
        let attention_mask = Tensor::from_vec(mask, shape, &self.device)
            .map_err(map_candle_err)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(map_candle_err)?;

        masked_mean(&hidden, &attention_mask).map_err(map_candle_err)
    }
}

impl Embedder for SentenceEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = texts.len(), "encoding batch");
        self.encode(texts)?
            .to_dtype(DType::F32)
            .and_then(|t| t.to_vec2::<f32>())
            .map_err(map_candle_err)
    }
}

/// Average token vectors, ignoring padding positions.
fn masked_mean(
    hidden: &Tensor,
    attention_mask: &Tensor,
) -> candle_core::Result<Tensor> {
    let mask = attention_mask.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    summed.broadcast_div(&counts)
}

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

fn resolve_files(model_id: &str) -> Result<ModelFiles> {
    let local = Path::new(model_id);
    if local.is_dir() {
        let files = ModelFiles {
            config: local.join(CONFIG_FILE),
            tokenizer: local.join(TOKENIZER_FILE),
            weights: local.join(WEIGHTS_FILE),
        };
        for path in [&files.config, &files.tokenizer, &files.weights] {
            if !path.is_file() {
                return Err(Error::Model(format!(
                    "model directory is missing {}",
                    path.display()
                )));
            }
        }
        return Ok(files);
    }

    let api = hf_hub::api::sync::Api::new().map_err(|e| {
        Error::Model(format!("failed to reach the model hub: {e}"))
    })?;
    let repo = api.model(model_id.to_string());
    let fetch = |name: &str| {
        debug!(model = model_id, file = name, "fetching model file");
        repo.get(name).map_err(|e| {
            Error::Model(format!("failed to fetch {name} for {model_id}: {e}"))
        })
    };

    Ok(ModelFiles {
        config: fetch(CONFIG_FILE)?,
        tokenizer: fetch(TOKENIZER_FILE)?,
        weights: fetch(WEIGHTS_FILE)?,
    })
}
