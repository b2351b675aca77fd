use std::path::PathBuf;

use crate::{
    chunking::{ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE},
    embedding::DEFAULT_BATCH_SIZE,
    error::{Error, Result},
    sentence_model::DEFAULT_MODEL_ID,
};

pub const DEFAULT_TOP_K: usize = 5;

/// Everything a pipeline run can be configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Embedding model id, local model directory, `hash` or `hash:<dim>`.
    pub model_id: String,
    /// Directory holding the persisted index.
    pub index_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// Texts per embedder call while building.
    pub batch_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            index_dir: PathBuf::from("index"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Settings {
    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: self.chunk_size,
            overlap: self.chunk_overlap,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking().validate()?;
        if self.model_id.trim().is_empty() {
            return Err(Error::Config("model id must not be empty".into()));
        }
        if self.top_k == 0 {
            return Err(Error::InvalidArgument(
                "top_k must be at least 1".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidArgument(
                "batch size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
