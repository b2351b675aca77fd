//! brochure-rag - the retrieval half of a question-answering system over
//! PDF property brochures.
//!
//! Documents are split into overlapping per-page chunks, each chunk is
//! embedded, and the vectors are kept in an exact cosine similarity index
//! persisted with [redb](https://github.com/cberner/redb). A question is
//! answered by embedding it and returning the nearest chunks together with
//! the file and page they came from, ready to ground a language model.
//!
//! # Quick start
//!
//! ```
//! use brochure_rag::{RagContext, Settings};
//!
//! # let tmp = tempfile::tempdir().unwrap();
//! let brochure = tmp.path().join("marina.txt");
//! std::fs::write(&brochure, "Rooftop pool\x0cTwo parking bays").unwrap();
//!
//! let context = RagContext::new(Settings {
//!     model_id: "hash".to_string(),
//!     index_dir: tmp.path().join("index"),
//!     ..Settings::default()
//! })
//! .unwrap();
//!
//! context.ingest(&[brochure]).unwrap();
//! let hits = context.retrieve("parking bays", 1).unwrap();
//! assert_eq!(hits[0].chunk.page, 2);
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod context;
pub mod data_dir;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index_store;
pub mod ingestion;
pub mod manifest;
pub mod mcp;
pub mod prompt;
pub mod retriever;
pub mod sentence_model;
pub mod vector_index;
pub mod walker;

pub use chunking::{Chunk, ChunkingConfig};
pub use config::Settings;
pub use context::RagContext;
pub use data_dir::DataDir;
pub use embedding::{Embedder, HashEmbedder};
pub use error::{Error, Result};
pub use extract::{ExtractorRegistry, TextExtractor};
pub use index_store::IndexStore;
pub use retriever::Retriever;
pub use sentence_model::SentenceEmbedder;
pub use vector_index::{FlatIndex, Hit, SimilarityIndex};
