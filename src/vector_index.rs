use std::cmp::Ordering;

use serde::Serialize;
use tracing::info;

use crate::{
    chunking::Chunk,
    embedding::{Embedder, embed_batched, l2_normalize},
    error::{Error, Result},
};

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    /// One-based rank within the result list.
    pub rank: usize,
    /// Cosine similarity to the query, higher is more relevant.
    pub score: f32,
    /// Insertion position of the chunk in the index.
    pub position: usize,
    #[serde(flatten)]
    pub chunk: Chunk,
}

/// Nearest-neighbour search over embedded chunks.
pub trait SimilarityIndex: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> usize;

    /// Model id of the embedder that produced the stored vectors.
    fn model_id(&self) -> &str;

    /// Return the `top_k` most similar chunks to `query`, best first.
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Hit>>;
}

/// Exact brute-force index holding unit vectors in one row-major buffer.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    model_id: String,
    dimension: usize,
    vectors: Vec<f32>,
    chunks: Vec<Chunk>,
}

impl FlatIndex {
    /// Embed `chunks` and build an index over them.
    ///
    /// Fails with [`Error::EmptyInput`] when there is nothing to index.
    pub fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::EmptyInput);
        }

        let texts: Vec<String> =
            chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embed_batched(embedder, &texts, batch_size)?;
        Self::from_embedded(chunks, embeddings, embedder)
    }

    /// Build an index from vectors `embedder` already produced for
    /// `chunks`, one per chunk in the same order.
    pub fn from_embedded(
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
        embedder: &dyn Embedder,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::EmptyInput);
        }
        if embeddings.len() != chunks.len() {
            return Err(Error::Embedding(format!(
                "{} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let dimension = embedder.dimension();
        let mut vectors = Vec::with_capacity(chunks.len() * dimension);
        for (position, mut vector) in embeddings.into_iter().enumerate() {
            if vector.len() != dimension {
                return Err(Error::Embedding(format!(
                    "vector {position} has dimension {}, expected {dimension}",
                    vector.len()
                )));
            }
            l2_normalize(&mut vector);
            vectors.extend_from_slice(&vector);
        }

        info!(
            chunks = chunks.len(),
            dimension,
            model = embedder.model_id(),
            "built similarity index"
        );

        Self::from_parts(
            embedder.model_id().to_string(),
            dimension,
            vectors,
            chunks,
        )
    }

    /// Assemble an index from already-normalized vectors.
    ///
    /// `vectors` holds `chunks.len()` rows of `dimension` floats each.
    pub(crate) fn from_parts(
        model_id: String,
        dimension: usize,
        vectors: Vec<f32>,
        chunks: Vec<Chunk>,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Embedding(
                "embedding dimension must be greater than zero".into(),
            ));
        }
        if vectors.len() != chunks.len() * dimension {
            return Err(Error::Embedding(format!(
                "{} floats do not form {} vectors of dimension {dimension}",
                vectors.len(),
                chunks.len()
            )));
        }
        Ok(Self {
            model_id,
            dimension,
            vectors,
            chunks,
        })
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Stored unit vector at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.vectors.get(start..start + self.dimension)
    }

    pub(crate) fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.vectors.chunks_exact(self.dimension)
    }

    /// Number of distinct source files contributing chunks.
    pub fn document_count(&self) -> usize {
        let mut sources: Vec<&str> =
            self.chunks.iter().map(|c| c.source_file.as_str()).collect();
        sources.sort_unstable();
        sources.dedup();
        sources.len()
    }
}

impl SimilarityIndex for FlatIndex {
    fn len(&self) -> usize {
        self.chunks.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Hit>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        l2_normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .rows()
            .enumerate()
            .map(|(position, row)| (position, dot(row, &query)))
            .collect();

        // Descending score, then ascending position for equal scores.
        scored.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(i, (position, score))| Hit {
                rank: i + 1,
                score,
                position,
                chunk: self.chunks[position].clone(),
            })
            .collect())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
