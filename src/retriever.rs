use tracing::debug;

use crate::{
    embedding::Embedder,
    error::{Error, Result},
    vector_index::{Hit, SimilarityIndex},
};

/// Answers queries against an index using the embedder that built it.
pub struct Retriever<'a> {
    embedder: &'a dyn Embedder,
    index: &'a dyn SimilarityIndex,
}

impl<'a> Retriever<'a> {
    /// Pair an embedder with an index.
    ///
    /// Fails when the index was built by a different model or at a
    /// different dimensionality, since scores would be meaningless.
    pub fn new(
        embedder: &'a dyn Embedder,
        index: &'a dyn SimilarityIndex,
    ) -> Result<Self> {
        if embedder.dimension() != index.dimension() {
            return Err(Error::DimensionMismatch {
                expected: index.dimension(),
                actual: embedder.dimension(),
            });
        }
        if embedder.model_id() != index.model_id() {
            return Err(Error::EmbedderMismatch {
                index: index.model_id().to_string(),
                configured: embedder.model_id().to_string(),
            });
        }
        Ok(Self { embedder, index })
    }

    /// Embed `query` and return its `top_k` nearest chunks, best first.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Hit>> {
        if top_k == 0 {
            return Err(Error::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }

        let vector = self
            .embedder
            .embed(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::Embedding("embedder returned no vector".to_string())
            })?;

        let hits = self.index.search(&vector, top_k)?;
        debug!(hits = hits.len(), top_k, "retrieved");
        Ok(hits)
    }
}
