//! The [`Embedder`] capability and the helpers every backend shares.
//!
//! Embedders may return vectors of any length; the similarity index
//! L2-normalizes them on the way in and on the way out, so inner product
//! equals cosine similarity.

use rayon::prelude::*;

use crate::{
    error::{Error, Result},
    sentence_model::SentenceEmbedder,
};

/// Model id prefix selecting the offline [`HashEmbedder`].
pub const HASH_MODEL_PREFIX: &str = "hash";

/// Dimension used by `hash` when no explicit `hash:<dim>` is given.
pub const DEFAULT_HASH_DIMENSION: usize = 384;

/// Default number of texts handed to an embedder per call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Maps text to fixed-dimension vectors.
///
/// Implementations must be deterministic: the same text always yields the
/// same vector regardless of which batch it arrives in.
pub trait Embedder: Send + Sync {
    /// Identifier recorded alongside a built index.
    fn model_id(&self) -> &str;

    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed a batch, returning one vector per input in input order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Resolve an embedder from a model identifier.
///
/// `hash` and `hash:<dim>` select the [`HashEmbedder`]; anything else is
/// treated as a Hugging Face model id or a local model directory.
pub fn from_model_id(model_id: &str) -> Result<Box<dyn Embedder>> {
    if let Some(rest) = model_id.strip_prefix(HASH_MODEL_PREFIX)
        && (rest.is_empty() || rest.starts_with(':'))
    {
        let dimension = match rest.strip_prefix(':') {
            Some(dim) => dim.parse().map_err(|_| {
                Error::Config(format!("invalid hash dimension: {dim}"))
            })?,
            None => DEFAULT_HASH_DIMENSION,
        };
        return Ok(Box::new(HashEmbedder::new(dimension)?));
    }

    Ok(Box::new(SentenceEmbedder::load(model_id)?))
}

/// Embed `texts` in batches of `batch_size`, spreading batches across the
/// rayon pool. Output order always matches input order.
pub fn embed_batched(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let batch_size = batch_size.max(1);
    let batches: Vec<Vec<Vec<f32>>> = texts
        .par_chunks(batch_size)
        .map(|batch| {
            let vectors = embedder.embed(batch)?;
            check_batch(embedder, batch.len(), &vectors)?;
            Ok(vectors)
        })
        .collect::<Result<_>>()?;

    Ok(batches.into_iter().flatten().collect())
}

fn check_batch(
    embedder: &dyn Embedder,
    expected: usize,
    vectors: &[Vec<f32>],
) -> Result<()> {
    if vectors.len() != expected {
        return Err(Error::Embedding(format!(
            "{} returned {} vectors for {expected} texts",
            embedder.model_id(),
            vectors.len()
        )));
    }
    let dimension = embedder.dimension();
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(Error::Embedding(format!(
            "{} returned a {}-dimensional vector, expected {dimension}",
            embedder.model_id(),
            bad.len()
        )));
    }
    Ok(())
}

/// Scale `vector` to unit length in place. Zero vectors stay zero.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Deterministic feature-hashing embedder.
///
/// Each lower-cased alphanumeric token is hashed with blake3 into one
/// signed bucket. Texts sharing words point in similar directions, which
/// is enough for offline runs and tests without a model download.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidArgument(
                "hash embedder dimension must be greater than zero".into(),
            ));
        }
        let model_id = if dimension == DEFAULT_HASH_DIMENSION {
            HASH_MODEL_PREFIX.to_string()
        } else {
            format!("{HASH_MODEL_PREFIX}:{dimension}")
        };
        Ok(Self {
            dimension,
            model_id,
        })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty());

        for token in tokens {
            let hash = blake3::hash(token.to_lowercase().as_bytes());
            let bytes = hash.as_bytes();
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(word) % self.dimension as u64)
                as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        vector
    }
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn hash_embedder_is_deterministic_and_case_insensitive() {
        let embedder = HashEmbedder::new(64).unwrap();
        let a = embedder.embed(&strings(&["Sea View"])).unwrap();
        let b = embedder.embed(&strings(&["sea view"])).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);
    }

    #[test]
    fn shared_words_score_higher_than_disjoint_text() {
        let embedder = HashEmbedder::new(DEFAULT_HASH_DIMENSION).unwrap();
        let mut vectors = embedder
            .embed(&strings(&[
                "swimming pool and gym",
                "pool",
                "parking garage",
            ]))
            .unwrap();
        for v in &mut vectors {
            l2_normalize(v);
        }
        let related = dot(&vectors[0], &vectors[1]);
        let unrelated = dot(&vectors[2], &vectors[1]);
        assert!(related > unrelated);
    }

    #[test]
    fn batching_does_not_change_output() {
        let embedder = HashEmbedder::new(32).unwrap();
        let texts: Vec<String> =
            (0..25).map(|i| format!("brochure page {i}")).collect();

        let single = embed_batched(&embedder, &texts, 1).unwrap();
        let batched = embed_batched(&embedder, &texts, 7).unwrap();
        let whole = embedder.embed(&texts).unwrap();

        assert_eq!(single, batched);
        assert_eq!(batched, whole);
    }

    #[test]
    fn embed_batched_empty_input() {
        let embedder = HashEmbedder::new(8).unwrap();
        assert!(embed_batched(&embedder, &[], 4).unwrap().is_empty());
    }

    struct ShortEmbedder;

    impl Embedder for ShortEmbedder {
        fn model_id(&self) -> &str {
            "short"
        }

        fn dimension(&self) -> usize {
            4
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0; 3]).collect())
        }
    }

    #[test]
    fn embed_batched_rejects_wrong_dimension() {
        let err = embed_batched(&ShortEmbedder, &strings(&["a"]), 4)
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[test]
    fn l2_normalize_unit_length_and_zero_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 4];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0; 4]);
    }

    #[test]
    fn from_model_id_selects_hash_embedder() {
        let default = from_model_id("hash").unwrap();
        assert_eq!(default.dimension(), DEFAULT_HASH_DIMENSION);
        assert_eq!(default.model_id(), "hash");

        let custom = from_model_id("hash:16").unwrap();
        assert_eq!(custom.dimension(), 16);
        assert_eq!(custom.model_id(), "hash:16");

        assert!(matches!(
            from_model_id("hash:lots"),
            Err(Error::Config(_))
        ));
        assert!(from_model_id("hash:0").is_err());
    }
}
