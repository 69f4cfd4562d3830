//! Embedding seam and vector similarity helpers.
//!
//! [`Embedder`] is the contract every embedding backend implements. The
//! retrieval pipeline depends only on this trait; network-backed providers
//! live in the `folio` application crate.
//!
//! Scores flowing out of an index are cosine similarities: **higher is
//! more similar**. A backend wrapping a distance metric must invert it
//! before this seam.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Embedding backend used uniformly across all partitions.
///
/// `model_id` and `dims` are persisted with every index and checked again
/// on load; an index built with one model cannot be served by another.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the embedding model (e.g. `"text-embedding-3-small"`).
    fn model_id(&self) -> &str;

    /// Dimensionality of produced vectors.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

impl std::fmt::Debug for dyn Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("model_id", &self.model_id())
            .field("dims", &self.dims())
            .finish()
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Deterministic offline embedder using character-trigram feature hashing.
///
/// Each lowercased trigram is hashed (SHA-256) to a bucket and a sign,
/// and the accumulated vector is L2-normalized. Not a semantic model, but
/// stable across processes and platforms, which keeps persisted indexes
/// reloadable. Suitable for tests and air-gapped setups.
pub struct HashEmbedder {
    model_id: String,
    dims: usize,
}

impl HashEmbedder {
    /// Create a hashing embedder producing `dims`-dimensional vectors.
    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 {
            return Err(Error::config("embedding dims must be > 0"));
        }
        Ok(HashEmbedder {
            model_id: format!("feature-hash-{}", dims),
            dims,
        })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();
        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let gram: String = window.iter().collect();
            bump(&mut vector, &gram);
        }
        if chars.len() < 3 {
            bump(&mut vector, &lowered);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }
        vector
    }
}

/// Add one hashed feature to the accumulator.
fn bump(vector: &mut [f32], gram: &str) {
    let digest = Sha256::digest(gram.as_bytes());
    let bucket_bytes: [u8; 8] = digest[..8].try_into().unwrap();
    let bucket = (u64::from_le_bytes(bucket_bytes) % vector.len() as u64) as usize;
    let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
    vector[bucket] += sign;
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
