//! Per-partition vector index with on-disk persistence.
//!
//! One [`VectorIndex`] backs one partition. Retrieval is brute-force
//! cosine similarity over all stored vectors, which keeps the on-disk
//! format a plain serde document: `<partition dir>/index.json` holds the
//! manifest (owning source, model id, dims, build time) and the entries
//! (passage + vector + content hash).
//!
//! Model id, dims, and per-entry content hashes are re-checked on load;
//! any mismatch fails that partition with [`Error::Load`].

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{Error, Result};
use crate::models::Passage;

/// Name of the index file inside a partition directory.
pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    passage: Passage,
    vector: Vec<f32>,
    content_hash: String,
}

/// A queryable vector index over one partition's passages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    source_id: String,
    model_id: String,
    dims: usize,
    built_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Embed `passages` in one batch and build an index for `source_id`.
    pub async fn build(
        source_id: &str,
        passages: Vec<Passage>,
        embedder: &dyn Embedder,
    ) -> Result<Self> {
        let texts: Vec<String> = passages.iter().map(|p| p.content.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != passages.len() {
            return Err(Error::Embedding(format!(
                "expected {} vectors, provider returned {}",
                passages.len(),
                vectors.len()
            )));
        }

        let entries = passages
            .into_iter()
            .zip(vectors)
            .map(|(passage, vector)| {
                let content_hash = hash_content(&passage.content);
                IndexEntry {
                    passage,
                    vector,
                    content_hash,
                }
            })
            .collect();

        Ok(VectorIndex {
            source_id: source_id.to_string(),
            model_id: embedder.model_id().to_string(),
            dims: embedder.dims(),
            built_at: Utc::now(),
            entries,
        })
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-`k` passages by cosine similarity to `query_vec`, descending,
    /// each with `similarity_score` populated.
    ///
    /// Fails with [`Error::Retrieval`] when `query_vec` does not match the
    /// index dimensionality.
    pub fn query(&self, query_vec: &[f32], k: usize) -> Result<Vec<Passage>> {
        if query_vec.len() != self.dims {
            return Err(Error::Retrieval {
                partition: self.source_id.clone(),
                reason: format!(
                    "query vector has {} dims, index expects {}",
                    query_vec.len(),
                    self.dims
                ),
            });
        }

        let mut hits: Vec<Passage> = self
            .entries
            .iter()
            .map(|entry| {
                let mut passage = entry.passage.clone();
                passage.similarity_score = Some(cosine_similarity(query_vec, &entry.vector));
                passage
            })
            .collect();
        hits.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Persist the index under `dir` as [`INDEX_FILE`].
    pub fn save(&self, dir: &Path) -> Result<()> {
        let persist = |reason: String| Error::Persist {
            partition: self.source_id.clone(),
            reason,
        };
        fs::create_dir_all(dir).map_err(|e| persist(e.to_string()))?;
        let json = serde_json::to_vec_pretty(self).map_err(|e| persist(e.to_string()))?;
        fs::write(dir.join(INDEX_FILE), json).map_err(|e| persist(e.to_string()))?;
        info!(partition = %self.source_id, path = %dir.display(), "saved index");
        Ok(())
    }

    /// Restore a persisted index from `dir`, verifying it against the
    /// current embedder.
    pub fn load(dir: &Path, embedder: &dyn Embedder) -> Result<Self> {
        let partition_hint = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        let fail = |reason: String| Error::Load {
            partition: partition_hint.clone(),
            reason,
        };

        let bytes = fs::read(dir.join(INDEX_FILE)).map_err(|e| fail(e.to_string()))?;
        let index: VectorIndex =
            serde_json::from_slice(&bytes).map_err(|e| fail(format!("unreadable index: {}", e)))?;

        if index.model_id != embedder.model_id() {
            return Err(fail(format!(
                "index built with model '{}', current model is '{}'",
                index.model_id,
                embedder.model_id()
            )));
        }
        if index.dims != embedder.dims() {
            return Err(fail(format!(
                "index has {} dims, current embedder produces {}",
                index.dims,
                embedder.dims()
            )));
        }
        for entry in &index.entries {
            if entry.vector.len() != index.dims {
                return Err(fail(format!(
                    "entry vector has {} dims, manifest says {}",
                    entry.vector.len(),
                    index.dims
                )));
            }
            if hash_content(&entry.passage.content) != entry.content_hash {
                return Err(fail(format!(
                    "content hash mismatch for passage {}",
                    entry.passage.id
                )));
            }
        }

        info!(partition = %index.source_id, entries = index.entries.len(), "loaded index");
        Ok(index)
    }
}

/// SHA-256 of a passage's content, re-checked on load to catch corruption.
fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::PageRef;
    use tempfile::TempDir;

    fn sample_passages(source_id: &str) -> Vec<Passage> {
        vec![
            Passage::new(
                source_id,
                "The harbour was quiet before the storm rolled in.",
                PageRef::Page(1),
                PageRef::Page(1),
            ),
            Passage::new(
                source_id,
                "Mountain weather changes without warning in spring.",
                PageRef::Page(2),
                PageRef::Page(3),
            ),
            Passage::new(
                source_id,
                "Desert navigation relies on the stars after dusk.",
                PageRef::Page(4),
                PageRef::Page(4),
            ),
        ]
    }

    #[tokio::test]
    async fn test_self_similarity_ranks_first() {
        let embedder = HashEmbedder::new(64).unwrap();
        let index = VectorIndex::build("book", sample_passages("book"), &embedder)
            .await
            .unwrap();

        let query = embedder
            .embed(&["Mountain weather changes without warning in spring.".to_string()])
            .await
            .unwrap();
        let hits = index.query(&query[0], 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits[0].content.starts_with("Mountain weather"));
        let top = hits[0].similarity_score.unwrap();
        assert!((top - 1.0).abs() < 1e-4, "self-similarity was {}", top);

        // Descending order.
        for pair in hits.windows(2) {
            assert!(pair[0].similarity_score >= pair[1].similarity_score);
        }
    }

    #[tokio::test]
    async fn test_query_respects_k() {
        let embedder = HashEmbedder::new(32).unwrap();
        let index = VectorIndex::build("book", sample_passages("book"), &embedder)
            .await
            .unwrap();
        let query = embedder.embed(&["storm".to_string()]).await.unwrap();
        assert_eq!(index.query(&query[0], 2).unwrap().len(), 2);
        assert_eq!(index.query(&query[0], 0).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_query_rejects_dims_mismatch() {
        let embedder = HashEmbedder::new(32).unwrap();
        let index = VectorIndex::build("book", sample_passages("book"), &embedder)
            .await
            .unwrap();
        let err = index.query(&[0.5; 16], 3).unwrap_err();
        assert!(matches!(err, Error::Retrieval { .. }));
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let embedder = HashEmbedder::new(48).unwrap();
        let index = VectorIndex::build("book", sample_passages("book"), &embedder)
            .await
            .unwrap();

        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("book");
        index.save(&dir).unwrap();

        let restored = VectorIndex::load(&dir, &embedder).unwrap();
        assert_eq!(restored.source_id(), "book");
        assert_eq!(restored.len(), 3);

        let query = embedder.embed(&["harbour storm".to_string()]).await.unwrap();
        let before = index.query(&query[0], 3).unwrap();
        let after = restored.query(&query[0], 3).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(a.id, b.id);
            let (sa, sb) = (a.similarity_score.unwrap(), b.similarity_score.unwrap());
            assert!((sa - sb).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_load_rejects_embedder_mismatch() {
        let small = HashEmbedder::new(16).unwrap();
        let index = VectorIndex::build("book", sample_passages("book"), &small)
            .await
            .unwrap();

        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("book");
        index.save(&dir).unwrap();

        let other = HashEmbedder::new(64).unwrap();
        let err = VectorIndex::load(&dir, &other).unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }

    #[tokio::test]
    async fn test_load_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("book");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(INDEX_FILE), b"not an index").unwrap();

        let embedder = HashEmbedder::new(16).unwrap();
        let err = VectorIndex::load(&dir, &embedder).unwrap_err();
        match err {
            Error::Load { partition, .. } => assert_eq!(partition, "book"),
            other => panic!("expected Load error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_rejects_tampered_content() {
        let embedder = HashEmbedder::new(16).unwrap();
        let index = VectorIndex::build("book", sample_passages("book"), &embedder)
            .await
            .unwrap();

        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("book");
        index.save(&dir).unwrap();

        let path = dir.join(INDEX_FILE);
        let mut doc: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        doc["entries"][0]["passage"]["content"] = serde_json::json!("tampered text");
        fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let err = VectorIndex::load(&dir, &embedder).unwrap_err();
        match err {
            Error::Load { reason, .. } => assert!(reason.contains("hash mismatch")),
            other => panic!("expected Load error, got {:?}", other),
        }
    }
}
