//! Partitioned index store: one vector index per source document.
//!
//! [`PartitionedIndexStore`] owns the source_id → [`VectorIndex`] mapping,
//! builds indexes from chunked passages, mirrors them to disk (one
//! directory per partition), and answers queries across a chosen subset
//! of partitions with per-partition fairness.
//!
//! # Merge algorithm
//!
//! 1. Scope = requested partitions ∩ known partitions; unknown names are
//!    skipped with a warning, never an error. No request = every known
//!    partition, in key order.
//! 2. Each partition in scope contributes up to `per_partition_cap`
//!    scored candidates.
//! 3. Candidates are stable-sorted by descending similarity; ties keep
//!    first-seen partition order, then per-partition rank.
//! 4. Greedy selection re-applies `per_partition_cap` and stops at
//!    `total_k`. The second cap application is intentional: the final
//!    result may never carry more than the cap from one source,
//!    whatever the per-partition queries returned.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::models::Passage;

/// Fan-out and fairness limits for one search call.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Maximum passages returned overall.
    pub total_k: usize,
    /// Maximum passages any single partition may contribute to the result.
    pub per_partition_cap: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            total_k: 10,
            per_partition_cap: 5,
        }
    }
}

/// Inputs for one search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    /// Query text, embedded once and run against every partition in scope.
    pub query: &'a str,
    /// Partitions to search; `None` means every known partition.
    pub partitions: Option<&'a [String]>,
    /// Fan-out limits.
    pub params: SearchParams,
}

/// Ranked passages plus the partition failures encountered on the way.
///
/// Empty `passages` with empty `failures` means "nothing relevant",
/// which is a valid result, not an error.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    /// Selected passages in final rank order, scores populated.
    pub passages: Vec<Passage>,
    /// Partitions whose query failed and was skipped.
    pub failures: Vec<Error>,
}

/// Outcome of [`PartitionedIndexStore::save`].
#[derive(Debug, Default)]
pub struct SaveReport {
    /// Partitions written, with their on-disk locations.
    pub saved: Vec<(String, PathBuf)>,
    /// Per-partition write failures; earlier writes are not rolled back.
    pub failures: Vec<Error>,
}

/// Outcome of [`PartitionedIndexStore::load`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Source ids restored into memory.
    pub loaded: Vec<String>,
    /// Partitions that could not be restored.
    pub failures: Vec<Error>,
}

/// Summary of one in-memory partition.
#[derive(Debug, Clone)]
pub struct PartitionInfo {
    pub source_id: String,
    pub passages: usize,
    pub built_at: DateTime<Utc>,
}

/// In-memory mapping from source document to its vector index, with
/// optional disk mirroring.
///
/// Keys are always the original (unsanitized) source ids; only directory
/// names on disk are sanitized. Mutation (`build`, `load`) takes
/// `&mut self`, so exclusive access is a compile-time property;
/// concurrent `search` calls against a non-mutating store are safe.
pub struct PartitionedIndexStore {
    embedder: Arc<dyn Embedder>,
    indexes: BTreeMap<String, VectorIndex>,
}

impl PartitionedIndexStore {
    /// Create an empty store using `embedder` uniformly across partitions.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        PartitionedIndexStore {
            embedder,
            indexes: BTreeMap::new(),
        }
    }

    /// Group `passages` by source and build one index per non-empty group.
    ///
    /// Rebuilding a source that already has an index replaces it: the
    /// last build wins.
    pub async fn build(&mut self, passages: Vec<Passage>) -> Result<()> {
        let mut groups: BTreeMap<String, Vec<Passage>> = BTreeMap::new();
        for passage in passages {
            groups
                .entry(passage.source_id.clone())
                .or_default()
                .push(passage);
        }
        for (source_id, group) in groups {
            info!(partition = %source_id, passages = group.len(), "building index");
            let index = VectorIndex::build(&source_id, group, self.embedder.as_ref()).await?;
            self.indexes.insert(source_id, index);
        }
        Ok(())
    }

    /// Number of partitions currently in memory.
    pub fn partition_count(&self) -> usize {
        self.indexes.len()
    }

    /// Known source ids, in key order.
    pub fn source_ids(&self) -> Vec<&str> {
        self.indexes.keys().map(String::as_str).collect()
    }

    /// Summaries of the in-memory partitions, in key order.
    pub fn partitions(&self) -> Vec<PartitionInfo> {
        self.indexes
            .values()
            .map(|index| PartitionInfo {
                source_id: index.source_id().to_string(),
                passages: index.len(),
                built_at: index.built_at(),
            })
            .collect()
    }

    /// Mirror every in-memory partition under `base_dir`, one sanitized
    /// directory per partition.
    ///
    /// Write failures are collected per partition; partitions already
    /// written stay on disk.
    pub fn save(&self, base_dir: &Path) -> Result<SaveReport> {
        fs::create_dir_all(base_dir)?;
        let mut report = SaveReport::default();
        for (source_id, index) in &self.indexes {
            let dir = base_dir.join(sanitize_partition_name(source_id));
            match index.save(&dir) {
                Ok(()) => report.saved.push((source_id.clone(), dir)),
                Err(err) => {
                    warn!(partition = %source_id, error = %err, "failed to persist partition");
                    report.failures.push(err);
                }
            }
        }
        Ok(report)
    }

    /// Restore every partition found under `base_dir`, replacing the
    /// in-memory mapping.
    ///
    /// Partition-scoped failures (unreadable format, embedder mismatch)
    /// are collected while the remaining partitions still load. The
    /// in-memory key is the original source id recorded in each index
    /// manifest.
    pub fn load(&mut self, base_dir: &Path) -> Result<LoadReport> {
        let dir_entries = fs::read_dir(base_dir)?;
        self.indexes.clear();

        let mut report = LoadReport::default();
        for dir_entry in dir_entries {
            let path = dir_entry?.path();
            if !path.is_dir() {
                continue;
            }
            match VectorIndex::load(&path, self.embedder.as_ref()) {
                Ok(index) => {
                    report.loaded.push(index.source_id().to_string());
                    self.indexes.insert(index.source_id().to_string(), index);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to load partition");
                    report.failures.push(err);
                }
            }
        }
        Ok(report)
    }

    /// Run `request` across the partitions in scope and merge the ranked
    /// results.
    ///
    /// Returns `Err` only when the query itself cannot run (embedding
    /// failure); per-partition query failures land in
    /// [`SearchOutcome::failures`] while the other partitions' results
    /// stand.
    pub async fn search(&self, request: &SearchRequest<'_>) -> Result<SearchOutcome> {
        let scope = self.scope(request.partitions);
        if scope.is_empty() {
            debug!("search scope is empty");
            return Ok(SearchOutcome::default());
        }

        let query_vec = self
            .embedder
            .embed(&[request.query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("provider returned no query vector".to_string()))?;

        let mut candidates: Vec<Passage> = Vec::new();
        let mut failures = Vec::new();
        for source_id in &scope {
            let Some(index) = self.indexes.get(source_id) else {
                continue;
            };
            match index.query(&query_vec, request.params.per_partition_cap) {
                Ok(hits) => candidates.extend(hits),
                Err(err) => {
                    warn!(partition = %source_id, error = %err, "partition query failed, skipping");
                    failures.push(err);
                }
            }
        }
        debug!(
            candidates = candidates.len(),
            partitions = scope.len(),
            "merging candidates"
        );

        let passages = select_ranked(candidates, &request.params);
        Ok(SearchOutcome { passages, failures })
    }

    /// Requested partitions intersected with known ones; unknown names
    /// are skipped. No request = every known partition in key order.
    fn scope(&self, requested: Option<&[String]>) -> Vec<String> {
        match requested {
            Some(names) => names
                .iter()
                .filter(|name| {
                    let known = self.indexes.contains_key(*name);
                    if !known {
                        warn!(partition = %name, "unknown partition requested, skipping");
                    }
                    known
                })
                .cloned()
                .collect(),
            None => self.indexes.keys().cloned().collect(),
        }
    }
}

/// Stable-sort candidates by descending similarity, then greedily select
/// while re-applying the per-partition cap until `total_k` is reached.
fn select_ranked(mut candidates: Vec<Passage>, params: &SearchParams) -> Vec<Passage> {
    candidates.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut taken: HashMap<String, usize> = HashMap::new();
    let mut selected = Vec::with_capacity(params.total_k.min(candidates.len()));
    for passage in candidates {
        if selected.len() >= params.total_k {
            break;
        }
        let count = taken.entry(passage.source_id.clone()).or_insert(0);
        if *count < params.per_partition_cap {
            *count += 1;
            selected.push(passage);
        }
    }
    selected
}

/// Directory name for a partition: spaces become underscores.
pub fn sanitize_partition_name(source_id: &str) -> String {
    source_id.replace(' ', "_")
}

/// Best-effort reversal of [`sanitize_partition_name`]. Exact recovery
/// comes from the source id recorded in the index manifest; this is the
/// fallback for reasoning about the on-disk layout alone.
pub fn desanitize_partition_name(name: &str) -> String {
    name.replace('_', " ")
}
