//! # Folio Core
//!
//! Page-grounded passage retrieval for multi-page document libraries.
//!
//! Folio chunks raw document text into passages that remember the page
//! range they came from, keeps one vector index per source document
//! (a *partition*), mirrors those indexes to disk, and answers queries
//! across a chosen set of partitions with per-partition fairness.
//!
//! ## Data Flow
//!
//! ```text
//! text + PageMap ──▶ Chunker ──▶ page-tagged Passages
//!                                      │
//!                                      ▼
//!                        PartitionedIndexStore::build
//!                        (one VectorIndex per source)
//!                              │              │
//!                        save/load        search(query)
//!                        (disk mirror)    ranked Passages
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | `Passage`, `PageRef`, and the `PageMap` breakpoint table |
//! | [`chunker`] | Recursive character splitting with page resolution |
//! | [`embedding`] | `Embedder` trait, cosine similarity, offline hashing embedder |
//! | [`index`] | Per-partition vector index with JSON persistence |
//! | [`store`] | `PartitionedIndexStore`: build / save / load / search |
//! | [`error`] | Typed failure taxonomy |
//!
//! Network-backed embedding providers and answer generation live in the
//! `folio` application crate; this crate has no HTTP dependencies.

pub mod chunker;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod store;

pub use chunker::Chunker;
pub use error::{Error, Result};
pub use models::{PageMap, PageRef, Passage};
pub use store::{
    LoadReport, PartitionedIndexStore, SaveReport, SearchOutcome, SearchParams, SearchRequest,
};
