//! # Folio
//!
//! Application layer over [`folio_core`]: configuration, network-backed
//! embedding providers, and grounded answer generation.
//!
//! The core crate stays free of HTTP and configuration concerns; this
//! crate wires them together:
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with defaults and validation |
//! | [`embedding`] | `OpenAiEmbedder` plus provider dispatch |
//! | [`generate`] | `AnswerGenerator` trait and OpenAI chat implementation |
//!
//! A typical pipeline:
//!
//! ```rust,no_run
//! # async fn run() -> folio_core::Result<()> {
//! use folio::config::load_config;
//! use folio::embedding::create_embedder;
//! use folio_core::{Chunker, PageMap, PartitionedIndexStore, SearchParams, SearchRequest};
//!
//! let config = load_config(std::path::Path::new("folio.toml"))?;
//! let embedder = create_embedder(&config.embedding)?;
//! let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
//!
//! let passages = chunker.split("Call me Ishmael...", "Moby Dick", &PageMap::empty());
//! let mut store = PartitionedIndexStore::new(embedder);
//! store.build(passages).await?;
//!
//! let outcome = store
//!     .search(&SearchRequest {
//!         query: "who narrates the voyage?",
//!         partitions: None,
//!         params: SearchParams {
//!             total_k: config.retrieval.total_k,
//!             per_partition_cap: config.retrieval.per_partition_cap,
//!         },
//!     })
//!     .await?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod embedding;
pub mod generate;

pub use config::{load_config, Config};
pub use embedding::create_embedder;
pub use generate::{Answer, AnswerGenerator, OpenAiGenerator};
