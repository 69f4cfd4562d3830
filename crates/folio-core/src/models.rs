//! Core data types: page references, page maps, and passages.
//!
//! These types flow through the whole pipeline: the text-extraction side
//! produces a [`PageMap`] per document, the chunker turns text into
//! [`Passage`]s tagged with [`PageRef`] ranges, and retrieval hands the
//! same passages back with similarity scores filled in.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A page number resolved for a passage boundary, or [`PageRef::Unknown`]
/// when the boundary falls outside the page map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageRef {
    /// A resolved 1-based page number.
    Page(u32),
    /// The boundary could not be mapped to a page.
    Unknown,
}

impl PageRef {
    /// The page number, if resolved.
    pub fn as_number(self) -> Option<u32> {
        match self {
            PageRef::Page(p) => Some(p),
            PageRef::Unknown => None,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, PageRef::Page(_))
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageRef::Page(p) => write!(f, "{}", p),
            PageRef::Unknown => write!(f, "?"),
        }
    }
}

/// One page boundary: the character offset at which a page's text begins
/// within the concatenated document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBreak {
    pub offset: usize,
    pub page: u32,
}

/// Ordered character-offset to page-number table for one source document.
///
/// Produced once per document by the text-extraction side (one entry per
/// page encountered); consumed, never built, by the chunker. Offsets must
/// be non-decreasing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMap {
    entries: Vec<PageBreak>,
}

impl PageMap {
    /// Build a page map from `(char_offset, page_number)` pairs.
    ///
    /// Fails with [`Error::Config`] when offsets decrease.
    pub fn new(pairs: impl IntoIterator<Item = (usize, u32)>) -> Result<Self> {
        let entries: Vec<PageBreak> = pairs
            .into_iter()
            .map(|(offset, page)| PageBreak { offset, page })
            .collect();
        for pair in entries.windows(2) {
            if pair[1].offset < pair[0].offset {
                return Err(Error::config(format!(
                    "page map offsets must be non-decreasing: {} after {}",
                    pair[1].offset, pair[0].offset
                )));
            }
        }
        Ok(PageMap { entries })
    }

    /// A map with no entries; every lookup resolves to [`PageRef::Unknown`].
    pub fn empty() -> Self {
        PageMap::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Page of the first entry whose offset is `>= offset`, scanning
    /// forward in offset order.
    pub fn page_at_or_after(&self, offset: usize) -> PageRef {
        self.entries
            .iter()
            .find(|e| e.offset >= offset)
            .map(|e| PageRef::Page(e.page))
            .unwrap_or(PageRef::Unknown)
    }

    /// Page of the first entry whose offset is `<= offset`, scanning in
    /// reverse offset order.
    pub fn page_at_or_before(&self, offset: usize) -> PageRef {
        self.entries
            .iter()
            .rev()
            .find(|e| e.offset <= offset)
            .map(|e| PageRef::Page(e.page))
            .unwrap_or(PageRef::Unknown)
    }
}

/// A contiguous span of one source document's text, tagged with the page
/// range it came from.
///
/// A passage belongs to exactly one partition (its `source_id`) for its
/// entire lifetime. `similarity_score` stays `None` until retrieval fills
/// it in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    /// Stable identifier, assigned at chunking time.
    pub id: String,
    /// The owning document / partition.
    pub source_id: String,
    /// The passage text.
    pub content: String,
    pub page_start: PageRef,
    pub page_end: PageRef,
    /// Cosine similarity against the query; populated only by retrieval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f32>,
}

impl Passage {
    /// Create an unscored passage with a fresh UUID.
    pub fn new(
        source_id: impl Into<String>,
        content: impl Into<String>,
        page_start: PageRef,
        page_end: PageRef,
    ) -> Self {
        Passage {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            content: content.into(),
            page_start,
            page_end,
            similarity_score: None,
        }
    }

    /// Human-readable page range, e.g. `3`, `3-5`, or `?`.
    pub fn page_label(&self) -> String {
        match (self.page_start, self.page_end) {
            (PageRef::Page(s), PageRef::Page(e)) if s != e => format!("{}-{}", s, e),
            (start, _) => start.to_string(),
        }
    }
}
