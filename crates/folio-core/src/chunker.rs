//! Recursive character chunker with page-range resolution.
//!
//! Splits raw document text into overlapping passages, preferring to break
//! on paragraph boundaries (`\n\n`), then line breaks, then spaces, then
//! individual characters, keeping each passage near `chunk_size` characters
//! with roughly `chunk_overlap` characters shared between neighbours. Each
//! passage is then mapped back to its page range through the document's
//! [`PageMap`].
//!
//! # Algorithm
//!
//! 1. Split on the first separator present in the text; any piece still
//!    longer than `chunk_size` is re-split with the remaining separators.
//! 2. Greedily merge small pieces into passages, carrying a window of up
//!    to `chunk_overlap` characters into the next passage.
//! 3. Recover each passage's character span in the original text: the
//!    position of the first occurrence of its leading 20-character prefix,
//!    plus its character length.
//! 4. Resolve `page_start`/`page_end` through the [`PageMap`], falling
//!    back to `page_start` when the end is unresolved and clamping so
//!    `page_start <= page_end` whenever both resolve.
//!
//! Span recovery is a deterministic approximation: when a passage's
//! leading prefix also occurs earlier in the document, the first
//! occurrence wins. The splitter does not expose true offsets, so this is
//! documented rather than corrected.

use std::collections::VecDeque;

use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{PageMap, PageRef, Passage};

/// Separator preference order: paragraph break, line break, space, then
/// character-level splitting as the last resort.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Length of the prefix used to locate a passage in the original text.
const LOCATE_PREFIX_CHARS: usize = 20;

/// Splits document text into page-tagged, overlapping passages.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Create a chunker.
    ///
    /// Fails with [`Error::Config`] when `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size` (degenerate splitting), before any
    /// text is touched.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::config("chunk_size must be > 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Chunker {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split `text` into passages owned by `source_id`, resolving each
    /// passage's page range through `page_map`.
    ///
    /// Passages come back in text order. Empty input yields no passages.
    pub fn split(&self, text: &str, source_id: &str, page_map: &PageMap) -> Vec<Passage> {
        if text.is_empty() {
            return Vec::new();
        }
        let pieces = self.split_text(text, &SEPARATORS);
        debug!(source = source_id, pieces = pieces.len(), "chunked document");
        pieces
            .into_iter()
            .map(|piece| self.resolve_passage(text, source_id, page_map, piece))
            .collect()
    }

    fn resolve_passage(
        &self,
        text: &str,
        source_id: &str,
        page_map: &PageMap,
        piece: String,
    ) -> Passage {
        let (start_char, end_char) = locate_span(text, &piece);
        let page_start = page_map.page_at_or_after(start_char);
        let mut page_end = page_map.page_at_or_before(end_char);
        if !page_end.is_known() {
            page_end = page_start;
        }
        // The forward/reverse lookup pair can invert for a short mid-page
        // passage; clamp to keep page_start <= page_end.
        if let (PageRef::Page(start), PageRef::Page(end)) = (page_start, page_end) {
            if end < start {
                page_end = page_start;
            }
        }
        Passage::new(source_id, piece, page_start, page_end)
    }

    /// Split with the first separator present in `text`, re-splitting any
    /// piece still longer than `chunk_size` with the remaining separators.
    fn split_text(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, rest) = pick_separator(text, separators);
        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator).map(str::to_string).collect()
        };

        let mut merged = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in splits {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                merged.extend(self.merge_splits(std::mem::take(&mut pending), separator));
            }
            if rest.is_empty() {
                merged.push(piece);
            } else {
                merged.extend(self.split_text(&piece, rest));
            }
        }
        if !pending.is_empty() {
            merged.extend(self.merge_splits(pending, separator));
        }
        merged
    }

    /// Greedily pack small pieces into passages near `chunk_size`, keeping
    /// a window of up to `chunk_overlap` characters between consecutive
    /// passages.
    fn merge_splits(&self, splits: Vec<String>, separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut window: VecDeque<String> = VecDeque::new();
        let mut total = 0usize;

        for piece in splits {
            let piece_len = char_len(&piece);
            let joined_sep = |w: &VecDeque<String>| if w.is_empty() { 0 } else { sep_len };

            if total + piece_len + joined_sep(&window) > self.chunk_size && !window.is_empty() {
                if let Some(doc) = join_pieces(window.iter(), separator) {
                    docs.push(doc);
                }
                // Shrink the window to the overlap budget before the next
                // piece goes in.
                while total > self.chunk_overlap
                    || (total + piece_len + joined_sep(&window) > self.chunk_size && total > 0)
                {
                    let Some(front) = window.pop_front() else { break };
                    total -= char_len(&front) + joined_sep(&window);
                }
            }
            total += piece_len + joined_sep(&window);
            window.push_back(piece);
        }

        if let Some(doc) = join_pieces(window.iter(), separator) {
            docs.push(doc);
        }
        docs
    }
}

/// First separator that occurs in `text`, with the separators remaining
/// after it. The empty separator always matches.
fn pick_separator<'a>(text: &str, separators: &'a [&'a str]) -> (&'a str, &'a [&'a str]) {
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() || text.contains(sep) {
            return (sep, &separators[i + 1..]);
        }
    }
    ("", &[])
}

/// Join pieces with their separator and trim; `None` when nothing is left.
fn join_pieces<'a>(pieces: impl Iterator<Item = &'a String>, separator: &str) -> Option<String> {
    let joined = pieces.cloned().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Character span of `piece` within `text`.
///
/// The start is the first occurrence of the piece's leading 20-character
/// prefix; a prefix that recurs earlier in the text resolves to that
/// earlier occurrence. A prefix that never occurs falls back to offset 0.
fn locate_span(text: &str, piece: &str) -> (usize, usize) {
    let prefix_end = piece
        .char_indices()
        .nth(LOCATE_PREFIX_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(piece.len());
    let prefix = &piece[..prefix_end];
    let start_char = match text.find(prefix) {
        Some(byte_pos) => text[..byte_pos].chars().count(),
        None => 0,
    };
    (start_char, start_char + char_len(piece))
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = Chunker::new(100, 100).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(Chunker::new(100, 150).is_err());
        assert!(Chunker::new(100, 99).is_ok());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(matches!(Chunker::new(0, 0), Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_text_yields_no_passages() {
        let chunker = Chunker::new(100, 10).unwrap();
        assert!(chunker.split("", "doc", &PageMap::empty()).is_empty());
    }

    #[test]
    fn test_small_text_single_passage() {
        let chunker = Chunker::new(100, 10).unwrap();
        let passages = chunker.split("Hello, world.", "doc", &PageMap::empty());
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].content, "Hello, world.");
        assert_eq!(passages[0].source_id, "doc");
        assert_eq!(passages[0].page_start, PageRef::Unknown);
        assert_eq!(passages[0].page_end, PageRef::Unknown);
        assert_eq!(passages[0].similarity_score, None);
    }

    #[test]
    fn test_word_level_overlap_windows() {
        // Ten two-character words; the merge loop emits three-word
        // passages that share their last word with the next passage.
        let text = "aa bb cc dd ee ff gg hh ii jj";
        let chunker = Chunker::new(9, 4).unwrap();
        let contents: Vec<String> = chunker
            .split(text, "doc", &PageMap::empty())
            .into_iter()
            .map(|p| p.content)
            .collect();
        assert_eq!(
            contents,
            vec!["aa bb cc", "cc dd ee", "ee ff gg", "gg hh ii", "ii jj"]
        );
    }

    #[test]
    fn test_passages_follow_text_order() {
        let text = "The first paragraph talks about sailing ships.\n\n\
                    A second paragraph describes mountain weather.\n\n\
                    The third paragraph covers desert navigation.\n\n\
                    A fourth paragraph returns to harbour life.";
        let chunker = Chunker::new(60, 0).unwrap();
        let passages = chunker.split(text, "doc", &PageMap::empty());
        assert!(passages.len() > 1);

        let mut last_start = 0;
        for passage in &passages {
            let start = text.find(&passage.content).expect("passage is a substring");
            assert!(start >= last_start, "passages out of text order");
            last_start = start;
        }
    }

    #[test]
    fn test_passage_length_bounded() {
        let text = "word ".repeat(200);
        let chunker = Chunker::new(40, 8).unwrap();
        for passage in chunker.split(&text, "doc", &PageMap::empty()) {
            assert!(passage.content.chars().count() <= 40);
        }
    }

    #[test]
    fn test_long_unbroken_text_falls_back_to_character_split() {
        let text = "x".repeat(95);
        let chunker = Chunker::new(30, 5).unwrap();
        let passages = chunker.split(&text, "doc", &PageMap::empty());
        assert!(!passages.is_empty());
        for passage in &passages {
            assert!(passage.content.chars().count() <= 30);
        }
        let reassembled: usize = passages.iter().map(|p| p.content.len()).sum();
        assert!(reassembled >= 95, "character split must cover all input");
    }

    #[test]
    fn test_page_resolution_across_paragraphs() {
        // "alpha bravo charlie" is chars 0..19, the second paragraph
        // starts at char 21 (after the blank line).
        let text = "alpha bravo charlie\n\ndelta echo foxtrot golf";
        let map = PageMap::new([(0, 1), (21, 2)]).unwrap();
        let chunker = Chunker::new(25, 0).unwrap();
        let passages = chunker.split(text, "doc", &map);
        assert_eq!(passages.len(), 2);

        assert_eq!(passages[0].content, "alpha bravo charlie");
        assert_eq!(passages[0].page_start, PageRef::Page(1));
        assert_eq!(passages[0].page_end, PageRef::Page(1));

        assert_eq!(passages[1].content, "delta echo foxtrot golf");
        assert_eq!(passages[1].page_start, PageRef::Page(2));
        assert_eq!(passages[1].page_end, PageRef::Page(2));
    }

    #[test]
    fn test_repeated_prefix_resolves_to_first_occurrence() {
        // Both paragraphs are identical, so the second passage's prefix
        // search lands on the first occurrence. First-match policy is
        // deliberate; this test pins it.
        let para = "same words same words same";
        let text = format!("{}\n\n{}", para, para);
        let map = PageMap::new([(0, 1), (28, 2)]).unwrap();
        let chunker = Chunker::new(30, 0).unwrap();
        let passages = chunker.split(&text, "doc", &map);
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].page_start, passages[1].page_start);
        assert_eq!(passages[0].page_end, passages[1].page_end);
    }

    #[test]
    fn test_page_invariant_holds() {
        let text = "The first paragraph talks about sailing ships.\n\n\
                    A second paragraph describes mountain weather.\n\n\
                    The third paragraph covers desert navigation.\n\n\
                    A fourth paragraph returns to harbour life.";
        let maps = [
            PageMap::new([(0, 1)]).unwrap(),
            PageMap::new([(0, 1), (48, 2), (96, 3)]).unwrap(),
            PageMap::new([(0, 1), (10, 2), (20, 3), (30, 4), (40, 5), (90, 6)]).unwrap(),
            PageMap::empty(),
        ];
        let chunker = Chunker::new(60, 12).unwrap();
        for map in &maps {
            for passage in chunker.split(text, "doc", map) {
                if let (Some(start), Some(end)) =
                    (passage.page_start.as_number(), passage.page_end.as_number())
                {
                    assert!(
                        start <= end,
                        "page_start {} > page_end {} for {:?}",
                        start,
                        end,
                        passage.content
                    );
                }
            }
        }
    }

    #[test]
    fn test_multibyte_text_splits_cleanly() {
        let text = "première partie du récit\n\ndeuxième partie déjà écrite";
        let chunker = Chunker::new(30, 0).unwrap();
        let passages = chunker.split(text, "doc", &PageMap::empty());
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].content, "première partie du récit");
    }
}
