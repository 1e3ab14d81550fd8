//! Page citation normalization.
//!
//! Page metadata arrives inconsistently indexed: some index builders store
//! 0-based page numbers, some 1-based, and some chunks carry none at all.
//! The viewer needs human 1-based numbers, so when the minimum metadata page
//! is 0 the whole set is treated as 0-based and shifted by one. The shift is
//! applied uniformly, never per chunk, so a single document never shows a
//! mix of adjusted and unadjusted numbers. Pageless chunks fall back to a
//! `Page <n>` marker in the body text (already 1-based, never shifted), and
//! failing that cite page 1: every chunk that feeds an answer must resolve
//! to some citeable page.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::vectorstore::RetrievedChunk;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCitations {
    /// Sorted, deduplicated, 1-based page numbers.
    pub pages: Vec<u32>,
    /// Where the viewer should open; 1 when no pages were cited.
    pub first_page: u32,
}

pub fn normalize_pages(chunks: &[RetrievedChunk], shift_zero_based: bool) -> PageCitations {
    let mut metadata_pages = BTreeSet::new();
    let mut literal_pages = BTreeSet::new();

    for chunk in chunks {
        match chunk.page {
            Some(page) => {
                metadata_pages.insert(page);
            }
            None => {
                literal_pages.insert(page_from_text(&chunk.text).unwrap_or(1));
            }
        }
    }

    let shift = shift_zero_based && metadata_pages.first() == Some(&0);

    let mut pages: BTreeSet<u32> = metadata_pages
        .into_iter()
        .map(|p| if shift { p + 1 } else { p })
        .collect();
    pages.extend(literal_pages);

    let pages: Vec<u32> = pages.into_iter().collect();
    let first_page = pages.first().copied().unwrap_or(1);
    PageCitations { pages, first_page }
}

/// Recover a page number from a `Page <n>` marker in the chunk body.
/// Numbers found this way were printed for humans and are taken as 1-based.
fn page_from_text(text: &str) -> Option<u32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bpage\s+(\d{1,6})\b").expect("static regex")
    });
    re.captures(text)
        .and_then(|captures| captures[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, page: Option<u32>) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            page,
            distance: 0.0,
        }
    }

    #[test]
    fn zero_based_set_is_shifted_wholesale() {
        let chunks = vec![
            chunk("a", Some(0)),
            chunk("b", Some(2)),
            chunk("c", Some(4)),
        ];
        let citations = normalize_pages(&chunks, true);
        assert_eq!(citations.pages, vec![1, 3, 5]);
        assert_eq!(citations.first_page, 1);
    }

    #[test]
    fn one_based_set_is_left_alone() {
        let chunks = vec![chunk("a", Some(1)), chunk("b", Some(3))];
        let citations = normalize_pages(&chunks, true);
        assert_eq!(citations.pages, vec![1, 3]);
        assert_eq!(citations.first_page, 1);
    }

    #[test]
    fn duplicates_collapse() {
        let chunks = vec![chunk("a", Some(3)), chunk("b", Some(3)), chunk("c", Some(1))];
        let citations = normalize_pages(&chunks, true);
        assert_eq!(citations.pages, vec![1, 3]);
    }

    #[test]
    fn text_fallback_is_not_shifted() {
        let chunks = vec![chunk("See Page 42 for anchor bolt spacing.", None)];
        let citations = normalize_pages(&chunks, true);
        assert_eq!(citations.pages, vec![42]);
        assert_eq!(citations.first_page, 42);
    }

    #[test]
    fn text_fallback_is_case_insensitive() {
        let chunks = vec![chunk("continued from PAGE 7", None)];
        assert_eq!(normalize_pages(&chunks, true).pages, vec![7]);
    }

    #[test]
    fn unrecoverable_chunk_defaults_to_page_one() {
        let chunks = vec![chunk("no marker anywhere in this text", None)];
        let citations = normalize_pages(&chunks, true);
        assert_eq!(citations.pages, vec![1]);
        assert_eq!(citations.first_page, 1);
    }

    #[test]
    fn shift_does_not_touch_fallback_values() {
        // Metadata set {0, 1} is shifted to {1, 2}; the fallback 42 rides
        // along unshifted.
        let chunks = vec![
            chunk("a", Some(0)),
            chunk("b", Some(1)),
            chunk("see Page 42", None),
        ];
        let citations = normalize_pages(&chunks, true);
        assert_eq!(citations.pages, vec![1, 2, 42]);
    }

    #[test]
    fn shift_can_be_disabled() {
        let chunks = vec![chunk("a", Some(0)), chunk("b", Some(2))];
        let citations = normalize_pages(&chunks, false);
        assert_eq!(citations.pages, vec![0, 2]);
        assert_eq!(citations.first_page, 0);
    }

    #[test]
    fn empty_input_anchors_to_page_one() {
        let citations = normalize_pages(&[], true);
        assert!(citations.pages.is_empty());
        assert_eq!(citations.first_page, 1);
    }
}
