//! The per-site parser contract.

use folio_types::{BookInfo, ChapterRecord};

/// Pure CPU transform from raw site pages to structured records.
///
/// Parsers run on the blocking thread pool, so implementations must be
/// `Send + Sync` and deterministic for a given input: cached resources
/// (fonts, OCR models) are fine, mutable state observable between calls
/// is not.
pub trait Parser: Send + Sync {
    /// Extract book metadata and the volume/chapter table of contents.
    ///
    /// `None` means the pages did not describe a book (deleted, region
    /// locked, bot wall); the caller then keeps any previously cached
    /// metadata.
    fn parse_book_info(&self, html_list: &[String]) -> Option<BookInfo>;

    /// Extract one chapter. `None` (or empty content) marks the page as
    /// unparseable and triggers a pipeline retry for the same chapter id.
    fn parse_chapter(&self, html_list: &[String], chapter_id: &str) -> Option<ChapterRecord>;
}
