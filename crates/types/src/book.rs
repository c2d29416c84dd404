//! Book metadata as persisted in `book_info.json`.

use serde::{Deserialize, Serialize};

/// Canonical metadata for one book, refreshed from the source site and
/// persisted under `raw/<site>/<book_id>/book_info.json`.
///
/// Chapter order within a volume is the reading order. A chapter entry may
/// lack its `chapterId`; the pipeline fills those in through chain repair
/// and rewrites this file at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookInfo {
    #[serde(default)]
    pub book_name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub cover_url: String,
    /// `YYYY-MM-DD HH:MM:SS` in the source site's local time (UTC+8).
    #[serde(default)]
    pub update_time: String,
    #[serde(default)]
    pub serial_status: String,
    #[serde(default)]
    pub word_count: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

impl BookInfo {
    /// Total number of chapter entries across all volumes.
    pub fn total_chapters(&self) -> usize {
        self.volumes.iter().map(|v| v.chapters.len()).sum()
    }

    pub fn chapter(&self, vol_idx: usize, chap_idx: usize) -> Option<&ChapterEntry> {
        self.volumes.get(vol_idx)?.chapters.get(chap_idx)
    }

    /// Fill in the `chapterId` of one chapter slot. Returns `false` when the
    /// indices do not address an existing entry.
    pub fn set_chapter_id(&mut self, vol_idx: usize, chap_idx: usize, cid: &str) -> bool {
        match self
            .volumes
            .get_mut(vol_idx)
            .and_then(|v| v.chapters.get_mut(chap_idx))
        {
            Some(entry) => {
                entry.chapter_id = Some(cid.to_string());
                true
            }
            None => false,
        }
    }
}

/// One volume of a book, holding its chapters in reading order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    #[serde(default)]
    pub volume_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_intro: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_cover: Option<String>,
    #[serde(default)]
    pub chapters: Vec<ChapterEntry>,
}

/// A table-of-contents entry. `chapter_id` may be absent when the catalog
/// hides it (locked or very recent chapters on some sites).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterEntry {
    #[serde(rename = "chapterId", default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
