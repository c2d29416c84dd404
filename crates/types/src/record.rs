//! Parsed chapter records as stored in the chapter store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A fully parsed chapter, keyed by its site chapter id.
///
/// `extra` carries site-specific metadata alongside the text. Keys the
/// pipeline itself understands are `next_chapter_id` (chain repair) and
/// `encrypted` (routes the record to the encrypted namespace); sites are
/// free to add others such as `word_count`, `updated_at`, `volume` or
/// `seq`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl ChapterRecord {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            extra: Map::new(),
        }
    }

    /// Builder-style insertion into `extra`.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// The successor chapter id recorded by the parser, if any.
    ///
    /// Empty strings count as absent; sites emit `""` for the last chapter.
    pub fn next_chapter_id(&self) -> Option<&str> {
        self.extra
            .get("next_chapter_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn is_encrypted(&self) -> bool {
        self.extra
            .get("encrypted")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
