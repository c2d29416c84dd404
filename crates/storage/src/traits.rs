//! Trait definition for the chapter store.

use async_trait::async_trait;

use folio_types::ChapterRecord;

use crate::error::Result;

/// What to do when saving a chapter whose id is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnExist {
    /// Replace the stored record.
    #[default]
    Overwrite,
    /// Keep the stored record; the save still reports success.
    Skip,
}

/// Persistent store of parsed chapters, keyed by chapter id.
///
/// One store instance covers one namespace of one book (`chapters` or
/// `encrypted_chapters`). The pipeline's storage worker is the single
/// writer; reads issued by the same worker observe records still sitting
/// in the pending batch. Backends may be anything that supports batched
/// upserts.
#[async_trait]
pub trait ChapterStore: Send + Sync {
    /// O(1) check against the in-memory id set populated at open.
    async fn exists(&self, id: &str) -> bool;

    /// Save one chapter record.
    ///
    /// Commits are batched: records accumulate until `batch_size` of them
    /// are pending, then they are written out together. A record that
    /// fails to persist is surfaced as an error and dropped from the id
    /// set; the store stays usable.
    async fn save(&self, record: ChapterRecord, on_exist: OnExist) -> Result<()>;

    /// Save several records, committed together at the batch boundary.
    async fn save_many(&self, records: Vec<ChapterRecord>, on_exist: OnExist) -> Result<()>;

    /// Retrieve a chapter by id, or `None` when it was never stored.
    async fn get(&self, id: &str) -> Result<Option<ChapterRecord>>;

    /// All stored chapter ids, in unspecified order.
    async fn list_ids(&self) -> Result<Vec<String>>;

    async fn count(&self) -> Result<usize>;

    /// Delete a chapter by id. Returns `false` when it did not exist.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Force out any pending records (< batch_size) immediately.
    async fn flush(&self) -> Result<()>;

    /// Flush and close. Idempotent; later writes fail with `Closed`.
    async fn close(&self) -> Result<()>;
}
