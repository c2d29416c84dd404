//! Filesystem-based chapter store backend.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

use folio_types::ChapterRecord;

use crate::error::{Result, StoreError};
use crate::traits::{ChapterStore, OnExist};

/// Chapter store writing one JSON file per chapter.
///
/// Directory layout, rooted at the book's raw data directory:
/// ```text
/// raw/<site>/<book_id>/
/// +-- <namespace>/
///     +-- <chapter_id>.json
/// ```
///
/// The id set is scanned once at open; saves accumulate in a pending
/// batch and hit the disk every `batch_size` records (or on `flush`).
/// Crashing between commits loses only the current batch.
pub struct FilesystemStore {
    dir: PathBuf,
    namespace: String,
    batch_size: usize,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    existing_ids: HashSet<String>,
    pending: Vec<ChapterRecord>,
    closed: bool,
}

impl FilesystemStore {
    /// Open (creating if needed) the `namespace` store under `raw_base`.
    pub async fn open(
        raw_base: impl AsRef<Path>,
        namespace: impl Into<String>,
        batch_size: usize,
    ) -> Result<Self> {
        let namespace = namespace.into();
        let dir = raw_base.as_ref().join(&namespace);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::OpenFailed {
                namespace: namespace.clone(),
                source: Some(eyre::eyre!(e)),
            })?;

        let mut existing_ids = HashSet::new();
        let mut entries = fs::read_dir(&dir).await.map_err(|e| StoreError::OpenFailed {
            namespace: namespace.clone(),
            source: Some(eyre::eyre!(e)),
        })?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    existing_ids.insert(stem.to_string());
                }
            }
        }

        Ok(Self {
            dir,
            namespace,
            batch_size: batch_size.max(1),
            state: Mutex::new(State {
                existing_ids,
                ..Default::default()
            }),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn chapter_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Write out every pending record. Ids that fail to persist are
    /// dropped from the id set; the first error is surfaced after the
    /// whole batch has been attempted.
    async fn commit(&self, state: &mut State) -> Result<()> {
        let mut first_err = None;
        for record in state.pending.drain(..).collect::<Vec<_>>() {
            let bytes = match serde_json::to_vec_pretty(&record) {
                Ok(bytes) => bytes,
                Err(e) => {
                    state.existing_ids.remove(&record.id);
                    first_err.get_or_insert(StoreError::InvalidChapterData {
                        id: record.id.clone(),
                        source: Some(eyre::eyre!(e)),
                    });
                    continue;
                }
            };
            if let Err(e) = fs::write(self.chapter_path(&record.id), bytes).await {
                state.existing_ids.remove(&record.id);
                first_err.get_or_insert(StoreError::ChapterIo {
                    operation: "write",
                    id: record.id.clone(),
                    source: Some(eyre::eyre!(e)),
                });
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn stage(&self, state: &mut State, record: ChapterRecord, on_exist: OnExist) {
        if on_exist == OnExist::Skip && state.existing_ids.contains(&record.id) {
            return;
        }
        state.pending.retain(|p| p.id != record.id);
        state.existing_ids.insert(record.id.clone());
        state.pending.push(record);
    }
}

#[async_trait]
impl ChapterStore for FilesystemStore {
    async fn exists(&self, id: &str) -> bool {
        self.state.lock().await.existing_ids.contains(id)
    }

    async fn save(&self, record: ChapterRecord, on_exist: OnExist) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(StoreError::Closed);
        }
        self.stage(&mut state, record, on_exist);
        if state.pending.len() >= self.batch_size {
            self.commit(&mut state).await?;
        }
        Ok(())
    }

    async fn save_many(&self, records: Vec<ChapterRecord>, on_exist: OnExist) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(StoreError::Closed);
        }
        for record in records {
            self.stage(&mut state, record, on_exist);
        }
        self.commit(&mut state).await
    }

    async fn get(&self, id: &str) -> Result<Option<ChapterRecord>> {
        let state = self.state.lock().await;
        if let Some(pending) = state.pending.iter().find(|p| p.id == id) {
            return Ok(Some(pending.clone()));
        }
        if !state.existing_ids.contains(id) {
            return Ok(None);
        }
        drop(state);

        let raw = fs::read(self.chapter_path(id))
            .await
            .map_err(|e| StoreError::ChapterIo {
                operation: "read",
                id: id.to_string(),
                source: Some(eyre::eyre!(e)),
            })?;
        let record =
            serde_json::from_slice(&raw).map_err(|e| StoreError::InvalidChapterData {
                id: id.to_string(),
                source: Some(eyre::eyre!(e)),
            })?;
        Ok(Some(record))
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        let mut ids: Vec<String> = state.existing_ids.iter().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.lock().await.existing_ids.len())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.existing_ids.remove(id) {
            return Ok(false);
        }
        let was_pending = {
            let before = state.pending.len();
            state.pending.retain(|p| p.id != id);
            state.pending.len() != before
        };
        drop(state);

        match fs::remove_file(self.chapter_path(id)).await {
            Ok(()) => Ok(true),
            // Only staged, never committed.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && was_pending => Ok(true),
            Err(e) => Err(StoreError::ChapterIo {
                operation: "delete",
                id: id.to_string(),
                source: Some(eyre::eyre!(e)),
            }),
        }
    }

    async fn flush(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.pending.is_empty() {
            return Ok(());
        }
        self.commit(&mut state).await
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        let flush_result = self.commit(&mut state).await;
        state.closed = true;
        if let Err(e) = &flush_result {
            warn!(namespace = %self.namespace, error = %e, "final flush failed on close");
        }
        flush_result
    }
}
