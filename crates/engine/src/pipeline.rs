//! The download orchestrator.
//!
//! One [`Downloader`] covers one site. Each `download` call runs a book
//! through four staged queues: chapter ids are fetched into raw HTML,
//! parsed off the async scheduler into chapter records, and stored by a
//! single writer that also drives chain repair for catalog entries with
//! missing chapter ids.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use folio_storage::{ChapterStore, FilesystemStore, OnExist, StoreError};
use folio_types::{BookConfig, BookInfo, ChapterRecord, DownloaderConfig};

use crate::book_info;
use crate::cookies::resolve_cookies;
use crate::fetcher::Fetcher;
use crate::parser::Parser;
use crate::queue::TaskQueue;
use crate::tasks::{CidTask, HtmlTask, RestoreTask};
use crate::time::sleep_with_random_delay;

/// Progress callback, invoked as `(completed, total)` under the storage
/// worker and the enqueue loop. Implementations must not block; dispatch
/// to your own executor if you need to.
pub type ProgressHook = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Per-invocation options for [`Downloader::download`].
#[derive(Clone, Default)]
pub struct DownloadOptions {
    pub progress_hook: Option<ProgressHook>,
    /// External cancellation signal. The enqueue loop stops producing and
    /// workers exit at their next suspension point; a final flush is
    /// still attempted.
    pub cancel: CancellationToken,
}

/// End-to-end download pipeline for one site.
pub struct Downloader {
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn Parser>,
    config: DownloaderConfig,
    site: String,
    raw_data_dir: PathBuf,
    cache_dir: PathBuf,
}

impl Downloader {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        parser: Arc<dyn Parser>,
        config: DownloaderConfig,
        site: impl Into<String>,
    ) -> Self {
        let site = site.into();
        let raw_data_dir = config.raw_data_dir.join(&site);
        let cache_dir = config.cache_dir.join(&site);
        Self {
            fetcher,
            parser,
            config,
            site,
            raw_data_dir,
            cache_dir,
        }
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Download a single book. Per-chapter failures are retried and
    /// logged inside the pipeline; a failed login skips the book without
    /// starting any workers.
    pub async fn download(&self, book: &BookConfig, options: &DownloadOptions) {
        if !self.ensure_ready().await {
            warn!(
                site = %self.site,
                book_id = %book.book_id,
                "login failed, skipping download of book"
            );
            self.finalize().await;
            return;
        }

        if let Err(e) = self.download_one(book, options).await {
            warn!(
                site = %self.site,
                book_id = %book.book_id,
                start = book.start_id.as_deref().unwrap_or("-"),
                end = book.end_id.as_deref().unwrap_or("-"),
                error = %e,
                "failed to download book"
            );
        }

        self.finalize().await;
    }

    /// Download several books, isolating per-book failures.
    pub async fn download_many(&self, books: &[BookConfig], options: &DownloadOptions) {
        if !self.ensure_ready().await {
            let ids = books
                .iter()
                .map(|b| b.book_id.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            warn!(
                site = %self.site,
                books = %ids,
                "login failed, skipping download of books"
            );
            self.finalize().await;
            return;
        }

        for book in books {
            if options.cancel.is_cancelled() {
                break;
            }
            if let Err(e) = self.download_one(book, options).await {
                warn!(
                    site = %self.site,
                    book_id = %book.book_id,
                    error = %e,
                    "failed to download book"
                );
            }
        }

        self.finalize().await;
    }

    /// Pre-download hook: initialize the fetcher and, when required,
    /// restore or establish a login.
    async fn ensure_ready(&self) -> bool {
        if let Err(e) = self.fetcher.init().await {
            warn!(site = %self.site, error = %e, "fetcher init failed");
            return false;
        }
        if !self.config.login_required {
            return true;
        }
        if self.fetcher.load_state().await {
            return true;
        }
        let cookies = resolve_cookies(&self.config.cookies);
        self.fetcher
            .login(&self.config.username, &self.config.password, &cookies, 1)
            .await;
        self.fetcher.is_logged_in()
    }

    /// Post-download hook: persist session state and release the fetcher.
    async fn finalize(&self) {
        if self.fetcher.is_logged_in() && !self.fetcher.save_state().await {
            warn!(site = %self.site, "failed to persist session state");
        }
        if let Err(e) = self.fetcher.close().await {
            warn!(site = %self.site, error = %e, "fetcher close failed");
        }
    }

    async fn download_one(&self, book: &BookConfig, options: &DownloadOptions) -> eyre::Result<()> {
        let book_id = &book.book_id;
        let raw_base = self.raw_data_dir.join(book_id);
        let info_path = raw_base.join("book_info.json");
        let html_dir = self.cache_dir.join(book_id).join("html");

        tokio::fs::create_dir_all(&raw_base).await?;

        let store: Arc<dyn ChapterStore> = Arc::new(
            FilesystemStore::open(&raw_base, "chapters", self.config.storage_batch_size).await?,
        );

        let html_dump = self.config.save_html.then_some(html_dir.as_path());
        let info = book_info::load_or_refresh(
            self.fetcher.as_ref(),
            self.parser.as_ref(),
            book_id,
            &info_path,
            html_dump,
        )
        .await;

        let total = info.total_chapters();
        if total == 0 {
            warn!(%book_id, "book has no chapters to download");
            return Ok(());
        }

        // Snapshot the plan before handing book_info to the storage
        // worker, the sole mutator from here on.
        let plan: Vec<Vec<Option<String>>> = info
            .volumes
            .iter()
            .map(|v| v.chapters.iter().map(|c| c.chapter_id.clone()).collect())
            .collect();

        let run = Arc::new(Run {
            book_id: book_id.clone(),
            ignore_ids: book.ignore_ids.clone(),
            retry_times: self.config.retry_times,
            request_interval: self.config.request_interval,
            backoff_factor: self.config.backoff_factor,
            fetcher: self.fetcher.clone(),
            parser: self.parser.clone(),
            semaphore: Semaphore::new(self.config.download_workers.max(1)),
            cid_queue: TaskQueue::new(),
            restore_queue: TaskQueue::new(),
            html_queue: TaskQueue::new(),
            save_queue: TaskQueue::new(),
            store,
            encrypted_store: OnceCell::new(),
            raw_base: raw_base.clone(),
            storage_batch_size: self.config.storage_batch_size,
            save_html: self.config.save_html,
            html_dir: html_dir.clone(),
            book_info: Mutex::new(info),
            pending_restore: Mutex::new(HashMap::new()),
            completed: AtomicUsize::new(0),
            total,
            progress_hook: options.progress_hook.clone(),
        });

        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        for _ in 0..self.config.download_workers.max(1) {
            let run = run.clone();
            handles.push(tokio::spawn(async move { run.fetcher_worker().await }));
        }
        for worker_id in 0..self.config.parser_workers.max(1) {
            let run = run.clone();
            handles.push(tokio::spawn(
                async move { run.parser_worker(worker_id).await },
            ));
        }
        {
            let run = run.clone();
            handles.push(tokio::spawn(async move { run.storage_worker().await }));
        }

        self.enqueue_plan(book, &plan, &run, options).await;

        let drain = async {
            run.restore_queue.join().await;
            run.cid_queue.join().await;
            run.html_queue.join().await;
            run.save_queue.join().await;
        };
        tokio::select! {
            _ = drain => {}
            _ = options.cancel.cancelled() => {
                info!(%book_id, "download cancelled, shutting down");
            }
        }

        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }

        if let Err(e) = run.store.close().await {
            warn!(%book_id, error = %e, "chapter store close failed");
        }
        if let Some(encrypted) = run.encrypted_store.get() {
            if let Err(e) = encrypted.close().await {
                warn!(%book_id, error = %e, "encrypted chapter store close failed");
            }
        }

        for (prev_cid, rt) in run
            .pending_restore
            .lock()
            .expect("pending_restore poisoned")
            .iter()
        {
            warn!(
                %book_id,
                prev_cid = %prev_cid,
                vol = rt.vol_idx,
                chap = rt.chap_idx,
                "chapter chain never resolved, predecessor was not stored"
            );
        }

        let info = run.book_info.lock().expect("book_info poisoned").clone();
        book_info::save_book_info(&info_path, &info).await?;

        info!(%book_id, book_name = %info.book_name, "novel download completed");
        Ok(())
    }

    /// Walk the catalog in reading order and queue up the chapters the
    /// selection (`start_id`/`end_id`/`skip_existing`) leaves in play.
    async fn enqueue_plan(
        &self,
        book: &BookConfig,
        plan: &[Vec<Option<String>>],
        run: &Arc<Run>,
        options: &DownloadOptions,
    ) {
        let mut found_start = book.start_id.is_none();
        let mut stop_early = false;
        let mut last_cid: Option<String> = None;

        'volumes: for (vol_idx, chapters) in plan.iter().enumerate() {
            for (chap_idx, cid) in chapters.iter().enumerate() {
                if stop_early || options.cancel.is_cancelled() {
                    break 'volumes;
                }

                if !found_start {
                    if cid.is_some() && *cid == book.start_id {
                        found_start = true;
                    } else {
                        run.bump_progress();
                        last_cid = cid.clone();
                        continue;
                    }
                }

                if let (Some(end_id), Some(cid)) = (&book.end_id, cid.as_ref()) {
                    if end_id == cid {
                        stop_early = true;
                    }
                }

                if let Some(cid) = cid {
                    if !cid.is_empty()
                        && self.config.skip_existing
                        && run.store.exists(cid).await
                    {
                        run.bump_progress();
                        last_cid = Some(cid.clone());
                        continue;
                    }
                }

                run.cid_queue.put(CidTask {
                    prev_cid: last_cid.clone(),
                    cid: cid.clone(),
                    retry: 0,
                    vol_idx,
                    chap_idx,
                });
                last_cid = cid.clone();
            }
        }
    }
}

/// Everything one `download` invocation shares between its workers. No
/// state outlives the run.
struct Run {
    book_id: String,
    ignore_ids: HashSet<String>,
    retry_times: u32,
    request_interval: f64,
    backoff_factor: f64,
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn Parser>,
    /// Caps in-flight network calls, including between queue pop and send.
    semaphore: Semaphore,
    cid_queue: TaskQueue<CidTask>,
    restore_queue: TaskQueue<RestoreTask>,
    html_queue: TaskQueue<HtmlTask>,
    save_queue: TaskQueue<ChapterRecord>,
    store: Arc<dyn ChapterStore>,
    /// Opened on the first record carrying `extra.encrypted`.
    encrypted_store: OnceCell<Arc<dyn ChapterStore>>,
    raw_base: PathBuf,
    storage_batch_size: usize,
    save_html: bool,
    html_dir: PathBuf,
    book_info: Mutex<BookInfo>,
    pending_restore: Mutex<HashMap<String, RestoreTask>>,
    completed: AtomicUsize,
    total: usize,
    progress_hook: Option<ProgressHook>,
}

impl Run {
    fn bump_progress(&self) {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = &self.progress_hook {
            hook(done, self.total);
        }
    }

    async fn fetcher_worker(&self) {
        loop {
            let task = self.cid_queue.get().await;
            self.handle_cid_task(task).await;
            self.cid_queue.task_done();
        }
    }

    async fn handle_cid_task(&self, task: CidTask) {
        let cid = match task.cid.as_deref().filter(|c| !c.is_empty()) {
            Some(cid) => cid.to_string(),
            None => {
                match task.prev_cid.as_deref().filter(|c| !c.is_empty()) {
                    Some(prev_cid) => self.restore_queue.put(RestoreTask {
                        vol_idx: task.vol_idx,
                        chap_idx: task.chap_idx,
                        prev_cid: prev_cid.to_string(),
                    }),
                    None => warn!(
                        vol = task.vol_idx,
                        chap = task.chap_idx,
                        "dropping chapter slot with no id and no predecessor"
                    ),
                }
                return;
            }
        };

        if self.ignore_ids.contains(&cid) {
            return;
        }

        let fetched = match self.semaphore.acquire().await {
            Ok(_permit) => self.fetcher.get_book_chapter(&self.book_id, &cid).await,
            Err(_) => return,
        };

        match fetched {
            Ok(html_list) => {
                self.html_queue.put(HtmlTask {
                    cid: cid.clone(),
                    retry: task.retry,
                    html_list,
                    vol_idx: task.vol_idx,
                    chap_idx: task.chap_idx,
                });
                info!(cid = %cid, "downloaded chapter");
                sleep_with_random_delay(self.request_interval, 1.1, self.request_interval + 2.0)
                    .await;
            }
            Err(e) => {
                if task.retry < self.retry_times {
                    let retry = task.retry + 1;
                    self.cid_queue.put(CidTask {
                        prev_cid: task.prev_cid.clone(),
                        cid: Some(cid.clone()),
                        retry,
                        vol_idx: task.vol_idx,
                        chap_idx: task.chap_idx,
                    });
                    info!(cid = %cid, retry, error = %e, "re-queued chapter for retry");
                    let backoff = self.backoff_factor * 2f64.powi(task.retry as i32);
                    sleep_with_random_delay(backoff, 1.2, backoff + 3.0).await;
                } else {
                    warn!(cid = %cid, error = %e, "max retries reached for chapter");
                }
            }
        }
    }

    async fn parser_worker(&self, worker_id: usize) {
        loop {
            let task = self.html_queue.get().await;
            self.handle_html_task(worker_id, task).await;
            self.html_queue.task_done();
        }
    }

    async fn handle_html_task(&self, worker_id: usize, task: HtmlTask) {
        let parser = self.parser.clone();
        let html_list = task.html_list.clone();
        let cid = task.cid.clone();
        let parsed =
            tokio::task::spawn_blocking(move || parser.parse_chapter(&html_list, &cid)).await;

        match parsed {
            Ok(Some(record)) if !record.content.is_empty() => {
                debug!(worker_id, cid = %task.cid, "parsed chapter");
                if self.save_html {
                    self.dump_chapter_html(&task, record.is_encrypted()).await;
                }
                self.save_queue.put(record);
            }
            Ok(_) => self.requeue_parse(worker_id, &task, "empty parse result"),
            Err(e) => self.requeue_parse(worker_id, &task, &e.to_string()),
        }
    }

    /// Keep the raw page of a successfully parsed chapter for offline
    /// re-parsing, split by whether the content came in obfuscated.
    async fn dump_chapter_html(&self, task: &HtmlTask, encrypted: bool) {
        let Some(first_page) = task.html_list.first() else {
            return;
        };
        let folder = self
            .html_dir
            .join(if encrypted { "html_encrypted" } else { "html_plain" });
        if let Err(e) = tokio::fs::create_dir_all(&folder).await {
            warn!(error = %e, "failed to create html dump dir");
            return;
        }
        let path = folder.join(format!("{}.html", task.cid));
        if path.exists() {
            return;
        }
        if let Err(e) = tokio::fs::write(&path, first_page).await {
            warn!(cid = %task.cid, error = %e, "failed to dump chapter html");
        }
    }

    fn requeue_parse(&self, worker_id: usize, task: &HtmlTask, reason: &str) {
        if task.retry < self.retry_times {
            let retry = task.retry + 1;
            // prev_cid is cleared: the retry targets the same cid, chain
            // repair is orthogonal.
            self.cid_queue.put(CidTask {
                prev_cid: None,
                cid: Some(task.cid.clone()),
                retry,
                vol_idx: task.vol_idx,
                chap_idx: task.chap_idx,
            });
            info!(worker_id, cid = %task.cid, retry, reason, "re-queued chapter for re-parse");
        } else {
            warn!(worker_id, cid = %task.cid, reason, "max retries reached for chapter parse");
        }
    }

    async fn storage_worker(&self) {
        loop {
            tokio::select! {
                record = self.save_queue.get() => {
                    self.handle_save(record).await;
                    self.save_queue.task_done();
                }
                task = self.restore_queue.get() => {
                    self.handle_restore(task).await;
                    self.restore_queue.task_done();
                }
            }
        }
    }

    async fn handle_save(&self, record: ChapterRecord) {
        let target = match self.store_for(&record).await {
            Ok(store) => store,
            Err(e) => {
                error!(cid = %record.id, error = %e, "failed to open encrypted chapter store");
                return;
            }
        };
        if let Err(e) = target.save(record.clone(), OnExist::Overwrite).await {
            error!(cid = %record.id, error = %e, "failed to save chapter");
            return;
        }
        self.bump_progress();

        let resolved = self
            .pending_restore
            .lock()
            .expect("pending_restore poisoned")
            .remove(&record.id);
        if let Some(rt) = resolved {
            match record.next_chapter_id() {
                Some(next_cid) => self.chain_next(&rt, next_cid),
                None => warn!(
                    prev_cid = %record.id,
                    "cannot continue chapter chain, record has no successor id"
                ),
            }
        }
    }

    async fn handle_restore(&self, task: RestoreTask) {
        let prev = match self.store.get(&task.prev_cid).await {
            Ok(prev) => prev,
            Err(e) => {
                error!(prev_cid = %task.prev_cid, error = %e, "failed to read predecessor record");
                None
            }
        };
        let next_cid = prev
            .as_ref()
            .and_then(|p| p.next_chapter_id())
            .map(str::to_string);

        match next_cid {
            Some(next_cid) => self.chain_next(&task, &next_cid),
            None => {
                // Parked until the predecessor's record is stored.
                self.pending_restore
                    .lock()
                    .expect("pending_restore poisoned")
                    .insert(task.prev_cid.clone(), task);
            }
        }
    }

    fn chain_next(&self, task: &RestoreTask, next_cid: &str) {
        let updated = self
            .book_info
            .lock()
            .expect("book_info poisoned")
            .set_chapter_id(task.vol_idx, task.chap_idx, next_cid);
        if !updated {
            info!(
                vol = task.vol_idx,
                chap = task.chap_idx,
                "no catalog slot for repaired chapter id"
            );
        }
        self.cid_queue.put(CidTask {
            prev_cid: Some(task.prev_cid.clone()),
            cid: Some(next_cid.to_string()),
            retry: 0,
            vol_idx: task.vol_idx,
            chap_idx: task.chap_idx,
        });
    }

    async fn store_for(&self, record: &ChapterRecord) -> Result<Arc<dyn ChapterStore>, StoreError> {
        if !record.is_encrypted() {
            return Ok(self.store.clone());
        }
        let store = self
            .encrypted_store
            .get_or_try_init(|| async {
                FilesystemStore::open(&self.raw_base, "encrypted_chapters", self.storage_batch_size)
                    .await
                    .map(|s| Arc::new(s) as Arc<dyn ChapterStore>)
            })
            .await?;
        Ok(store.clone())
    }
}
