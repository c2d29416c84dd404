//! Loading and refreshing `book_info.json`.

use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};

use folio_types::BookInfo;

use crate::fetcher::Fetcher;
use crate::parser::Parser;
use crate::time::days_since_update;

/// Cached info older than this many days is refreshed from the site.
const MAX_INFO_AGE_DAYS: i64 = 1;

/// Read a previously persisted `book_info.json`, if any.
pub async fn load_cached(info_path: &Path) -> Option<BookInfo> {
    let raw = fs::read_to_string(info_path).await.ok()?;
    match serde_json::from_str(&raw) {
        Ok(info) => Some(info),
        Err(e) => {
            warn!(path = %info_path.display(), error = %e, "unreadable book info, will re-fetch");
            None
        }
    }
}

/// Persist book info, creating parent directories as needed.
pub async fn save_book_info(info_path: &Path, info: &BookInfo) -> eyre::Result<()> {
    if let Some(parent) = info_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(info_path, serde_json::to_vec_pretty(info)?).await?;
    Ok(())
}

/// Return up-to-date book info for `book_id`.
///
/// A cached copy whose `update_time` is at most one day old (source
/// timezone, UTC+8) is used as-is; otherwise the info pages are
/// re-fetched and re-parsed, with the raw pages optionally dumped to
/// `html_dir`. A fetch or parse failure falls back to the cached copy
/// (or an empty stub that is never persisted), so stale metadata is
/// preferred over destroying it.
pub async fn load_or_refresh(
    fetcher: &dyn Fetcher,
    parser: &dyn Parser,
    book_id: &str,
    info_path: &Path,
    html_dir: Option<&Path>,
) -> BookInfo {
    let cached = load_cached(info_path).await;

    if let Some(info) = &cached {
        let age = days_since_update(&info.update_time);
        if age.is_some_and(|days| days <= MAX_INFO_AGE_DAYS) {
            debug!(book_id, "using cached book info");
            return info.clone();
        }
    }

    let pages = match fetcher.get_book_info(book_id).await {
        Ok(pages) => pages,
        Err(e) => {
            warn!(book_id, error = %e, "book info fetch failed, keeping cached copy");
            return cached.unwrap_or_default();
        }
    };

    if let Some(dir) = html_dir {
        dump_pages(dir, &pages).await;
    }

    match parser.parse_book_info(&pages) {
        Some(info) => {
            if let Err(e) = save_book_info(info_path, &info).await {
                warn!(book_id, error = %e, "failed to persist book info");
            }
            info
        }
        None => {
            warn!(book_id, "book info not found on site, keeping cached copy");
            cached.unwrap_or_default()
        }
    }
}

async fn dump_pages(dir: &Path, pages: &[String]) {
    if let Err(e) = fs::create_dir_all(dir).await {
        warn!(dir = %dir.display(), error = %e, "failed to create html cache dir");
        return;
    }
    for (i, html) in pages.iter().enumerate() {
        let path = dir.join(format!("info_{i}.html"));
        if let Err(e) = fs::write(&path, html).await {
            warn!(path = %path.display(), error = %e, "failed to dump info page");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{Days, FixedOffset, Utc};
    use folio_types::{ChapterRecord, Volume};

    use super::*;

    #[derive(Default)]
    struct StubFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn get_book_info(&self, _book_id: &str) -> eyre::Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                eyre::bail!("network down");
            }
            Ok(vec!["<html>info</html>".to_string()])
        }

        async fn get_book_chapter(&self, _: &str, _: &str) -> eyre::Result<Vec<String>> {
            unreachable!("not used here")
        }
    }

    struct StubParser {
        found: bool,
    }

    impl Parser for StubParser {
        fn parse_book_info(&self, _html_list: &[String]) -> Option<BookInfo> {
            self.found.then(|| BookInfo {
                book_name: "Fresh".into(),
                update_time: recent_timestamp(0),
                volumes: vec![Volume::default()],
                ..Default::default()
            })
        }

        fn parse_chapter(&self, _: &[String], _: &str) -> Option<ChapterRecord> {
            unreachable!("not used here")
        }
    }

    fn recent_timestamp(days_ago: u64) -> String {
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        Utc::now()
            .checked_sub_days(Days::new(days_ago))
            .unwrap()
            .with_timezone(&tz)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    fn cached_info(days_ago: u64) -> BookInfo {
        BookInfo {
            book_name: "Cached".into(),
            update_time: recent_timestamp(days_ago),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fresh_cache_short_circuits_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book_info.json");
        save_book_info(&path, &cached_info(0)).await.unwrap();

        let fetcher = StubFetcher::default();
        let info =
            load_or_refresh(&fetcher, &StubParser { found: true }, "1", &path, None).await;
        assert_eq!(info.book_name, "Cached");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_cache_is_refreshed_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book_info.json");
        save_book_info(&path, &cached_info(5)).await.unwrap();

        let fetcher = StubFetcher::default();
        let info =
            load_or_refresh(&fetcher, &StubParser { found: true }, "1", &path, None).await;
        assert_eq!(info.book_name, "Fresh");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(load_cached(&path).await.unwrap().book_name, "Fresh");
    }

    #[tokio::test]
    async fn not_found_keeps_previous_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book_info.json");
        save_book_info(&path, &cached_info(5)).await.unwrap();

        let info = load_or_refresh(
            &StubFetcher::default(),
            &StubParser { found: false },
            "1",
            &path,
            None,
        )
        .await;
        assert_eq!(info.book_name, "Cached");
        // The stub must not clobber the cached file either.
        assert_eq!(load_cached(&path).await.unwrap().book_name, "Cached");
    }

    #[tokio::test]
    async fn fetch_failure_without_cache_yields_stub() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book_info.json");

        let fetcher = StubFetcher {
            fail: true,
            ..Default::default()
        };
        let info = load_or_refresh(&fetcher, &StubParser { found: true }, "1", &path, None).await;
        assert_eq!(info, BookInfo::default());
        assert!(load_cached(&path).await.is_none());
    }

    #[tokio::test]
    async fn save_html_dumps_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book_info.json");
        let html_dir = dir.path().join("html");

        load_or_refresh(
            &StubFetcher::default(),
            &StubParser { found: true },
            "1",
            &path,
            Some(&html_dir),
        )
        .await;
        assert!(html_dir.join("info_0.html").exists());
    }
}
