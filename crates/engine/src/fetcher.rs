//! The per-site fetcher contract.

use std::collections::HashMap;

use async_trait::async_trait;
use eyre::Result;

use folio_types::LoginField;

/// A per-site session able to fetch raw pages for book info and chapters
/// and to manage its authentication lifecycle.
///
/// Implementations are shared across the fetcher worker pool and must be
/// safe under `max_connections` concurrent [`get_book_chapter`] calls.
/// Transport-level retries, backoff and rate limiting are the fetcher's
/// responsibility (usually via [`SessionClient`](crate::SessionClient));
/// the pipeline's own retries cover higher-level failures such as an
/// empty parse.
///
/// [`get_book_chapter`]: Fetcher::get_book_chapter
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Set up network resources. Safe to call again after [`close`](Fetcher::close).
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Release network resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Attempt to authenticate, trying up to `attempt` times.
    ///
    /// Returns `true` iff the session ends up authenticated. The default
    /// implementation refuses; sites without logins never need one.
    async fn login(
        &self,
        _username: &str,
        _password: &str,
        _cookies: &HashMap<String, String>,
        _attempt: u32,
    ) -> bool {
        false
    }

    /// Restore persisted session state. Returns `true` when the restored
    /// state amounts to a live login.
    async fn load_state(&self) -> bool {
        false
    }

    /// Persist session state for future runs.
    async fn save_state(&self) -> bool {
        false
    }

    fn is_logged_in(&self) -> bool {
        false
    }

    /// Credential inputs this site's login flow accepts, for UIs.
    fn login_fields(&self) -> Vec<LoginField> {
        Vec::new()
    }

    /// Retrieve the authenticated user's bookcase page. Sites with user
    /// accounts override this.
    async fn get_bookcase(&self) -> Result<Vec<String>> {
        eyre::bail!("bookcase fetching is not supported by this session type")
    }

    /// Fetch the raw pages describing a book: info page, catalog, volume
    /// indices, whatever the site splits them into.
    async fn get_book_info(&self, book_id: &str) -> Result<Vec<String>>;

    /// Fetch the raw page(s) of a single chapter.
    async fn get_book_chapter(&self, book_id: &str, chapter_id: &str) -> Result<Vec<String>>;
}
