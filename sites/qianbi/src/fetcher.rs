//! Session fetcher for www.23qb.com.

use async_trait::async_trait;
use eyre::Result;
use tracing::warn;

use folio_engine::{Fetcher, SessionClient};
use folio_types::FetcherConfig;

const BOOK_INFO_URL: &str = "https://www.23qb.com/book/{book_id}/";
const BOOK_CATALOG_URL: &str = "https://www.23qb.com/book/{book_id}/catalog";
const CHAPTER_URL: &str = "https://www.23qb.com/book/{book_id}/{chapter_id}.html";

pub struct QianbiFetcher {
    session: SessionClient,
}

impl QianbiFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        Ok(Self {
            session: SessionClient::new(crate::SITE, config)?,
        })
    }

    fn book_info_url(book_id: &str) -> String {
        BOOK_INFO_URL.replace("{book_id}", book_id)
    }

    fn book_catalog_url(book_id: &str) -> String {
        BOOK_CATALOG_URL.replace("{book_id}", book_id)
    }

    fn chapter_url(book_id: &str, chapter_id: &str) -> String {
        CHAPTER_URL
            .replace("{book_id}", book_id)
            .replace("{chapter_id}", chapter_id)
    }
}

#[async_trait]
impl Fetcher for QianbiFetcher {
    /// Returns `[info, catalog]`. A page that cannot be fetched becomes an
    /// empty string so the parser can still work with the other one.
    async fn get_book_info(&self, book_id: &str) -> Result<Vec<String>> {
        let mut pages = Vec::with_capacity(2);
        for url in [
            Self::book_info_url(book_id),
            Self::book_catalog_url(book_id),
        ] {
            match self.session.fetch(&url).await {
                Ok(html) => pages.push(html),
                Err(e) => {
                    warn!(book_id, %url, error = %e, "book info page fetch failed");
                    pages.push(String::new());
                }
            }
        }
        Ok(pages)
    }

    async fn get_book_chapter(&self, book_id: &str, chapter_id: &str) -> Result<Vec<String>> {
        let url = Self::chapter_url(book_id, chapter_id);
        Ok(vec![self.session.fetch(&url).await?])
    }
}
