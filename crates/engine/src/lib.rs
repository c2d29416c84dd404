//! Download pipeline core for multi-site novel acquisition.
//!
//! Given a book id on a supported site, the engine refreshes the book's
//! metadata, runs every chapter through a staged fetch → parse → store
//! pipeline, and repairs catalog entries with missing chapter ids by
//! chaining from their predecessors. Per-site behavior is supplied through
//! the [`Fetcher`] and [`Parser`] contracts; persistence goes through the
//! `folio_storage` chapter store.

pub mod book_info;
pub mod cookies;
pub mod error;
pub mod fetcher;
pub mod limiter;
pub mod parser;
pub mod pipeline;
pub mod queue;
pub mod session;
pub mod time;

mod tasks;

pub use error::SessionError;
pub use fetcher::Fetcher;
pub use limiter::RateLimiter;
pub use parser::Parser;
pub use pipeline::{DownloadOptions, Downloader, ProgressHook};
pub use queue::TaskQueue;
pub use session::SessionClient;
