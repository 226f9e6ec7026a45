use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort the whole run. Everything else is downgraded to a
/// reported per-entry status and the run keeps going.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),
    #[error("remote kept rate-limiting after {0} attempts")]
    RateLimitExceeded(usize),
    #[error("downloaded file failed verification: {0}")]
    CorruptDownload(PathBuf),
    #[error("cache file unreadable: {0}")]
    CacheUnreadable(PathBuf),
}
