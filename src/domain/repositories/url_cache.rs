use async_trait::async_trait;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UrlCacheRepositoryError {
    #[error("io error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// Cache of resolved page-url lists keyed by chapter url. `get` errors on a
/// miss so callers fall back to the content source.
#[async_trait]
pub trait UrlCacheRepository: Send + Sync {
    async fn get(&self, chapter_url: &str) -> Result<Vec<String>, UrlCacheRepositoryError>;

    async fn set(
        &self,
        chapter_url: &str,
        page_urls: &[String],
    ) -> Result<(), UrlCacheRepositoryError>;
}
