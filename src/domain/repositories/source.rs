use async_trait::async_trait;

use thiserror::Error;

use crate::domain::entities::manga::SourceManga;

#[derive(Debug, Error)]
pub enum SourceRepositoryError {
    #[error("error request source: {0}")]
    RequestError(String),
    #[error("other error: {0}")]
    Other(String),
}

/// Content-source adapter boundary. Implementations turn a chapter url into
/// its ordered page urls and provide manga metadata; how they do that
/// (scraping, API calls, plugins) is outside the download core.
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// The ordered list of page urls for a chapter.
    async fn pull_page_urls(
        &self,
        source: &str,
        chapter_url: &str,
    ) -> Result<Vec<String>, SourceRepositoryError>;

    /// Metadata of the manga a chapter belongs to.
    async fn pull_manga(
        &self,
        source: &str,
        manga_url: &str,
    ) -> Result<SourceManga, SourceRepositoryError>;
}
