use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageRepositoryError {
    #[error("error request page: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("other error: {0}")]
    Other(String),
}

pub type PageStream = BoxStream<'static, Result<Bytes, PageRepositoryError>>;

/// One fetched page: the response content type and its byte stream.
pub struct PageData {
    pub content_type: String,
    pub data: PageStream,
}

#[async_trait]
pub trait PageRepository: Send + Sync {
    async fn fetch_page_from_url(&self, url: &str) -> Result<PageData, PageRepositoryError>;
}
