use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;

use crate::domain::repositories::page::{PageData, PageRepository, PageRepositoryError};

pub struct PageRepositoryImpl {
    client: reqwest::Client,
}

impl PageRepositoryImpl {
    pub fn new(read_timeout: Duration) -> Result<Self, PageRepositoryError> {
        let client = reqwest::Client::builder()
            .read_timeout(read_timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PageRepository for PageRepositoryImpl {
    async fn fetch_page_from_url(&self, url: &str) -> Result<PageData, PageRepositoryError> {
        let response = self.client.get(url).send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let data = response
            .bytes_stream()
            .map_err(PageRepositoryError::from)
            .boxed();

        Ok(PageData { content_type, data })
    }
}
