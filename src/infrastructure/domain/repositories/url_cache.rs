use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{
    domain::repositories::url_cache::{UrlCacheRepository, UrlCacheRepositoryError},
    utils,
};

/// Disk cache of resolved page-url lists, one JSON file per chapter url.
pub struct UrlCacheRepositoryImpl {
    cache_dir: PathBuf,
}

impl UrlCacheRepositoryImpl {
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Self {
        Self {
            cache_dir: PathBuf::new().join(cache_dir),
        }
    }

    fn entry_path(&self, chapter_url: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{:016x}.json", utils::url_hash(chapter_url)))
    }
}

#[async_trait]
impl UrlCacheRepository for UrlCacheRepositoryImpl {
    async fn get(&self, chapter_url: &str) -> Result<Vec<String>, UrlCacheRepositoryError> {
        let bytes = tokio::fs::read(self.entry_path(chapter_url)).await?;

        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn set(
        &self,
        chapter_url: &str,
        page_urls: &[String],
    ) -> Result<(), UrlCacheRepositoryError> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;

        let bytes = serde_json::to_vec(page_urls)?;
        tokio::fs::write(self.entry_path(chapter_url), bytes).await?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get_returns_urls() {
        let dir = tempfile::tempdir().unwrap();
        let cache = UrlCacheRepositoryImpl::new(dir.path().join("urls"));

        let urls = vec![
            "https://example.com/page/1".to_string(),
            "https://example.com/page/2".to_string(),
        ];
        cache
            .set("https://example.com/chapter/1", &urls)
            .await
            .unwrap();

        let cached = cache.get("https://example.com/chapter/1").await.unwrap();
        assert_eq!(cached, urls);
    }

    #[tokio::test]
    async fn test_get_errors_on_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = UrlCacheRepositoryImpl::new(dir.path());

        assert!(cache.get("https://example.com/unknown").await.is_err());
    }
}
