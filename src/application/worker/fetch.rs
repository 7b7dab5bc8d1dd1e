use std::{path::Path, sync::Arc};

use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{
        entities::download::{
            ChapterFlag, DownloadChapter, DownloadManga, DownloadPage, PageFlag,
        },
        repositories::{
            download::{DownloadRepository, DownloadRepositoryError},
            page::{PageRepository, PageRepositoryError, PageStream},
            source::{SourceRepository, SourceRepositoryError},
            url_cache::UrlCacheRepository,
        },
    },
    utils,
};

use super::downloads::{DownloadStateChanged, DownloadUpdateSender};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page list resolution failed: {0}")]
    Resolve(#[source] SourceRepositoryError),
    #[error("page fetch failed: {0}")]
    Fetch(#[source] PageRepositoryError),
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("persistence error: {0}")]
    Persistence(#[from] DownloadRepositoryError),
    #[error("cancelled")]
    Cancelled,
}

/// Drives a single chapter from its persisted state to completed or failed.
/// Pages already marked completed by an earlier, interrupted run are skipped,
/// so a resumed chapter only fetches what is missing.
pub struct ChapterFetcher<D, S, P, U> {
    download_repo: Arc<D>,
    source_repo: S,
    page_repo: P,
    url_cache: U,
    update_tx: DownloadUpdateSender,
}

impl<D, S, P, U> ChapterFetcher<D, S, P, U>
where
    D: DownloadRepository + 'static,
    S: SourceRepository + 'static,
    P: PageRepository + 'static,
    U: UrlCacheRepository + 'static,
{
    pub fn new(
        download_repo: Arc<D>,
        source_repo: S,
        page_repo: P,
        url_cache: U,
        update_tx: DownloadUpdateSender,
    ) -> Self {
        Self {
            download_repo,
            source_repo,
            page_repo,
            url_cache,
            update_tx,
        }
    }

    /// Runs the chapter to a terminal state. Errors are fully resolved into a
    /// flag and an update event here, they never reach the coordinator. A
    /// cancellation must not mark the chapter failed: the cancel handler has
    /// already deleted or repurposed the record.
    pub async fn run(&self, chapter: DownloadChapter, token: CancellationToken) {
        match self.fetch_chapter(&chapter, &token).await {
            Ok(()) => {}
            Err(FetchError::Cancelled) => {
                debug!("download of {} cancelled", chapter.url);
            }
            Err(e) if token.is_cancelled() => {
                debug!("download of {} aborted by cancel: {e}", chapter.url);
            }
            Err(e) => {
                error!("failed to download {}: {e}", chapter.url);
                let flag_result = self
                    .download_repo
                    .update_chapter_flag(chapter.id, ChapterFlag::Failed)
                    .await;
                if let Err(e) = flag_result {
                    error!("failed to mark {} as failed: {e}", chapter.url);
                }
                self.notify_update();
            }
        }
    }

    async fn fetch_chapter(
        &self,
        chapter: &DownloadChapter,
        token: &CancellationToken,
    ) -> Result<(), FetchError> {
        if token.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let mut pages = self.download_repo.select_chapter_pages(&chapter.url).await?;

        if pages.is_empty() {
            let records = self.resolve_pages(chapter).await?;
            self.download_repo
                .create_chapter_pages(chapter.id, &records)
                .await?;
            self.notify_update();

            pages = self.download_repo.select_chapter_pages(&chapter.url).await?;
        }

        for page in &pages {
            if token.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            if page.flag == PageFlag::Completed {
                continue;
            }

            let response = self
                .page_repo
                .fetch_page_from_url(&page.url)
                .await
                .map_err(FetchError::Fetch)?;

            // Re-check after the fetch: a cancelled chapter must not recreate
            // the directory the cancel handler just removed.
            if token.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let file_name = format!(
                "{}.{}",
                page.name,
                utils::content_subtype(&response.content_type)
            );
            save_stream_to_directory(response.data, &page.directory, &file_name).await?;

            self.download_repo
                .complete_page(page.id, chapter.id, page.rank + 1)
                .await?;
            self.notify_update();
        }

        self.finish_chapter(chapter).await?;
        self.notify_update();

        Ok(())
    }

    /// Page-url resolution, cache first.
    async fn resolve_pages(
        &self,
        chapter: &DownloadChapter,
    ) -> Result<Vec<DownloadPage>, FetchError> {
        let urls = match self.url_cache.get(&chapter.url).await {
            Ok(urls) => urls,
            Err(_) => {
                let urls = self
                    .source_repo
                    .pull_page_urls(&chapter.source, &chapter.url)
                    .await
                    .map_err(FetchError::Resolve)?;

                if let Err(e) = self.url_cache.set(&chapter.url, &urls).await {
                    warn!("failed to cache page list of {}: {e}", chapter.url);
                }

                urls
            }
        };

        let pages = urls
            .into_iter()
            .enumerate()
            .map(|(rank, url)| DownloadPage {
                id: 0,
                url,
                parent_url: chapter.url.clone(),
                name: format!("{:03}", rank + 1),
                directory: chapter.directory.clone(),
                rank: rank as i64,
                flag: PageFlag::Pending,
            })
            .collect();

        Ok(pages)
    }

    /// Completion check: once every page is done the page rows are reclaimed,
    /// the chapter is marked completed and the manga aggregate is created on
    /// first completion.
    async fn finish_chapter(&self, chapter: &DownloadChapter) -> Result<(), FetchError> {
        let Some(current) = self
            .download_repo
            .get_download_chapter(&chapter.source, &chapter.url)
            .await?
        else {
            return Ok(());
        };

        if current.current_page == 0
            || current.total_pages == 0
            || current.current_page != current.total_pages
        {
            return Ok(());
        }

        self.download_repo.complete_chapter(&current).await?;

        let existing = self
            .download_repo
            .get_download_manga(&current.source, &current.parent_url)
            .await?;
        if existing.is_none() {
            let manga = match self
                .source_repo
                .pull_manga(&current.source, &current.parent_url)
                .await
            {
                Ok(info) => DownloadManga {
                    id: 0,
                    source: current.source.clone(),
                    url: current.parent_url.clone(),
                    artist: info.artist,
                    author: info.author,
                    description: info.description,
                    genre: info.genre,
                    name: info.name,
                    completed: info.completed,
                    thumbnail_url: info.thumbnail_url,
                },
                Err(e) => {
                    warn!("failed to pull manga of {}: {e}", current.parent_url);
                    DownloadManga {
                        source: current.source.clone(),
                        url: current.parent_url.clone(),
                        ..Default::default()
                    }
                }
            };

            self.download_repo
                .insert_download_manga_if_missing(&manga)
                .await?;
        }

        Ok(())
    }

    fn notify_update(&self) {
        let _ = self.update_tx.send(DownloadStateChanged);
    }
}

/// Streams a page body into `directory/file_name`. The file handle is closed
/// on every exit path and a partial file is removed when the stream or the
/// write fails.
async fn save_stream_to_directory(
    mut data: PageStream,
    directory: &str,
    file_name: &str,
) -> Result<(), FetchError> {
    tokio::fs::create_dir_all(directory).await?;

    let path = Path::new(directory).join(file_name);
    let mut file = tokio::fs::File::create(&path).await?;

    let written = async {
        while let Some(chunk) = data.next().await {
            let chunk = chunk.map_err(FetchError::Fetch)?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok::<_, FetchError>(())
    }
    .await;

    if let Err(e) = written {
        drop(file);
        let _ = tokio::fs::remove_file(&path).await;
        return Err(e);
    }

    Ok(())
}
