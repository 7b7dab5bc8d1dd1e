use async_trait::async_trait;

use thiserror::Error;

use crate::domain::entities::download::{
    ChapterFlag, DownloadChapter, DownloadManga, DownloadPage,
};

#[derive(Debug, Error)]
pub enum DownloadRepositoryError {
    #[error("database error: {0}")]
    DbError(#[from] sqlx::Error),
}

/// Transactional storage for download chapter/page/manga records. Every
/// multi-row mutation is atomic: a crash mid-operation never leaves
/// `current_page`, `total_pages` and the page rows inconsistent with each
/// other.
#[async_trait]
pub trait DownloadRepository: Send + Sync {
    /// Inserts the given chapters in one transaction. Chapters whose
    /// `(source, url)` identity already exists are ignored.
    async fn insert_download_chapters(
        &self,
        chapters: &[DownloadChapter],
    ) -> Result<(), DownloadRepositoryError>;

    /// Deletes the given chapters and all of their page rows in one
    /// transaction.
    async fn delete_download_chapters(
        &self,
        chapters: &[DownloadChapter],
    ) -> Result<(), DownloadRepositoryError>;

    async fn get_download_chapter(
        &self,
        source: &str,
        url: &str,
    ) -> Result<Option<DownloadChapter>, DownloadRepositoryError>;

    /// All pending and running chapters, in insertion order.
    async fn select_non_terminal_chapters(
        &self,
    ) -> Result<Vec<DownloadChapter>, DownloadRepositoryError>;

    async fn count_running_chapters(&self) -> Result<i64, DownloadRepositoryError>;

    /// Takes up to `limit` pending chapters in insertion order, marking them
    /// running in the same transaction as the select.
    async fn take_pending_chapters(
        &self,
        limit: i64,
    ) -> Result<Vec<DownloadChapter>, DownloadRepositoryError>;

    /// Transitions all pending and running chapters to paused.
    async fn pause_non_terminal_chapters(&self) -> Result<(), DownloadRepositoryError>;

    /// Transitions all paused chapters back to pending.
    async fn resume_paused_chapters(&self) -> Result<(), DownloadRepositoryError>;

    /// Transitions running chapters back to pending. Only meaningful while no
    /// pipeline task is live, to recover rows stranded by a process death.
    async fn recover_running_chapters(&self) -> Result<(), DownloadRepositoryError>;

    async fn update_chapter_flag(
        &self,
        chapter_id: i64,
        flag: ChapterFlag,
    ) -> Result<(), DownloadRepositoryError>;

    /// Inserts a chapter's resolved page rows and sets its `total_pages` to
    /// the row count, in one transaction.
    async fn create_chapter_pages(
        &self,
        chapter_id: i64,
        pages: &[DownloadPage],
    ) -> Result<(), DownloadRepositoryError>;

    /// A chapter's page rows ordered by rank.
    async fn select_chapter_pages(
        &self,
        parent_url: &str,
    ) -> Result<Vec<DownloadPage>, DownloadRepositoryError>;

    /// Marks one page completed and updates the parent chapter's
    /// `current_page`, in one transaction.
    async fn complete_page(
        &self,
        page_id: i64,
        chapter_id: i64,
        current_page: i64,
    ) -> Result<(), DownloadRepositoryError>;

    /// Completion cleanup: deletes the chapter's page rows and marks the
    /// chapter completed, in one transaction.
    async fn complete_chapter(
        &self,
        chapter: &DownloadChapter,
    ) -> Result<(), DownloadRepositoryError>;

    /// Inserts the manga aggregate unless one already exists for its
    /// `(source, url)` identity.
    async fn insert_download_manga_if_missing(
        &self,
        manga: &DownloadManga,
    ) -> Result<(), DownloadRepositoryError>;

    async fn get_download_manga(
        &self,
        source: &str,
        url: &str,
    ) -> Result<Option<DownloadManga>, DownloadRepositoryError>;
}
