use thiserror::Error;

use crate::{
    application::worker::downloads::{Command, DownloadSender},
    domain::{
        entities::{
            chapter::Chapter,
            download::{ChapterKey, DownloadChapter, DownloadManga},
        },
        repositories::download::{DownloadRepository, DownloadRepositoryError},
    },
};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("repository error: {0}")]
    RepositoryError(#[from] DownloadRepositoryError),
    #[error("other error: {0}")]
    OtherError(#[from] anyhow::Error),
}

/// Host-facing facade over the download coordinator: command submission plus
/// the queries a queue view needs.
pub struct DownloadService<R>
where
    R: DownloadRepository,
{
    repo: R,
    download_sender: DownloadSender,
}

impl<R> DownloadService<R>
where
    R: DownloadRepository,
{
    pub fn new(repo: R, download_sender: DownloadSender) -> Self {
        Self {
            repo,
            download_sender,
        }
    }

    pub fn queue_chapters(&self, chapters: Vec<Chapter>) -> Result<(), DownloadError> {
        self.send(Command::Queue(chapters))
    }

    pub fn cancel_chapters(&self, chapters: Vec<ChapterKey>) -> Result<(), DownloadError> {
        self.send(Command::Cancel(chapters))
    }

    pub fn start(&self) -> Result<(), DownloadError> {
        self.send(Command::Start)
    }

    pub fn stop(&self) -> Result<(), DownloadError> {
        self.send(Command::Stop)
    }

    pub fn restart(&self) -> Result<(), DownloadError> {
        self.send(Command::Restart)
    }

    /// All pending and running chapters in admission order. Consumers call
    /// this again on every state-changed event.
    pub async fn get_queue(&self) -> Result<Vec<DownloadChapter>, DownloadError> {
        let queue = self.repo.select_non_terminal_chapters().await?;

        Ok(queue)
    }

    pub async fn get_download_manga(
        &self,
        source: &str,
        url: &str,
    ) -> Result<Option<DownloadManga>, DownloadError> {
        let manga = self.repo.get_download_manga(source, url).await?;

        Ok(manga)
    }

    fn send(&self, command: Command) -> Result<(), DownloadError> {
        self.download_sender.send(command).map_err(|_| {
            DownloadError::OtherError(anyhow::anyhow!("failed to send download command"))
        })
    }
}
