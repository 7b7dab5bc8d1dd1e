use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{
        entities::{
            chapter::Chapter,
            download::{ChapterFlag, ChapterKey, DownloadChapter},
        },
        repositories::{
            download::DownloadRepository, page::PageRepository, source::SourceRepository,
            url_cache::UrlCacheRepository,
        },
    },
    utils,
};

use super::fetch::ChapterFetcher;

pub type DownloadSender = mpsc::UnboundedSender<Command>;
pub type DownloadReceiver = mpsc::UnboundedReceiver<Command>;

/// Something about the download queue changed. Carries no payload on purpose:
/// consumers re-query the repository for the current state.
#[derive(Debug, Clone, Copy)]
pub struct DownloadStateChanged;

pub type DownloadUpdateSender = broadcast::Sender<DownloadStateChanged>;
pub type DownloadUpdateReceiver = broadcast::Receiver<DownloadStateChanged>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStatus {
    pub is_connected: bool,
    pub is_wifi: bool,
}

pub type NetworkSender = watch::Sender<NetworkStatus>;
pub type NetworkReceiver = watch::Receiver<NetworkStatus>;

/// Host resource that keeps the process from being suspended while downloads
/// are active. `acquire` and `release` are idempotent toggles.
pub trait KeepAliveLease: Send + Sync {
    fn acquire(&self);
    fn release(&self);
}

/// Lease for hosts without background execution restrictions.
pub struct NoopLease;

impl KeepAliveLease for NoopLease {
    fn acquire(&self) {}
    fn release(&self) {}
}

#[derive(Debug)]
pub enum Command {
    Queue(Vec<Chapter>),
    Cancel(Vec<ChapterKey>),
    Start,
    Stop,
    Restart,
    /// Sent by a pipeline task once its terminal persistence update committed.
    Finished(u64, u64),
}

struct RunningDownload {
    run_id: u64,
    token: CancellationToken,
}

/// The download queue coordinator. A single task owns the whole state and
/// drains the command channel, so command handling, the cancel-handle registry
/// and the count-running-then-admit sequence are serialized without a lock.
pub struct DownloadWorker<D, S, P, U>
where
    D: DownloadRepository + 'static,
    S: SourceRepository + 'static,
    P: PageRepository + 'static,
    U: UrlCacheRepository + 'static,
{
    download_dir: PathBuf,
    max_concurrent: usize,
    wifi_only: bool,
    download_repo: Arc<D>,
    fetcher: Arc<ChapterFetcher<D, S, P, U>>,
    keep_alive: Arc<dyn KeepAliveLease>,
    registry: HashMap<u64, RunningDownload>,
    next_run_id: u64,
    stopping: bool,
    initialized: bool,
    watch_network: bool,
    tx: DownloadSender,
    rx: DownloadReceiver,
    network_rx: NetworkReceiver,
    update_tx: DownloadUpdateSender,
}

impl<D, S, P, U> DownloadWorker<D, S, P, U>
where
    D: DownloadRepository + 'static,
    S: SourceRepository + 'static,
    P: PageRepository + 'static,
    U: UrlCacheRepository + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new<Dir: AsRef<Path>>(
        download_dir: Dir,
        max_concurrent: usize,
        wifi_only: bool,
        download_repo: D,
        source_repo: S,
        page_repo: P,
        url_cache: U,
        keep_alive: Arc<dyn KeepAliveLease>,
        download_sender: DownloadSender,
        download_receiver: DownloadReceiver,
        network_receiver: NetworkReceiver,
        update_sender: DownloadUpdateSender,
    ) -> Self {
        let download_repo = Arc::new(download_repo);
        let fetcher = Arc::new(ChapterFetcher::new(
            Arc::clone(&download_repo),
            source_repo,
            page_repo,
            url_cache,
            update_sender.clone(),
        ));

        Self {
            download_dir: PathBuf::new().join(download_dir),
            max_concurrent,
            wifi_only,
            download_repo,
            fetcher,
            keep_alive,
            registry: HashMap::new(),
            next_run_id: 0,
            stopping: false,
            initialized: false,
            watch_network: true,
            tx: download_sender,
            rx: download_receiver,
            network_rx: network_receiver,
            update_tx: update_sender,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                changed = self.network_rx.changed(), if self.watch_network => {
                    match changed {
                        Ok(()) => self.on_network_change().await,
                        Err(_) => {
                            debug!("network monitor gone");
                            self.watch_network = false;
                        }
                    }
                }
                cmd = self.rx.recv() => {
                    let Some(cmd) = cmd else {
                        break;
                    };
                    match cmd {
                        Command::Queue(chapters) => self.handle_queue(chapters).await,
                        Command::Cancel(keys) => self.handle_cancel(keys).await,
                        Command::Start => self.handle_start().await,
                        Command::Stop => self.handle_stop().await,
                        Command::Restart => self.handle_restart().await,
                        Command::Finished(key, run_id) => self.handle_finished(key, run_id).await,
                    }
                }
            }
        }
    }

    /// Builds pending records for the given chapters and persists them in one
    /// transaction. Queueing never starts work by itself.
    async fn handle_queue(&mut self, chapters: Vec<Chapter>) {
        if chapters.is_empty() {
            return;
        }

        let date_added = Utc::now().naive_utc();
        let records: Vec<DownloadChapter> = chapters
            .into_iter()
            .map(|chapter| {
                let directory = self
                    .download_dir
                    .join(utils::sanitize_filename(&chapter.source))
                    .join(utils::sanitize_filename(&chapter.name));

                DownloadChapter {
                    id: 0,
                    source: chapter.source,
                    url: chapter.url,
                    parent_url: chapter.parent_url,
                    name: chapter.name,
                    directory: directory.display().to_string(),
                    current_page: 0,
                    total_pages: 0,
                    flag: ChapterFlag::Pending,
                    date_added,
                }
            })
            .collect();

        if let Err(e) = self.download_repo.insert_download_chapters(&records).await {
            error!("failed to queue chapters: {e}");
            return;
        }

        self.notify_update();
    }

    /// Cancels any live pipeline run for the given chapters, removes their
    /// partial files and deletes their records, then tries to backfill the
    /// pool.
    async fn handle_cancel(&mut self, keys: Vec<ChapterKey>) {
        let mut records = Vec::new();
        for key in &keys {
            match self
                .download_repo
                .get_download_chapter(&key.source, &key.url)
                .await
            {
                Ok(Some(chapter)) => records.push(chapter),
                Ok(None) => {}
                Err(e) => error!("failed to look up {} for cancel: {e}", key.url),
            }
        }

        for chapter in &records {
            if let Some(running) = self.registry.remove(&utils::url_hash(&chapter.url)) {
                running.token.cancel();
            }

            if let Err(e) = tokio::fs::remove_dir_all(&chapter.directory).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("failed to remove {}: {e}", chapter.directory);
                }
            }
        }

        if !records.is_empty() {
            if let Err(e) = self.download_repo.delete_download_chapters(&records).await {
                error!("failed to delete cancelled chapters: {e}");
            }
        }

        self.notify_update();

        if self.initialized && self.network_available() {
            self.refill().await;
        }
        self.release_when_idle().await;
    }

    /// Idempotent initialization. Orphaned running rows are recovered once,
    /// paused chapters go back to pending on every start, then the pool is
    /// filled under the network policy.
    async fn handle_start(&mut self) {
        if !self.initialized {
            self.initialized = true;

            if let Err(e) = self.download_repo.recover_running_chapters().await {
                error!("failed to recover orphaned chapters: {e}");
            }
        }

        self.stopping = false;

        if let Err(e) = self.download_repo.resume_paused_chapters().await {
            error!("failed to resume paused chapters: {e}");
        }

        self.notify_update();

        self.keep_alive.acquire();
        if self.network_available() {
            self.refill().await;
        }
        self.release_when_idle().await;
    }

    /// Cancels all live work and parks every non-terminal chapter as paused.
    async fn handle_stop(&mut self) {
        self.stopping = true;

        self.cancel_all();

        if let Err(e) = self.download_repo.pause_non_terminal_chapters().await {
            error!("failed to pause chapters: {e}");
        }

        self.keep_alive.release();
        self.notify_update();
    }

    /// Same as stop, but the coordinator lifecycle stays up: used to force
    /// everything running back to paused.
    async fn handle_restart(&mut self) {
        self.cancel_all();

        if let Err(e) = self.download_repo.pause_non_terminal_chapters().await {
            error!("failed to pause chapters: {e}");
        }

        self.notify_update();
    }

    async fn handle_finished(&mut self, key: u64, run_id: u64) {
        // A stale message from an already replaced run must not drop the
        // current registry entry.
        if self
            .registry
            .get(&key)
            .is_some_and(|running| running.run_id == run_id)
        {
            self.registry.remove(&key);
        }

        if self.initialized && !self.stopping && self.network_available() {
            self.refill().await;
        }
        self.release_when_idle().await;
    }

    async fn on_network_change(&mut self) {
        if !self.initialized {
            return;
        }

        if self.network_available() {
            self.keep_alive.acquire();
            self.refill().await;
        } else {
            // In-flight chapters are left alone, only admission stops.
            self.keep_alive.release();
        }
    }

    fn network_available(&self) -> bool {
        let status = *self.network_rx.borrow();
        status.is_connected && (!self.wifi_only || status.is_wifi)
    }

    /// Backfills the pool: takes pending chapters up to the free capacity,
    /// marking them running in one transaction, and dispatches one pipeline
    /// task each. Runs again on every terminal completion, so admission
    /// cascades until the queue is drained or the pool is full.
    async fn refill(&mut self) {
        if self.stopping {
            return;
        }

        let running = match self.download_repo.count_running_chapters().await {
            Ok(count) => count.max(0) as usize,
            Err(e) => {
                error!("failed to count running chapters: {e}");
                return;
            }
        };

        let capacity = self.max_concurrent.saturating_sub(running);
        if capacity == 0 {
            return;
        }

        let chapters = match self
            .download_repo
            .take_pending_chapters(capacity as i64)
            .await
        {
            Ok(chapters) => chapters,
            Err(e) => {
                error!("failed to take pending chapters: {e}");
                return;
            }
        };
        if chapters.is_empty() {
            return;
        }

        for chapter in chapters {
            let key = utils::url_hash(&chapter.url);
            let run_id = self.next_run_id;
            self.next_run_id += 1;

            let token = CancellationToken::new();
            self.registry.insert(
                key,
                RunningDownload {
                    run_id,
                    token: token.clone(),
                },
            );

            debug!("dispatching {}", chapter.url);

            let fetcher = Arc::clone(&self.fetcher);
            let tx = self.tx.clone();
            tokio::spawn(async move {
                fetcher.run(chapter, token).await;
                let _ = tx.send(Command::Finished(key, run_id));
            });
        }

        self.notify_update();
    }

    fn cancel_all(&mut self) {
        for (_, running) in self.registry.drain() {
            running.token.cancel();
        }
    }

    /// Lets go of the keep-alive lease once nothing is running or waiting.
    async fn release_when_idle(&mut self) {
        if !self.initialized || !self.registry.is_empty() {
            return;
        }

        match self.download_repo.select_non_terminal_chapters().await {
            Ok(chapters) if chapters.is_empty() => self.keep_alive.release(),
            Ok(_) => {}
            Err(e) => error!("failed to query active chapters: {e}"),
        }
    }

    fn notify_update(&self) {
        let _ = self.update_tx.send(DownloadStateChanged);
    }
}

pub fn channel() -> (DownloadSender, DownloadReceiver) {
    mpsc::unbounded_channel::<Command>()
}

pub fn update_channel() -> (DownloadUpdateSender, DownloadUpdateReceiver) {
    broadcast::channel(128)
}

pub fn network_channel(initial: NetworkStatus) -> (NetworkSender, NetworkReceiver) {
    watch::channel(initial)
}

#[allow(clippy::too_many_arguments)]
pub fn start<D, S, P, U>(
    download_dir: impl AsRef<Path>,
    max_concurrent: usize,
    wifi_only: bool,
    download_repo: D,
    source_repo: S,
    page_repo: P,
    url_cache: U,
    keep_alive: Arc<dyn KeepAliveLease>,
    download_sender: DownloadSender,
    download_receiver: DownloadReceiver,
    network_receiver: NetworkReceiver,
    update_sender: DownloadUpdateSender,
) -> JoinHandle<()>
where
    D: DownloadRepository + 'static,
    S: SourceRepository + 'static,
    P: PageRepository + 'static,
    U: UrlCacheRepository + 'static,
{
    let worker = DownloadWorker::new(
        download_dir,
        max_concurrent,
        wifi_only,
        download_repo,
        source_repo,
        page_repo,
        url_cache,
        keep_alive,
        download_sender,
        download_receiver,
        network_receiver,
        update_sender,
    );

    tokio::spawn(worker.run())
}
