use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use std::ops::DerefMut;

use crate::{
    domain::{
        entities::download::{
            ChapterFlag, DownloadChapter, DownloadManga, DownloadPage, PageFlag,
        },
        repositories::download::{DownloadRepository, DownloadRepositoryError},
    },
    infrastructure::database::Pool,
};

#[derive(Clone)]
pub struct DownloadRepositoryImpl {
    pool: Pool,
}

impl DownloadRepositoryImpl {
    pub fn new<P: Into<Pool>>(pool: P) -> Self {
        Self { pool: pool.into() }
    }
}

fn map_chapter(row: &SqliteRow) -> DownloadChapter {
    DownloadChapter {
        id: row.get(0),
        source: row.get(1),
        url: row.get(2),
        parent_url: row.get(3),
        name: row.get(4),
        directory: row.get(5),
        current_page: row.get(6),
        total_pages: row.get(7),
        flag: ChapterFlag::from_i64(row.get(8)),
        date_added: row.get(9),
    }
}

fn map_page(row: &SqliteRow) -> DownloadPage {
    DownloadPage {
        id: row.get(0),
        url: row.get(1),
        parent_url: row.get(2),
        name: row.get(3),
        directory: row.get(4),
        rank: row.get(5),
        flag: PageFlag::from_i64(row.get(6)),
    }
}

fn map_manga(row: &SqliteRow) -> DownloadManga {
    DownloadManga {
        id: row.get(0),
        source: row.get(1),
        url: row.get(2),
        artist: row.get(3),
        author: row.get(4),
        description: row.get(5),
        genre: row.get(6),
        name: row.get(7),
        completed: row.get(8),
        thumbnail_url: row.get(9),
    }
}

const CHAPTER_COLUMNS: &str = r#"id,
    source,
    url,
    parent_url,
    name,
    directory,
    current_page,
    total_pages,
    flag,
    date_added"#;

#[async_trait]
impl DownloadRepository for DownloadRepositoryImpl {
    async fn insert_download_chapters(
        &self,
        chapters: &[DownloadChapter],
    ) -> Result<(), DownloadRepositoryError> {
        if chapters.is_empty() {
            return Ok(());
        }

        let mut values = vec![];
        values.resize(chapters.len(), "(?, ?, ?, ?, ?, ?, ?, ?, ?)");

        let query_str = format!(
            r#"INSERT OR IGNORE INTO download_chapter(
                source,
                url,
                parent_url,
                name,
                directory,
                current_page,
                total_pages,
                flag,
                date_added
        ) VALUES {}"#,
            values.join(",")
        );

        let mut query = sqlx::query(&query_str);
        for chapter in chapters {
            query = query
                .bind(&chapter.source)
                .bind(&chapter.url)
                .bind(&chapter.parent_url)
                .bind(&chapter.name)
                .bind(&chapter.directory)
                .bind(chapter.current_page)
                .bind(chapter.total_pages)
                .bind(chapter.flag.to_i64())
                .bind(chapter.date_added.and_utc().timestamp())
        }

        query.execute(&self.pool as &SqlitePool).await?;

        Ok(())
    }

    async fn delete_download_chapters(
        &self,
        chapters: &[DownloadChapter],
    ) -> Result<(), DownloadRepositoryError> {
        if chapters.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for chapter in chapters {
            sqlx::query(r#"DELETE FROM download_page WHERE parent_url = ?"#)
                .bind(&chapter.url)
                .execute(tx.deref_mut())
                .await?;

            sqlx::query(r#"DELETE FROM download_chapter WHERE id = ?"#)
                .bind(chapter.id)
                .execute(tx.deref_mut())
                .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn get_download_chapter(
        &self,
        source: &str,
        url: &str,
    ) -> Result<Option<DownloadChapter>, DownloadRepositoryError> {
        let chapter = sqlx::query(&format!(
            r#"SELECT {CHAPTER_COLUMNS} FROM download_chapter WHERE source = ? AND url = ?"#
        ))
        .bind(source)
        .bind(url)
        .fetch_optional(&self.pool as &SqlitePool)
        .await?
        .map(|row| map_chapter(&row));

        Ok(chapter)
    }

    async fn select_non_terminal_chapters(
        &self,
    ) -> Result<Vec<DownloadChapter>, DownloadRepositoryError> {
        let chapters = sqlx::query(&format!(
            r#"SELECT {CHAPTER_COLUMNS}
                FROM download_chapter
                WHERE flag IN (?, ?)
                ORDER BY id ASC"#
        ))
        .bind(ChapterFlag::Pending.to_i64())
        .bind(ChapterFlag::Running.to_i64())
        .fetch_all(&self.pool as &SqlitePool)
        .await?
        .iter()
        .map(map_chapter)
        .collect();

        Ok(chapters)
    }

    async fn count_running_chapters(&self) -> Result<i64, DownloadRepositoryError> {
        let row = sqlx::query(r#"SELECT COUNT(1) FROM download_chapter WHERE flag = ?"#)
            .bind(ChapterFlag::Running.to_i64())
            .fetch_one(&self.pool as &SqlitePool)
            .await?;

        Ok(row.get(0))
    }

    async fn take_pending_chapters(
        &self,
        limit: i64,
    ) -> Result<Vec<DownloadChapter>, DownloadRepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut chapters: Vec<DownloadChapter> = sqlx::query(&format!(
            r#"SELECT {CHAPTER_COLUMNS}
                FROM download_chapter
                WHERE flag = ?
                ORDER BY id ASC
                LIMIT ?"#
        ))
        .bind(ChapterFlag::Pending.to_i64())
        .bind(limit)
        .fetch_all(tx.deref_mut())
        .await?
        .iter()
        .map(map_chapter)
        .collect();

        for chapter in chapters.iter_mut() {
            sqlx::query(r#"UPDATE download_chapter SET flag = ? WHERE id = ?"#)
                .bind(ChapterFlag::Running.to_i64())
                .bind(chapter.id)
                .execute(tx.deref_mut())
                .await?;

            chapter.flag = ChapterFlag::Running;
        }

        tx.commit().await?;

        Ok(chapters)
    }

    async fn pause_non_terminal_chapters(&self) -> Result<(), DownloadRepositoryError> {
        sqlx::query(r#"UPDATE download_chapter SET flag = ? WHERE flag IN (?, ?)"#)
            .bind(ChapterFlag::Paused.to_i64())
            .bind(ChapterFlag::Pending.to_i64())
            .bind(ChapterFlag::Running.to_i64())
            .execute(&self.pool as &SqlitePool)
            .await?;

        Ok(())
    }

    async fn resume_paused_chapters(&self) -> Result<(), DownloadRepositoryError> {
        sqlx::query(r#"UPDATE download_chapter SET flag = ? WHERE flag = ?"#)
            .bind(ChapterFlag::Pending.to_i64())
            .bind(ChapterFlag::Paused.to_i64())
            .execute(&self.pool as &SqlitePool)
            .await?;

        Ok(())
    }

    async fn recover_running_chapters(&self) -> Result<(), DownloadRepositoryError> {
        sqlx::query(r#"UPDATE download_chapter SET flag = ? WHERE flag = ?"#)
            .bind(ChapterFlag::Pending.to_i64())
            .bind(ChapterFlag::Running.to_i64())
            .execute(&self.pool as &SqlitePool)
            .await?;

        Ok(())
    }

    async fn update_chapter_flag(
        &self,
        chapter_id: i64,
        flag: ChapterFlag,
    ) -> Result<(), DownloadRepositoryError> {
        sqlx::query(r#"UPDATE download_chapter SET flag = ? WHERE id = ?"#)
            .bind(flag.to_i64())
            .bind(chapter_id)
            .execute(&self.pool as &SqlitePool)
            .await?;

        Ok(())
    }

    async fn create_chapter_pages(
        &self,
        chapter_id: i64,
        pages: &[DownloadPage],
    ) -> Result<(), DownloadRepositoryError> {
        let mut tx = self.pool.begin().await?;

        if !pages.is_empty() {
            let mut values = vec![];
            values.resize(pages.len(), "(?, ?, ?, ?, ?, ?)");

            let query_str = format!(
                r#"INSERT OR IGNORE INTO download_page(
                    url,
                    parent_url,
                    name,
                    directory,
                    rank,
                    flag
            ) VALUES {}"#,
                values.join(",")
            );

            let mut query = sqlx::query(&query_str);
            for page in pages {
                query = query
                    .bind(&page.url)
                    .bind(&page.parent_url)
                    .bind(&page.name)
                    .bind(&page.directory)
                    .bind(page.rank)
                    .bind(page.flag.to_i64())
            }

            query.execute(tx.deref_mut()).await?;
        }

        sqlx::query(r#"UPDATE download_chapter SET total_pages = ? WHERE id = ?"#)
            .bind(pages.len() as i64)
            .bind(chapter_id)
            .execute(tx.deref_mut())
            .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn select_chapter_pages(
        &self,
        parent_url: &str,
    ) -> Result<Vec<DownloadPage>, DownloadRepositoryError> {
        let pages = sqlx::query(
            r#"SELECT
                    id,
                    url,
                    parent_url,
                    name,
                    directory,
                    rank,
                    flag
                FROM download_page
                WHERE parent_url = ?
                ORDER BY rank ASC"#,
        )
        .bind(parent_url)
        .fetch_all(&self.pool as &SqlitePool)
        .await?
        .iter()
        .map(map_page)
        .collect();

        Ok(pages)
    }

    async fn complete_page(
        &self,
        page_id: i64,
        chapter_id: i64,
        current_page: i64,
    ) -> Result<(), DownloadRepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(r#"UPDATE download_page SET flag = ? WHERE id = ?"#)
            .bind(PageFlag::Completed.to_i64())
            .bind(page_id)
            .execute(tx.deref_mut())
            .await?;

        sqlx::query(r#"UPDATE download_chapter SET current_page = ? WHERE id = ?"#)
            .bind(current_page)
            .bind(chapter_id)
            .execute(tx.deref_mut())
            .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn complete_chapter(
        &self,
        chapter: &DownloadChapter,
    ) -> Result<(), DownloadRepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(r#"DELETE FROM download_page WHERE parent_url = ?"#)
            .bind(&chapter.url)
            .execute(tx.deref_mut())
            .await?;

        sqlx::query(r#"UPDATE download_chapter SET flag = ? WHERE id = ?"#)
            .bind(ChapterFlag::Completed.to_i64())
            .bind(chapter.id)
            .execute(tx.deref_mut())
            .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn insert_download_manga_if_missing(
        &self,
        manga: &DownloadManga,
    ) -> Result<(), DownloadRepositoryError> {
        sqlx::query(
            r#"INSERT OR IGNORE INTO download_manga(
                    source,
                    url,
                    artist,
                    author,
                    description,
                    genre,
                    name,
                    completed,
                    thumbnail_url
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&manga.source)
        .bind(&manga.url)
        .bind(&manga.artist)
        .bind(&manga.author)
        .bind(&manga.description)
        .bind(&manga.genre)
        .bind(&manga.name)
        .bind(manga.completed)
        .bind(&manga.thumbnail_url)
        .execute(&self.pool as &SqlitePool)
        .await?;

        Ok(())
    }

    async fn get_download_manga(
        &self,
        source: &str,
        url: &str,
    ) -> Result<Option<DownloadManga>, DownloadRepositoryError> {
        let manga = sqlx::query(
            r#"SELECT
                    id,
                    source,
                    url,
                    artist,
                    author,
                    description,
                    genre,
                    name,
                    completed,
                    thumbnail_url
                FROM download_manga
                WHERE source = ? AND url = ?"#,
        )
        .bind(source)
        .bind(url)
        .fetch_optional(&self.pool as &SqlitePool)
        .await?
        .map(|row| map_manga(&row));

        Ok(manga)
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;

    async fn repository() -> DownloadRepositoryImpl {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        DownloadRepositoryImpl::new(pool)
    }

    fn chapter(index: usize) -> DownloadChapter {
        DownloadChapter {
            id: 0,
            source: "example".to_string(),
            url: format!("https://example.com/chapter/{index}"),
            parent_url: "https://example.com/manga/1".to_string(),
            name: format!("Chapter {index}"),
            directory: format!("/tmp/example/Chapter {index}"),
            current_page: 0,
            total_pages: 0,
            flag: ChapterFlag::Pending,
            date_added: Utc::now().naive_utc(),
        }
    }

    fn pages_for(chapter: &DownloadChapter, count: usize) -> Vec<DownloadPage> {
        (0..count)
            .map(|rank| DownloadPage {
                id: 0,
                url: format!("{}/page/{}", chapter.url, rank + 1),
                parent_url: chapter.url.clone(),
                name: format!("{:03}", rank + 1),
                directory: chapter.directory.clone(),
                rank: rank as i64,
                flag: PageFlag::Pending,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_insert_chapters_ignores_duplicates() {
        let repo = repository().await;

        repo.insert_download_chapters(&[chapter(1), chapter(2)])
            .await
            .unwrap();
        repo.insert_download_chapters(&[chapter(1)]).await.unwrap();

        let chapters = repo.select_non_terminal_chapters().await.unwrap();
        assert_eq!(chapters.len(), 2);
    }

    #[tokio::test]
    async fn test_take_pending_marks_running_in_insertion_order() {
        let repo = repository().await;

        repo.insert_download_chapters(&[chapter(1), chapter(2), chapter(3)])
            .await
            .unwrap();

        let taken = repo.take_pending_chapters(2).await.unwrap();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].url, "https://example.com/chapter/1");
        assert_eq!(taken[1].url, "https://example.com/chapter/2");
        assert!(taken.iter().all(|c| c.flag == ChapterFlag::Running));

        assert_eq!(repo.count_running_chapters().await.unwrap(), 2);

        let remaining = repo.take_pending_chapters(5).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].url, "https://example.com/chapter/3");
    }

    #[tokio::test]
    async fn test_pause_resume_and_recover_transitions() {
        let repo = repository().await;

        repo.insert_download_chapters(&[chapter(1), chapter(2)])
            .await
            .unwrap();
        repo.take_pending_chapters(1).await.unwrap();

        repo.pause_non_terminal_chapters().await.unwrap();
        assert_eq!(repo.count_running_chapters().await.unwrap(), 0);
        assert!(repo.select_non_terminal_chapters().await.unwrap().is_empty());

        repo.resume_paused_chapters().await.unwrap();
        let chapters = repo.select_non_terminal_chapters().await.unwrap();
        assert_eq!(chapters.len(), 2);
        assert!(chapters.iter().all(|c| c.flag == ChapterFlag::Pending));

        repo.take_pending_chapters(2).await.unwrap();
        repo.recover_running_chapters().await.unwrap();
        let chapters = repo.select_non_terminal_chapters().await.unwrap();
        assert!(chapters.iter().all(|c| c.flag == ChapterFlag::Pending));
    }

    #[tokio::test]
    async fn test_create_pages_sets_total_pages() {
        let repo = repository().await;

        repo.insert_download_chapters(&[chapter(1)]).await.unwrap();
        let stored = repo.take_pending_chapters(1).await.unwrap().remove(0);

        repo.create_chapter_pages(stored.id, &pages_for(&stored, 3))
            .await
            .unwrap();

        let chapter = repo
            .get_download_chapter(&stored.source, &stored.url)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chapter.total_pages, 3);

        let pages = repo.select_chapter_pages(&stored.url).await.unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].rank, 0);
        assert_eq!(pages[2].rank, 2);
        assert!(pages.iter().all(|p| p.flag == PageFlag::Pending));
    }

    #[tokio::test]
    async fn test_complete_page_advances_chapter_progress() {
        let repo = repository().await;

        repo.insert_download_chapters(&[chapter(1)]).await.unwrap();
        let stored = repo.take_pending_chapters(1).await.unwrap().remove(0);
        repo.create_chapter_pages(stored.id, &pages_for(&stored, 2))
            .await
            .unwrap();

        let pages = repo.select_chapter_pages(&stored.url).await.unwrap();
        repo.complete_page(pages[0].id, stored.id, 1).await.unwrap();

        let pages = repo.select_chapter_pages(&stored.url).await.unwrap();
        assert_eq!(pages[0].flag, PageFlag::Completed);
        assert_eq!(pages[1].flag, PageFlag::Pending);

        let chapter = repo
            .get_download_chapter(&stored.source, &stored.url)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chapter.current_page, 1);
        assert_eq!(chapter.total_pages, 2);
    }

    #[tokio::test]
    async fn test_complete_chapter_reclaims_pages() {
        let repo = repository().await;

        repo.insert_download_chapters(&[chapter(1)]).await.unwrap();
        let stored = repo.take_pending_chapters(1).await.unwrap().remove(0);
        repo.create_chapter_pages(stored.id, &pages_for(&stored, 2))
            .await
            .unwrap();

        repo.complete_chapter(&stored).await.unwrap();

        assert!(repo
            .select_chapter_pages(&stored.url)
            .await
            .unwrap()
            .is_empty());
        let chapter = repo
            .get_download_chapter(&stored.source, &stored.url)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chapter.flag, ChapterFlag::Completed);
    }

    #[tokio::test]
    async fn test_delete_chapters_removes_page_rows() {
        let repo = repository().await;

        repo.insert_download_chapters(&[chapter(1), chapter(2)])
            .await
            .unwrap();
        let taken = repo.take_pending_chapters(2).await.unwrap();
        repo.create_chapter_pages(taken[0].id, &pages_for(&taken[0], 2))
            .await
            .unwrap();

        repo.delete_download_chapters(&taken[..1]).await.unwrap();

        assert!(repo
            .get_download_chapter(&taken[0].source, &taken[0].url)
            .await
            .unwrap()
            .is_none());
        assert!(repo
            .select_chapter_pages(&taken[0].url)
            .await
            .unwrap()
            .is_empty());
        assert!(repo
            .get_download_chapter(&taken[1].source, &taken[1].url)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_insert_manga_if_missing_is_deduped() {
        let repo = repository().await;

        let manga = DownloadManga {
            source: "example".to_string(),
            url: "https://example.com/manga/1".to_string(),
            name: "First".to_string(),
            ..Default::default()
        };
        repo.insert_download_manga_if_missing(&manga).await.unwrap();

        let duplicate = DownloadManga {
            name: "Second".to_string(),
            ..manga.clone()
        };
        repo.insert_download_manga_if_missing(&duplicate)
            .await
            .unwrap();

        let stored = repo
            .get_download_manga("example", "https://example.com/manga/1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "First");
    }
}
