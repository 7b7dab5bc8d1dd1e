use chrono::NaiveDateTime;

/// Lifecycle state of a queued chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterFlag {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl ChapterFlag {
    pub fn from_i64(value: i64) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Paused,
            3 => Self::Completed,
            _ => Self::Failed,
        }
    }

    pub fn to_i64(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Paused => 2,
            Self::Completed => 3,
            Self::Failed => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFlag {
    Pending,
    Completed,
}

impl PageFlag {
    pub fn from_i64(value: i64) -> Self {
        match value {
            3 => Self::Completed,
            _ => Self::Pending,
        }
    }

    pub fn to_i64(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Completed => 3,
        }
    }
}

/// A chapter queued for download. `(source, url)` is the identity, everything
/// else is derived when the chapter is queued or resolved.
#[derive(Debug, Clone)]
pub struct DownloadChapter {
    pub id: i64,
    pub source: String,
    pub url: String,
    pub parent_url: String,
    pub name: String,
    pub directory: String,
    pub current_page: i64,
    pub total_pages: i64,
    pub flag: ChapterFlag,
    pub date_added: NaiveDateTime,
}

/// One page of a chapter's transient work list. The rows for a chapter are
/// deleted once the chapter completes.
#[derive(Debug, Clone)]
pub struct DownloadPage {
    pub id: i64,
    pub url: String,
    pub parent_url: String,
    pub name: String,
    pub directory: String,
    pub rank: i64,
    pub flag: PageFlag,
}

/// Aggregate metadata for a manga with at least one completed chapter.
#[derive(Debug, Clone, Default)]
pub struct DownloadManga {
    pub id: i64,
    pub source: String,
    pub url: String,
    pub artist: String,
    pub author: String,
    pub description: String,
    pub genre: String,
    pub name: String,
    pub completed: bool,
    pub thumbnail_url: String,
}

/// Identity of a download chapter, as carried by cancel commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChapterKey {
    pub source: String,
    pub url: String,
}
