/// Manga metadata as returned by a content source.
#[derive(Debug, Clone, Default)]
pub struct SourceManga {
    pub name: String,
    pub artist: String,
    pub author: String,
    pub description: String,
    pub genre: String,
    pub completed: bool,
    pub thumbnail_url: String,
}
