/// A chapter as handed over by a content source, the unit a user queues for
/// download.
#[derive(Debug, Clone)]
pub struct Chapter {
    pub source: String,
    pub url: String,
    pub parent_url: String,
    pub name: String,
}
