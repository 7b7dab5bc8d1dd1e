use std::hash::{DefaultHasher, Hash, Hasher};

pub fn sanitize_filename(name: &str) -> String {
    name.replace(&['\\', '/', ':', '*', '?', '\"', '<', '>', '|'][..], "")
}

/// Subtype of a content type, used as the file extension of a saved page.
pub fn content_subtype(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .split('/')
        .nth(1)
        .filter(|subtype| !subtype.is_empty())
        .unwrap_or("bin")
}

/// Stable in-process key for a chapter url, used for the coordinator registry
/// and the url cache file names.
pub fn url_hash(url: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(
            sanitize_filename("One Piece: Chapter 1052?"),
            "One Piece Chapter 1052"
        );
        assert_eq!(sanitize_filename("a/b\\c|d"), "abcd");
    }

    #[test]
    fn test_content_subtype() {
        assert_eq!(content_subtype("image/jpeg"), "jpeg");
        assert_eq!(content_subtype("image/png; charset=binary"), "png");
        assert_eq!(content_subtype("garbage"), "bin");
        assert_eq!(content_subtype(""), "bin");
    }

    #[test]
    fn test_url_hash_is_stable() {
        let url = "https://example.com/manga/1/chapter/2";
        assert_eq!(url_hash(url), url_hash(url));
        assert_ne!(url_hash(url), url_hash("https://example.com/other"));
    }
}
