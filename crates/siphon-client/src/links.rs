//! Anchor scanning for downloadable files.

use std::collections::HashSet;

use reqwest::Url;
use scraper::{Html, Selector};

/// Returns absolute URLs of `<a href>` targets whose path ends in one of
/// `extensions`, in document order and without repeats.
///
/// Relative links are resolved against `base`. Extensions are matched
/// case-insensitively and may be given with or without the leading dot.
pub fn find_file_links(html: &str, base: &Url, extensions: &[String]) -> Vec<Url> {
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let suffixes: Vec<String> = extensions
        .iter()
        .map(|ext| format!(".{}", ext.trim_start_matches('.').to_ascii_lowercase()))
        .collect();

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href.trim()) else {
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }
        let path = url.path().to_ascii_lowercase();
        if !suffixes.iter().any(|s| path.ends_with(s.as_str())) {
            continue;
        }
        if seen.insert(url.as_str().to_string()) {
            links.push(url);
        }
    }
    links
}

/// File extension of `url`'s last path segment, if any.
pub fn extension_of(url: &Url) -> Option<&str> {
    let segment = url.path_segments()?.next_back()?;
    let (_, ext) = segment.rsplit_once('.')?;
    (!ext.is_empty()).then_some(ext)
}
