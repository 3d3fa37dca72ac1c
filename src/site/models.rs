//! Data models for pages and records extracted from the site.
//!
//! Records are plain owned structs built by `site::parser`; malformed rows
//! are rejected at construction time rather than carried around half-empty.

use std::fmt;

use time::Date;

/// Which page of the resolution chain a blob of HTML came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    SeriesList,
    EpisodeList,
    SeriesDetail,
    LinkIntermediate,
    FinalLink,
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageKind::SeriesList => "series-list",
            PageKind::EpisodeList => "episode-list",
            PageKind::SeriesDetail => "series-detail",
            PageKind::LinkIntermediate => "link-intermediate",
            PageKind::FinalLink => "final-link",
        };
        f.write_str(name)
    }
}

/// One series row on a search-results or catalogue-listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRecord {
    pub title: String,
    pub url: String,
    pub cover_photo: String,
    pub about: String,
}

/// One downloadable file variant of an episode.
///
/// `identity` is the single-letter quality tag shown next to the link
/// (`p` for High MP4, `w` for WEBM).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeFile {
    pub url: String,
    pub identity: String,
}

/// One episode row on an episode listing page.
///
/// The title encodes `"<series> - <episode-id> - <episode-title>"`; the
/// batch orchestrator decodes it to derive the on-disk directory layout,
/// so it is kept verbatim as scraped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRecord {
    pub title: String,
    pub files: Vec<EpisodeFile>,
    pub cover_photo: String,
    pub aired_on: Option<Date>,
    pub about: Option<String>,
    pub stars: Option<String>,
    pub director: Option<String>,
    pub writer: Option<String>,
}

/// One page of listed records plus its navigation links.
///
/// Equality is structural, which is what the navigation round-trip law
/// is stated over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage<T> {
    pub items: Vec<T>,
    pub first_page: Option<String>,
    pub previous_page: Option<String>,
    pub next_page: Option<String>,
    pub last_page: Option<String>,
}

impl<T> SearchPage<T> {
    /// Concatenate two pages of the same listing: items of `self` followed
    /// by items of `next`, navigation links taken from `next`.
    pub fn merge(mut self, next: SearchPage<T>) -> SearchPage<T> {
        self.items.extend(next.items);
        SearchPage {
            items: self.items,
            first_page: next.first_page,
            previous_page: next.previous_page,
            next_page: next.next_page,
            last_page: next.last_page,
        }
    }
}

/// One season link on a series detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonRecord {
    pub url: String,
    pub label: String,
    /// 1-based position on the page.
    pub ordinal: usize,
}

/// Metadata scraped from a series detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesDetail {
    pub title: String,
    pub genres: Vec<String>,
    pub year: Option<String>,
    pub synopsis: String,
    pub rating: Option<String>,
    pub last_updated: Option<String>,
    pub seasons: Vec<SeasonRecord>,
}

/// Candidate direct links and file metadata from a download-links page.
///
/// The first candidate is the preferred one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadManifest {
    pub links: Vec<String>,
    pub filename: String,
    pub size: String,
    pub hits: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(items: &[&str], next: Option<&str>, prev: Option<&str>) -> SearchPage<String> {
        SearchPage {
            items: items.iter().map(|s| s.to_string()).collect(),
            first_page: None,
            previous_page: prev.map(str::to_string),
            next_page: next.map(str::to_string),
            last_page: None,
        }
    }

    #[test]
    fn merge_concatenates_items_and_keeps_second_navigation() {
        let a = page(&["one", "two"], Some("p2"), None);
        let b = page(&["three"], Some("p3"), Some("p1"));
        let merged = a.merge(b);
        assert_eq!(merged.items, vec!["one", "two", "three"]);
        assert_eq!(merged.next_page.as_deref(), Some("p3"));
        assert_eq!(merged.previous_page.as_deref(), Some("p1"));
    }

    #[test]
    fn search_page_equality_is_structural() {
        let a = page(&["one"], Some("p2"), None);
        let b = page(&["one"], Some("p2"), None);
        assert_eq!(a, b);
        assert_ne!(a, page(&["one"], None, None));
    }
}
