//! HTML page handlers.
//!
//! Each function takes the raw text of one resolved page and builds the
//! typed records for it. Markup that does not match the expected shape is
//! a protocol fault (`SiteError::Parse`), never retried.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use time::Date;
use time::macros::format_description;
use url::Url;

use super::client::resolve_url;
use super::errors::{Result, SiteError};
use super::models::{
    DownloadManifest, EpisodeFile, EpisodeRecord, PageKind, SearchPage, SeasonRecord, SeriesDetail,
    SeriesRecord,
};

/// A record type that appears as rows of a paginated listing page.
pub trait ListedRecord: Sized + Clone {
    const KIND: PageKind;

    fn parse_listing(html: &str, base: &Url) -> Result<SearchPage<Self>>;
}

impl ListedRecord for SeriesRecord {
    const KIND: PageKind = PageKind::SeriesList;

    fn parse_listing(html: &str, base: &Url) -> Result<SearchPage<Self>> {
        series_list(html, base)
    }
}

impl ListedRecord for EpisodeRecord {
    const KIND: PageKind = PageKind::EpisodeList;

    fn parse_listing(html: &str, base: &Url) -> Result<SearchPage<Self>> {
        episode_list(html, base)
    }
}

/// Parse a series-list page (search results or catalogue view).
///
/// Series rows are `div.mainbox3` blocks; the first two such blocks on
/// every page are layout chrome, not results.
pub fn series_list(html: &str, base: &Url) -> Result<SearchPage<SeriesRecord>> {
    let kind = PageKind::SeriesList;
    let doc = Html::parse_document(html);
    let row_sel = selector("div.mainbox3")?;

    let mut items = Vec::new();
    for row in doc.select(&row_sel).skip(2) {
        let span = first(&row, "span", kind)?;
        let link = first(&span, "a", kind)?;
        let title = text_of(&first(&link, "small b", kind)?);
        let url = attr_of(&link, "href", kind)?;
        let cover_photo = attr_of(&first(&row, "img", kind)?, "src", kind)?;
        let about = span
            .select(&selector("small")?)
            .last()
            .map(|el| text_of(&el))
            .unwrap_or_default();
        items.push(SeriesRecord {
            title,
            url: resolve_url(base, &url),
            cover_photo: resolve_url(base, &cover_photo),
            about,
        });
    }
    if items.is_empty() {
        return Err(SiteError::ZeroResults);
    }

    let nav = page_navigation(&doc, base)?;
    Ok(nav.into_page(items))
}

/// Parse an episode-list page (episode search results or one season's
/// episode listing — both share the `div.mainbox` row markup).
pub fn episode_list(html: &str, base: &Url) -> Result<SearchPage<EpisodeRecord>> {
    let kind = PageKind::EpisodeList;
    let doc = Html::parse_document(html);
    let row_sel = selector("div.mainbox")?;
    let small_sel = selector("small")?;
    let date_fmt = format_description!("[year]-[month]-[day]");

    let mut items = Vec::new();
    for row in doc.select(&row_sel) {
        let cover_photo = attr_of(&first(&row, "img", kind)?, "src", kind)?;
        let span = first(&row, "span", kind)?;
        let title = text_of(&first(&span, "small b", kind)?);

        let mut files = Vec::new();
        for anchor in span.select(&selector("a")?) {
            let href = attr_of(&anchor, "href", kind)?;
            files.push(EpisodeFile {
                url: resolve_url(base, &href),
                identity: file_identity(&text_of(&anchor)),
            });
        }
        if files.is_empty() {
            return Err(SiteError::parse(kind, format!("episode '{title}' has no file links")));
        }

        // The air date sits inside the only <i> element of the block,
        // as the second token, with a trailing parenthesis.
        let mut aired_on = None;
        for small in span.select(&small_sel) {
            if let Some(i) = small.select(&selector("i")?).next() {
                let raw = text_of(&i);
                if let Some(token) = raw.split_whitespace().nth(1) {
                    aired_on = Date::parse(token.trim_end_matches(')'), &date_fmt).ok();
                }
            }
        }

        let (about, stars, director, writer) = span
            .select(&small_sel)
            .last()
            .map(|el| parse_episode_metadata(&el.inner_html()))
            .unwrap_or_default();

        items.push(EpisodeRecord {
            title,
            files,
            cover_photo: resolve_url(base, &cover_photo),
            aired_on,
            about,
            stars,
            director,
            writer,
        });
    }
    if items.is_empty() {
        return Err(SiteError::ZeroResults);
    }

    let nav = page_navigation(&doc, base)?;
    Ok(nav.into_page(items))
}

/// Parse a series detail page into its metadata and ordered season links.
pub fn series_detail(html: &str, base: &Url) -> Result<SeriesDetail> {
    let doc = Html::parse_document(html);
    let plain = doc.root_element().text().collect::<String>();

    let heading_sel = selector("h1")?;
    let title_sel = selector("title")?;
    let title = doc
        .select(&heading_sel)
        .next()
        .or_else(|| doc.select(&title_sel).next())
        .map(|el| text_of(&el))
        .ok_or_else(|| SiteError::parse(PageKind::SeriesDetail, "missing page title"))?;

    let anchor_sel = selector("a")?;
    let mut seasons = Vec::new();
    for anchor in doc.select(&anchor_sel) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !href.contains("files-") {
            continue;
        }
        let ordinal = seasons.len() + 1;
        let label = match text_of(&anchor) {
            label if label.is_empty() => format!("Season {ordinal}"),
            label => label,
        };
        seasons.push(SeasonRecord {
            url: resolve_url(base, href),
            label,
            ordinal,
        });
    }
    if seasons.is_empty() {
        return Err(SiteError::ZeroResults);
    }

    let mut genres = Vec::new();
    for anchor in doc.select(&anchor_sel) {
        if anchor
            .value()
            .attr("href")
            .is_some_and(|href| href.contains("genre.php"))
        {
            let genre = text_of(&anchor);
            if !genre.is_empty() && !genres.contains(&genre) {
                genres.push(genre);
            }
        }
    }

    let synopsis = doc
        .select(&selector(r#"meta[name="description"]"#)?)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .or_else(|| {
            selector("small").ok().and_then(|sel| {
                doc.select(&sel)
                    .map(|el| text_of(&el))
                    .max_by_key(String::len)
            })
        })
        .unwrap_or_default();

    let year = capture(&plain, r"(?i)\byear\b\D{0,10}((?:19|20)\d{2})")?;
    let rating = capture(&plain, r"(\d+(?:\.\d+)?)\s*/\s*10")?;
    let last_updated = capture(
        &plain,
        r"(?i)last\s*updated\s*(?:on|:)?\s*(\d{1,2}\s+[A-Za-z]+\s+\d{4}|\d{4}-\d{2}-\d{2})",
    )?;

    Ok(SeriesDetail {
        title,
        genres,
        year,
        synopsis,
        rating,
        last_updated,
        seasons,
    })
}

/// Extract the single anti-hotlink indirection anchor from the first
/// download page. Its target is the actual download-links page.
pub fn download_intermediate_link(html: &str, base: &Url) -> Result<String> {
    let doc = Html::parse_document(html);
    for anchor in doc.select(&selector("a")?) {
        if let Some(href) = anchor.value().attr("href") {
            if href.contains("filelink.php?sn=") {
                return Ok(resolve_url(base, href));
            }
        }
    }
    Err(SiteError::parse(
        PageKind::LinkIntermediate,
        "no filelink anchor found",
    ))
}

/// Parse the download-links page into candidate URLs plus file metadata.
pub fn download_manifest(html: &str, base: &Url) -> Result<DownloadManifest> {
    let kind = PageKind::LinkIntermediate;
    let doc = Html::parse_document(html);
    let anchor_sel = selector("a")?;

    // Direct-link anchors carry dlink1/dlink2 ids; older pages fall back
    // to plain anchors pointing at the download handler.
    let mut links: Vec<String> = doc
        .select(&anchor_sel)
        .filter(|a| {
            a.value()
                .attr("id")
                .is_some_and(|id| id.starts_with("dlink"))
        })
        .filter_map(|a| a.value().attr("href"))
        .map(|href| resolve_url(base, href))
        .collect();
    if links.is_empty() {
        links = doc
            .select(&anchor_sel)
            .filter_map(|a| a.value().attr("href"))
            .filter(|href| href.to_ascii_lowercase().contains("download"))
            .map(|href| resolve_url(base, href))
            .collect();
    }
    if links.is_empty() {
        return Err(SiteError::parse(kind, "no candidate download links found"));
    }

    let plain = doc.root_element().text().collect::<String>();
    let filename = capture(
        &plain,
        r"(?i)([\w][\w .,'&\-\(\)\[\]]*\.(?:mp4|webm|mkv|avi|3gp))",
    )?
    .map(|name| name.trim().to_string())
    .or_else(|| {
        links
            .first()
            .and_then(|link| link.rsplit('/').next())
            .map(str::to_string)
    })
    .ok_or_else(|| SiteError::parse(kind, "no filename found"))?;

    let size = capture(&plain, r"(?i)(\d+(?:\.\d+)?\s*[KMG]B)")?.unwrap_or_default();
    let hits = capture(&plain, r"(?i)(\d[\d,]*)\s*(?:downloads|hits)")?
        .and_then(|raw| raw.replace(',', "").parse::<u64>().ok());

    Ok(DownloadManifest {
        links,
        filename,
        size,
        hits,
    })
}

/// Extract the direct file URL from the final page's client-side redirect
/// (`location.href='<url>'`). No further fetch happens after this.
pub fn final_link(html: &str) -> Result<String> {
    let re = Regex::new(r#"location\.href\s*=\s*['"]([^'"]+)['"]"#)?;
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| SiteError::parse(PageKind::FinalLink, "no location.href redirect found"))
}

/// Split the trailing metadata block of an episode row into its
/// about/stars/director/writer lines. The block is plain text separated
/// by `<br/>` tags with labelled `Stars:`/`Director(s):`/`Writer(s):`
/// lines after the synopsis.
pub(crate) fn parse_episode_metadata(
    fragment: &str,
) -> (
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
) {
    let Ok(tag_re) = Regex::new(r"<[^>]*>") else {
        return (None, None, None, None);
    };
    let mut about = None;
    let mut stars = None;
    let mut director = None;
    let mut writer = None;

    let flattened = tag_re.replace_all(fragment, "\n");
    for line in flattened.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(rest) = line.strip_prefix("Stars:") {
            stars = non_empty(rest);
        } else if let Some(rest) = line.strip_prefix("Director(s):") {
            director = non_empty(rest);
        } else if let Some(rest) = line.strip_prefix("Writer(s):") {
            writer = non_empty(rest);
        } else if about.is_none() {
            about = non_empty(line);
        }
    }
    (about, stars, director, writer)
}

// ── page navigation ────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct NavLinks {
    first: Option<String>,
    previous: Option<String>,
    next: Option<String>,
    last: Option<String>,
}

impl NavLinks {
    fn into_page<T>(self, items: Vec<T>) -> SearchPage<T> {
        SearchPage {
            items,
            first_page: self.first,
            previous_page: self.previous,
            next_page: self.next,
            last_page: self.last,
        }
    }
}

/// Navigation links live in the last `div.mainbox2` block, and only on
/// pages that have more than three such blocks; shorter pages are
/// single-page listings.
fn page_navigation(doc: &Html, base: &Url) -> Result<NavLinks> {
    let block_sel = selector("div.mainbox2")?;
    let anchor_sel = selector("a")?;
    let blocks: Vec<_> = doc.select(&block_sel).collect();

    let mut nav = NavLinks::default();
    if blocks.len() > 3 {
        if let Some(navigator) = blocks.last() {
            for anchor in navigator.select(&anchor_sel) {
                let Some(href) = anchor.value().attr("href") else {
                    continue;
                };
                let url = Some(resolve_url(base, href));
                match text_of(&anchor).as_str() {
                    "First" => nav.first = url,
                    "Prev" => nav.previous = url,
                    "Next" => nav.next = url,
                    "Last" => nav.last = url,
                    _ => {}
                }
            }
        }
    }
    Ok(nav)
}

// ── small helpers ──────────────────────────────────────────────────────

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| SiteError::Selector {
        selector: css.to_string(),
        message: format!("{e:?}"),
    })
}

fn first<'a>(el: &ElementRef<'a>, css: &str, kind: PageKind) -> Result<ElementRef<'a>> {
    el.select(&selector(css)?)
        .next()
        .ok_or_else(|| SiteError::parse(kind, format!("missing '{css}' element")))
}

fn text_of(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn attr_of(el: &ElementRef<'_>, name: &str, kind: PageKind) -> Result<String> {
    el.value()
        .attr(name)
        .map(str::to_string)
        .ok_or_else(|| SiteError::parse(kind, format!("missing '{name}' attribute")))
}

/// The quality tag is the last character of the anchor text once the
/// leading bracket is dropped, e.g. `"(p)"` tags High MP4.
fn file_identity(text: &str) -> String {
    text.trim()
        .chars()
        .skip(1)
        .filter(|c| c.is_ascii_alphanumeric())
        .last()
        .map(String::from)
        .unwrap_or_default()
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn capture(text: &str, pattern: &str) -> Result<Option<String>> {
    let re = Regex::new(pattern)?;
    Ok(re
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://fztvseries.live/").unwrap()
    }

    const SERIES_PAGE: &str = r#"
        <div class="mainbox3">chrome</div>
        <div class="mainbox3">chrome</div>
        <div class="mainbox3">
          <img src="/covers/chuck.jpg"/>
          <span>
            <a href="/tvshow-12.html"><small><b>Chuck</b></small></a>
            <small>A computer geek becomes a spy.</small>
          </span>
        </div>
        <div class="mainbox2">x</div>
        <div class="mainbox2">x</div>
        <div class="mainbox2">x</div>
        <div class="mainbox2">
          <a href="/search.php?page=1">First</a>
          <a href="/search.php?page=2">Next</a>
          <a href="/search.php?page=9">Last</a>
        </div>
    "#;

    const EPISODE_PAGE: &str = r#"
        <div class="mainbox">
          <img src="/covers/chuck-s01.jpg"/>
          <span>
            <small><b>Chuck - S01E01 - Pilot</b></small>
            <a href="/file-100.html">(p)</a>
            <a href="/file-101.html">(w)</a>
            <small><i>(Aired 2007-09-24)</i></small>
            <small>Chuck receives an email.<br/><br/>Stars: Zachary Levi<br/>Director(s): McG<br/>Writer(s): Josh Schwartz</small>
          </span>
        </div>
    "#;

    #[test]
    fn series_list_extracts_rows_and_navigation() {
        let page = series_list(SERIES_PAGE, &base()).unwrap();
        assert_eq!(page.items.len(), 1);
        let series = &page.items[0];
        assert_eq!(series.title, "Chuck");
        assert_eq!(series.url, "https://fztvseries.live/tvshow-12.html");
        assert_eq!(series.cover_photo, "https://fztvseries.live/covers/chuck.jpg");
        assert_eq!(series.about, "A computer geek becomes a spy.");
        assert_eq!(
            page.next_page.as_deref(),
            Some("https://fztvseries.live/search.php?page=2")
        );
        assert!(page.previous_page.is_none());
        assert!(page.last_page.is_some());
    }

    #[test]
    fn series_list_with_no_rows_is_zero_results() {
        let html = r#"<div class="mainbox3">a</div><div class="mainbox3">b</div>"#;
        assert!(matches!(
            series_list(html, &base()),
            Err(SiteError::ZeroResults)
        ));
    }

    #[test]
    fn episode_list_extracts_files_date_and_metadata() {
        let page = episode_list(EPISODE_PAGE, &base()).unwrap();
        assert_eq!(page.items.len(), 1);
        let episode = &page.items[0];
        assert_eq!(episode.title, "Chuck - S01E01 - Pilot");
        assert_eq!(episode.files.len(), 2);
        assert_eq!(episode.files[0].identity, "p");
        assert_eq!(episode.files[1].identity, "w");
        assert_eq!(episode.files[0].url, "https://fztvseries.live/file-100.html");
        let aired = episode.aired_on.unwrap();
        assert_eq!((aired.year(), aired.month() as u8, aired.day()), (2007, 9, 24));
        assert_eq!(episode.about.as_deref(), Some("Chuck receives an email."));
        assert_eq!(episode.stars.as_deref(), Some("Zachary Levi"));
        assert_eq!(episode.director.as_deref(), Some("McG"));
        assert_eq!(episode.writer.as_deref(), Some("Josh Schwartz"));
        // Single page: no navigation block.
        assert!(page.next_page.is_none() && page.first_page.is_none());
    }

    #[test]
    fn file_identity_is_the_last_tag_letter() {
        assert_eq!(file_identity("(p)"), "p");
        assert_eq!(file_identity(" (w) "), "w");
        assert_eq!(file_identity("Episode 4 (p)"), "p");
        assert_eq!(file_identity(""), "");
    }

    #[test]
    fn episode_metadata_handles_compact_markup() {
        let fragment = concat!(
            "The episode begins with a flashback.",
            "<br/><br/>Stars: Zachary Levi,Yvonne Strahovski",
            "<br/>Director(s): Josh Schwartz",
            "<br/>Writer(s): Chris Fedak",
        );
        let (about, stars, director, writer) = parse_episode_metadata(fragment);
        assert_eq!(about.as_deref(), Some("The episode begins with a flashback."));
        assert_eq!(stars.as_deref(), Some("Zachary Levi,Yvonne Strahovski"));
        assert_eq!(director.as_deref(), Some("Josh Schwartz"));
        assert_eq!(writer.as_deref(), Some("Chris Fedak"));
    }

    #[test]
    fn series_detail_collects_seasons_in_order() {
        let html = r#"
            <title>Chuck</title>
            <h1>Chuck</h1>
            <meta name="description" content="A geek becomes a spy."/>
            <a href="/genre.php?genre=Action">Action</a>
            <a href="/genre.php?genre=Comedy">Comedy</a>
            Year: 2007 Rating: 8.2/10 Last updated: 27 January 2012
            <a href="/files-1.html">Season 1</a>
            <a href="/files-2.html">Season 2</a>
        "#;
        let detail = series_detail(html, &base()).unwrap();
        assert_eq!(detail.title, "Chuck");
        assert_eq!(detail.genres, vec!["Action", "Comedy"]);
        assert_eq!(detail.year.as_deref(), Some("2007"));
        assert_eq!(detail.rating.as_deref(), Some("8.2"));
        assert_eq!(detail.last_updated.as_deref(), Some("27 January 2012"));
        assert_eq!(detail.seasons.len(), 2);
        assert_eq!(detail.seasons[0].label, "Season 1");
        assert_eq!(detail.seasons[0].ordinal, 1);
        assert_eq!(detail.seasons[1].url, "https://fztvseries.live/files-2.html");
    }

    #[test]
    fn series_detail_without_seasons_is_zero_results() {
        assert!(matches!(
            series_detail("<h1>Gone</h1>", &base()),
            Err(SiteError::ZeroResults)
        ));
    }

    #[test]
    fn intermediate_link_must_match_filelink_shape() {
        let html = r#"
            <a href="/other.php">nope</a>
            <a href="/filelink.php?sn=abc123">continue</a>
        "#;
        assert_eq!(
            download_intermediate_link(html, &base()).unwrap(),
            "https://fztvseries.live/filelink.php?sn=abc123"
        );
        assert!(download_intermediate_link("<a href='/x.php'>x</a>", &base()).is_err());
    }

    #[test]
    fn manifest_prefers_dlink_anchors() {
        let html = r#"
            Chuck - S01E01 - Pilot.mp4 (48.3 MB) 1,234 downloads
            <a id="dlink1" href="/dl/one">Download 1</a>
            <a id="dlink2" href="/dl/two">Download 2</a>
        "#;
        let manifest = download_manifest(html, &base()).unwrap();
        assert_eq!(manifest.links.len(), 2);
        assert_eq!(manifest.links[0], "https://fztvseries.live/dl/one");
        assert_eq!(manifest.filename, "Chuck - S01E01 - Pilot.mp4");
        assert_eq!(manifest.size, "48.3 MB");
        assert_eq!(manifest.hits, Some(1234));
    }

    #[test]
    fn final_link_extracts_redirect_target() {
        let html = "<script>location.href='https://cdn.example/Chuck.S01E01.mp4';</script>";
        assert_eq!(
            final_link(html).unwrap(),
            "https://cdn.example/Chuck.S01E01.mp4"
        );
        assert!(final_link("<script>var x = 1;</script>").is_err());
    }
}
