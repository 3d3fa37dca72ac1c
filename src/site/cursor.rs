//! Pagination cursor over listing pages.
//!
//! A cursor opens a listing with a query, then walks it through the
//! page's own navigation anchors. Requesting a direction the current
//! page does not offer is an error, not a silent no-op; navigating
//! before the opening query ran is a caller bug.

use tracing::debug;

use super::client::SiteClient;
use super::errors::SiteError;
use super::filters::Query;
use super::hops::{self, FetchResult, ListingRequest};
use super::models::SearchPage;
use super::parser::ListedRecord;

#[derive(Debug, Clone, Copy)]
enum NavTarget {
    First,
    Previous,
    Next,
    Last,
}

impl NavTarget {
    fn name(self) -> &'static str {
        match self {
            NavTarget::First => "first",
            NavTarget::Previous => "previous",
            NavTarget::Next => "next",
            NavTarget::Last => "last",
        }
    }
}

pub struct SearchCursor<'a, T: ListedRecord> {
    client: &'a SiteClient,
    request: ListingRequest,
    page: Option<SearchPage<T>>,
}

impl<'a, T: ListedRecord> SearchCursor<'a, T> {
    pub fn new(client: &'a SiteClient, query: &Query) -> Self {
        Self {
            client,
            request: hops::listing_request(client, query),
            page: None,
        }
    }

    /// Open a cursor directly on a listing URL, e.g. a season's episode
    /// page taken from a series detail.
    pub fn from_url(client: &'a SiteClient, url: &str) -> Self {
        Self {
            client,
            request: ListingRequest {
                url: url.to_string(),
                params: Vec::new(),
            },
            page: None,
        }
    }

    /// Issue the opening request and parse the first page.
    pub fn run(&mut self) -> FetchResult<&SearchPage<T>> {
        let html = hops::fetch_listing(self.client, &self.request)?;
        let page = T::parse_listing(&html, self.client.base_url())?;
        debug!(kind = %T::KIND, items = page.items.len(), "loaded listing page");
        Ok(self.page.insert(page))
    }

    pub fn current(&self) -> Option<&SearchPage<T>> {
        self.page.as_ref()
    }

    pub fn first_page(&mut self) -> FetchResult<&SearchPage<T>> {
        self.navigate(NavTarget::First)
    }

    pub fn previous_page(&mut self) -> FetchResult<&SearchPage<T>> {
        self.navigate(NavTarget::Previous)
    }

    pub fn next_page(&mut self) -> FetchResult<&SearchPage<T>> {
        self.navigate(NavTarget::Next)
    }

    pub fn last_page(&mut self) -> FetchResult<&SearchPage<T>> {
        self.navigate(NavTarget::Last)
    }

    fn navigate(&mut self, target: NavTarget) -> FetchResult<&SearchPage<T>> {
        let page = self
            .page
            .as_ref()
            .ok_or(SiteError::NavigationBeforeQuery)?;
        let link = match target {
            NavTarget::First => &page.first_page,
            NavTarget::Previous => &page.previous_page,
            NavTarget::Next => &page.next_page,
            NavTarget::Last => &page.last_page,
        }
        .clone()
        .ok_or(SiteError::TargetPageMissing(target.name()))?;
        self.load(&link)
    }

    fn load(&mut self, url: &str) -> FetchResult<&SearchPage<T>> {
        let request = ListingRequest {
            url: url.to_string(),
            params: Vec::new(),
        };
        let html = hops::fetch_listing(self.client, &request)?;
        let page = T::parse_listing(&html, self.client.base_url())?;
        Ok(self.page.insert(page))
    }

    /// Walk the listing page by page until `limit` items have been seen
    /// or the last page is reached. Pages are yielded whole: the limit
    /// bounds when fetching stops, it never truncates a page mid-way.
    pub fn pages(self, limit: usize) -> Pages<'a, T> {
        Pages {
            cursor: self,
            limit,
            seen: 0,
            done: false,
        }
    }

    /// Fetch up to `limit` items and merge all visited pages into one.
    pub fn fetch_all(self, limit: usize) -> FetchResult<SearchPage<T>> {
        let mut merged: Option<SearchPage<T>> = None;
        for page in self.pages(limit) {
            let page = page?;
            merged = Some(match merged {
                Some(acc) => acc.merge(page),
                None => page,
            });
        }
        merged.ok_or_else(|| SiteError::ZeroResults.into())
    }
}

/// Forward-only page iterator. Consumes its cursor; a finished walk
/// cannot be restarted.
pub struct Pages<'a, T: ListedRecord> {
    cursor: SearchCursor<'a, T>,
    limit: usize,
    seen: usize,
    done: bool,
}

impl<'a, T: ListedRecord> Iterator for Pages<'a, T> {
    type Item = FetchResult<SearchPage<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = if self.cursor.page.is_none() {
            self.cursor.run()
        } else {
            if self.seen >= self.limit {
                self.done = true;
                return None;
            }
            let has_next = self
                .cursor
                .page
                .as_ref()
                .is_some_and(|p| p.next_page.is_some());
            if !has_next {
                self.done = true;
                return None;
            }
            self.cursor.next_page()
        };
        match result {
            Ok(page) => {
                self.seen += page.items.len();
                Some(Ok(page.clone()))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_system::config::Config;
    use crate::site::errors::FetchError;
    use crate::site::filters::Category;
    use crate::site::models::SeriesRecord;

    fn client() -> SiteClient {
        SiteClient::new(Config::default()).unwrap()
    }

    fn loaded_page(next: Option<&str>) -> SearchPage<SeriesRecord> {
        SearchPage {
            items: vec![SeriesRecord {
                title: "Chuck".to_string(),
                url: "https://fztvseries.live/tvshow-12.html".to_string(),
                cover_photo: String::new(),
                about: String::new(),
            }],
            first_page: None,
            previous_page: None,
            next_page: next.map(str::to_string),
            last_page: None,
        }
    }

    #[test]
    fn navigation_before_query_is_an_error() {
        let client = client();
        let mut cursor: SearchCursor<'_, SeriesRecord> =
            SearchCursor::new(&client, &Query::text("love", Category::Series));
        let err = cursor.next_page().unwrap_err();
        assert!(matches!(
            err,
            FetchError::Fatal(SiteError::NavigationBeforeQuery)
        ));
    }

    #[test]
    fn missing_navigation_target_is_an_error() {
        let client = client();
        let mut cursor: SearchCursor<'_, SeriesRecord> =
            SearchCursor::new(&client, &Query::text("love", Category::Series));
        cursor.page = Some(loaded_page(None));
        let err = cursor.next_page().unwrap_err();
        assert!(matches!(
            err,
            FetchError::Fatal(SiteError::TargetPageMissing("next"))
        ));
    }

    #[test]
    fn pages_iterator_stops_once_limit_is_reached() {
        let client = client();
        let cursor: SearchCursor<'_, SeriesRecord> =
            SearchCursor::new(&client, &Query::text("love", Category::Series));
        let mut pages = cursor.pages(1);
        // Pretend the opening request already ran and yielded a full page
        // with a next link; the limit must stop the walk without touching
        // the network again.
        pages.cursor.page = Some(loaded_page(Some("https://fztvseries.live/search.php?page=2")));
        pages.seen = 1;
        assert!(pages.next().is_none());
    }
}
