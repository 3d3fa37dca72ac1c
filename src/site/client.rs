//! Shared blocking HTTP client with session bootstrap and expiry detection.
//!
//! One `SiteClient` is built per process and passed by reference everywhere.
//! It owns the only two pieces of shared mutable transport state: the
//! session cookie (written once by `ensure_session`) and the outbound
//! byte-range header (written and always cleared by the transfer engine).

use std::cell::{Cell, RefCell};
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, RANGE, REFERER, USER_AGENT};
use tracing::{debug, warn};
use url::Url;

use crate::base_system::config::Config;

use super::errors::{FetchError, Result, SiteError};

const SESSION_EXPIRED_MARKER: &str = "Your download keys have expired";

pub struct SiteClient {
    http: Client,
    config: Config,
    base: Url,
    session_ready: Cell<bool>,
    // Interior mutability is fine here: execution is single-threaded and
    // the client is shared by reference across the resolver and the
    // transfer engine.
    extra_headers: RefCell<HeaderMap>,
}

impl SiteClient {
    pub fn new(config: Config) -> Result<Self> {
        let base = Url::parse(&config.site_url).map_err(|_| SiteError::InvalidResourceUrl {
            stage: "site-url",
            url: config.site_url.clone(),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        if let Ok(referer) = HeaderValue::from_str(base.as_str()) {
            headers.insert(REFERER, referer);
        }

        let http = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            http,
            config,
            base,
            session_ready: Cell::new(false),
            extra_headers: RefCell::new(HeaderMap::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Bootstrap the server-side session by loading the landing page once.
    ///
    /// A no-op when the session already exists; the cookie lives in the
    /// client's store for the rest of the process.
    pub fn ensure_session(&self) -> Result<()> {
        if self.session_ready.get() {
            return Ok(());
        }
        debug!("initializing session");
        let resp = self
            .http
            .get(self.base.as_str())
            .timeout(self.config.request_timeout())
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SiteError::IndexLoad {
                status: status.as_u16(),
                reason: status
                    .canonical_reason()
                    .unwrap_or("unknown reason")
                    .to_string(),
            });
        }
        self.session_ready.set(true);
        Ok(())
    }

    /// Fetch one page of HTML, bootstrapping the session first.
    ///
    /// Every hop goes through here so the expired-download-keys marker is
    /// caught no matter which page it surfaces on.
    pub fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        query: Option<&[(&str, &str)]>,
    ) -> std::result::Result<String, FetchError> {
        self.ensure_session()?;

        let mut request = self
            .http
            .get(url)
            .timeout(timeout)
            .headers(self.extra_headers.borrow().clone());
        if let Some(params) = query {
            request = request.query(params);
        }

        let resp = request.send()?.error_for_status()?;
        let is_html = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/html"))
            .unwrap_or(false);
        let text = resp.text().map_err(SiteError::Http)?;

        if is_html {
            if let Some(recovery_url) = detect_expiry(&text, &self.base) {
                warn!(recovery_url, "download keys expired");
                return Err(FetchError::Expired { recovery_url });
            }
        }
        Ok(text)
    }

    /// Issue a streaming GET for a binary transfer.
    ///
    /// Unlike `fetch`, the body is not buffered and not scanned; the
    /// transfer engine consumes it chunk by chunk.
    pub(crate) fn get_stream(&self, url: &str, timeout: Duration) -> Result<Response> {
        self.ensure_session()?;
        let resp = self
            .http
            .get(url)
            .timeout(timeout)
            .headers(self.extra_headers.borrow().clone())
            .send()?
            .error_for_status()?;
        Ok(resp)
    }

    /// Resolve a possibly-relative URL against the site root.
    pub fn absolute_url(&self, raw: &str) -> String {
        resolve_url(&self.base, raw)
    }

    // ── byte-range header slot ─────────────────────────────────────────

    /// Ask all subsequent requests to resume from `offset` bytes.
    ///
    /// The transfer engine must undo this on every exit path; see
    /// `download::transfer::RangeGuard`.
    pub(crate) fn set_resume_offset(&self, offset: u64) {
        if let Ok(value) = HeaderValue::from_str(&format!("bytes={offset}-")) {
            self.extra_headers.borrow_mut().insert(RANGE, value);
        }
    }

    pub(crate) fn clear_resume_offset(&self) {
        self.extra_headers.borrow_mut().remove(RANGE);
    }

    #[cfg(test)]
    pub(crate) fn mark_session_ready(&self) {
        self.session_ready.set(true);
    }

    /// The currently pending range header, if any. Exposed for the
    /// cleanup invariant; normal callers never need it.
    pub fn resume_range(&self) -> Option<String> {
        self.extra_headers
            .borrow()
            .get(RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

/// Resolve `raw` against `base`, keeping already-absolute URLs as-is.
pub(crate) fn resolve_url(base: &Url, raw: &str) -> String {
    match base.join(raw) {
        Ok(url) => url.to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Scan an HTML body for the session-expiry marker and pull out the
/// recovery link embedded next to it.
fn detect_expiry(html: &str, base: &Url) -> Option<String> {
    if !html.contains(SESSION_EXPIRED_MARKER) {
        return None;
    }
    let line = html
        .lines()
        .find(|line| line.contains(SESSION_EXPIRED_MARKER))
        .unwrap_or(html);
    let href = Regex::new(r#"<a[^>]*href=["']([^"']+)["']"#)
        .ok()
        .and_then(|re| re.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    // A marker without a usable link still means the keys are stale;
    // recovery then restarts from the site root.
    Some(match href {
        Some(rel) => resolve_url(base, &rel),
        None => base.to_string(),
    })
}
