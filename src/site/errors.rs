//! Error taxonomy for site interaction.
//!
//! `SiteError` covers transport, shape and parse faults. `FetchError` is the
//! outcome type of every page fetch: an expired download-key session is a
//! distinct variant so callers are forced to handle recovery explicitly
//! instead of retrying a stale URL.

use thiserror::Error;

use super::models::PageKind;

pub type Result<T> = std::result::Result<T, SiteError>;

#[derive(Debug, Error)]
pub enum SiteError {
    /// The landing page could not be loaded while bootstrapping the session.
    #[error("failed to load index page - ({status} : {reason})")]
    IndexLoad { status: u16, reason: String },

    /// A URL handed to a resolution hop does not match that hop's expected
    /// path shape. This is a caller/resolver bug, never retried.
    #[error("invalid {stage} url: {url}")]
    InvalidResourceUrl { stage: &'static str, url: String },

    /// A listing stage produced no items at all.
    #[error("search query returned zero results")]
    ZeroResults,

    /// The page markup did not match the expected shape.
    #[error("failed to parse {kind} page: {message}")]
    Parse { kind: PageKind, message: String },

    #[error("navigation attempted before any query was run")]
    NavigationBeforeQuery,

    /// The requested navigation target has no URL on the current page.
    #[error("the targeted page, {0}, has no url")]
    TargetPageMissing(&'static str),

    #[error("bad pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SiteError {
    pub(crate) fn parse(kind: PageKind, message: impl Into<String>) -> Self {
        Self::Parse {
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of fetching one page.
///
/// `Expired` carries the recovery link embedded in the site's
/// "download keys have expired" marker; every URL resolved under the stale
/// session is invalid and resolution must restart from that link.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("download keys expired, recover from {recovery_url}")]
    Expired { recovery_url: String },

    #[error(transparent)]
    Fatal(#[from] SiteError),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Fatal(SiteError::Http(err))
    }
}
