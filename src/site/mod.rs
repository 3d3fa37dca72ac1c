//! Everything that talks to or understands the series site: the shared
//! HTTP client, the page parsers, the hop functions of the resolution
//! chain and the pagination cursor over listings.

pub mod client;
pub mod cursor;
pub mod errors;
pub mod filters;
pub mod hops;
pub mod models;
pub mod parser;

pub use client::SiteClient;
pub use cursor::SearchCursor;
pub use errors::{FetchError, SiteError};
pub use filters::{CatalogueFilter, Category, Query};
