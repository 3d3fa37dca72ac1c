//! Search queries and pre-defined catalogue filters.
//!
//! A top-level query is either a free-text search or one of the site's
//! fixed catalogue views. The variant is resolved once at construction;
//! downstream code only ever sees the tagged enum.

use std::fmt;
use std::str::FromStr;

use super::errors::SiteError;

/// Search category: whole series or individual episodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Category {
    #[default]
    Series,
    Episodes,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Series => "series",
            Category::Episodes => "episodes",
        }
    }
}

/// Top-level query dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Text { query: String, category: Category },
    Filter(CatalogueFilter),
}

impl Query {
    pub fn text(query: impl Into<String>, category: Category) -> Self {
        Query::Text {
            query: query.into(),
            category,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Query::Text { category, .. } => *category,
            // Catalogue views always list whole series.
            Query::Filter(_) => Category::Series,
        }
    }
}

/// Pre-defined catalogue views hosted at fixed paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogueFilter {
    ImdbTop250,
    Popularity,
    AiredToday,
    Trending,
    FreshSeries,
    TopRatedMiniseries,
    NetflixOriginal,
    HboOriginal,
    Cartoon,
    Genre(Genre),
    Alphabetical(AlphaRange),
}

impl CatalogueFilter {
    /// Site-relative path of the listing page.
    pub fn path(&self) -> String {
        match self {
            CatalogueFilter::ImdbTop250 => "imdbtop250.php".to_string(),
            CatalogueFilter::Popularity => "popular.php".to_string(),
            CatalogueFilter::AiredToday => "airedtoday.php".to_string(),
            CatalogueFilter::Trending => "trending.php".to_string(),
            CatalogueFilter::FreshSeries => "freshseries.php".to_string(),
            CatalogueFilter::TopRatedMiniseries => "miniseries.php".to_string(),
            CatalogueFilter::NetflixOriginal => "netorig.php".to_string(),
            CatalogueFilter::HboOriginal => "hb.php".to_string(),
            CatalogueFilter::Cartoon => "cartoon.php".to_string(),
            CatalogueFilter::Genre(genre) => format!("genre.php?genre={genre}"),
            CatalogueFilter::Alphabetical(range) => format!("tv.php?alpha={}", range.as_str()),
        }
    }

    /// Parse a CLI filter spec: a bare name (`trending`) or `name:argument`
    /// for the parameterised filters (`genre:Drama`, `alpha:AtoC`).
    pub fn parse_spec(spec: &str) -> Result<Self, SiteError> {
        let (name, arg) = match spec.split_once(':') {
            Some((n, a)) => (n.trim(), Some(a.trim())),
            None => (spec.trim(), None),
        };
        let invalid = || SiteError::InvalidResourceUrl {
            stage: "catalogue-filter",
            url: spec.to_string(),
        };
        let filter = match (name.to_ascii_lowercase().as_str(), arg) {
            ("imdb-top-250", None) => CatalogueFilter::ImdbTop250,
            ("popular", None) => CatalogueFilter::Popularity,
            ("aired-today", None) => CatalogueFilter::AiredToday,
            ("trending", None) => CatalogueFilter::Trending,
            ("fresh-series", None) => CatalogueFilter::FreshSeries,
            ("miniseries", None) => CatalogueFilter::TopRatedMiniseries,
            ("netflix", None) => CatalogueFilter::NetflixOriginal,
            ("hbo", None) => CatalogueFilter::HboOriginal,
            ("cartoon", None) => CatalogueFilter::Cartoon,
            ("genre", Some(g)) => CatalogueFilter::Genre(g.parse().map_err(|_| invalid())?),
            ("alpha", Some(r)) => CatalogueFilter::Alphabetical(r.parse().map_err(|_| invalid())?),
            _ => return Err(invalid()),
        };
        Ok(filter)
    }
}

macro_rules! genres {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Genres the site's genre view accepts.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Genre {
            $($variant,)+
        }

        impl Genre {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Genre::$variant => $name,)+
                }
            }
        }

        impl FromStr for Genre {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(if s.eq_ignore_ascii_case($name) {
                    return Ok(Genre::$variant);
                })+
                Err(())
            }
        }
    };
}

genres! {
    Action => "Action",
    Adventure => "Adventure",
    Romance => "Romance",
    Animation => "Animation",
    Cartoon => "Cartoon",
    Crime => "Crime",
    Drama => "Drama",
    Comedy => "Comedy",
    Mystery => "Mystery",
    Thriller => "Thriller",
    Fantasy => "Fantasy",
    RealityTv => "Reality-TV",
    SciFi => "Sci-Fi",
    Family => "Family",
    Documentary => "Documentary",
    Horror => "Horror",
    History => "History",
    Music => "Music",
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alphabetical title ranges of the site's A-Z view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaRange {
    AtoC,
    DtoF,
    GtoI,
    JtoL,
    MtoO,
    PtoR,
    StoU,
    VtoZ,
    Digits,
}

impl AlphaRange {
    pub fn as_str(self) -> &'static str {
        // Range tokens exactly as the site spells them, typos included.
        match self {
            AlphaRange::AtoC => "AtoC",
            AlphaRange::DtoF => "DtoC",
            AlphaRange::GtoI => "GtoI",
            AlphaRange::JtoL => "JtoL",
            AlphaRange::MtoO => "MtO",
            AlphaRange::PtoR => "PtoR",
            AlphaRange::StoU => "StoU",
            AlphaRange::VtoZ => "VtoZ",
            AlphaRange::Digits => "1to9",
        }
    }
}

impl FromStr for AlphaRange {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let all = [
            AlphaRange::AtoC,
            AlphaRange::DtoF,
            AlphaRange::GtoI,
            AlphaRange::JtoL,
            AlphaRange::MtoO,
            AlphaRange::PtoR,
            AlphaRange::StoU,
            AlphaRange::VtoZ,
            AlphaRange::Digits,
        ];
        all.into_iter()
            .find(|r| s.eq_ignore_ascii_case(r.as_str()))
            .ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_paths() {
        assert_eq!(CatalogueFilter::ImdbTop250.path(), "imdbtop250.php");
        assert_eq!(
            CatalogueFilter::Genre(Genre::SciFi).path(),
            "genre.php?genre=Sci-Fi"
        );
        assert_eq!(
            CatalogueFilter::Alphabetical(AlphaRange::Digits).path(),
            "tv.php?alpha=1to9"
        );
    }

    #[test]
    fn parse_spec_accepts_known_names() {
        assert_eq!(
            CatalogueFilter::parse_spec("trending").unwrap(),
            CatalogueFilter::Trending
        );
        assert_eq!(
            CatalogueFilter::parse_spec("genre:drama").unwrap(),
            CatalogueFilter::Genre(Genre::Drama)
        );
        assert_eq!(
            CatalogueFilter::parse_spec("alpha:atoc").unwrap(),
            CatalogueFilter::Alphabetical(AlphaRange::AtoC)
        );
    }

    #[test]
    fn parse_spec_rejects_unknown_or_malformed() {
        assert!(CatalogueFilter::parse_spec("nope").is_err());
        assert!(CatalogueFilter::parse_spec("genre:").is_err());
        assert!(CatalogueFilter::parse_spec("genre:Jazz").is_err());
        assert!(CatalogueFilter::parse_spec("trending:extra").is_err());
    }

    #[test]
    fn filter_queries_are_series_category() {
        let q = Query::Filter(CatalogueFilter::Popularity);
        assert_eq!(q.category(), Category::Series);
    }
}
