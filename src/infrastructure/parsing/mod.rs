//! HTML parsing for catalog listing and detail pages
//!
//! Parsers are pure: HTML in, candidates out, no network access. Selectors
//! are precompiled at parser construction. A malformed entry drops only that
//! entry; parsing continues with the rest of the page.

pub mod book_detail_parser;
pub mod book_list_parser;

pub use book_detail_parser::BookDetailParser;
pub use book_list_parser::{BookListParser, ListParseOutcome};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("required field missing: {0}")]
    RequiredFieldMissing(&'static str),
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    #[error("page contains no product entries")]
    NoEntries,
    #[error("could not resolve url {href} against {base}")]
    UrlResolution { base: String, href: String },
}

/// Price text like "£51.77" sometimes arrives with stray encoding artifacts
/// ("Â£51.77"), so parsing keeps only digits and dots instead of trimming a
/// known currency prefix.
pub(crate) fn normalize_price(raw: &str) -> Option<f64> {
    let cleaned: String =
        raw.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    cleaned.parse::<f64>().ok().filter(|p| p.is_finite() && *p >= 0.0)
}

/// Star ratings are encoded as a class word on the rating element.
pub(crate) fn parse_rating_word(word: &str) -> Option<u8> {
    match word {
        "One" => Some(1),
        "Two" => Some(2),
        "Three" => Some(3),
        "Four" => Some(4),
        "Five" => Some(5),
        _ => None,
    }
}

/// Stable record id from a detail URL: the catalogue path segment before
/// `index.html`, e.g. `a-light-in-the-attic_1000`.
pub(crate) fn slug_from_url(url: &url::Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty() && *s != "index.html")
        .next_back()
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("£51.77", Some(51.77))]
    #[case("Â£13.50", Some(13.50))]
    #[case("  £0.99 ", Some(0.99))]
    #[case("free", None)]
    #[case("", None)]
    fn price_normalization(#[case] raw: &str, #[case] expected: Option<f64>) {
        assert_eq!(normalize_price(raw), expected);
    }

    #[rstest]
    #[case("One", Some(1))]
    #[case("Two", Some(2))]
    #[case("Three", Some(3))]
    #[case("Four", Some(4))]
    #[case("Five", Some(5))]
    #[case("Six", None)]
    #[case("star-rating", None)]
    fn rating_word_mapping(#[case] word: &str, #[case] expected: Option<u8>) {
        assert_eq!(parse_rating_word(word), expected);
    }

    #[rstest]
    #[case("https://books.toscrape.com/catalogue/a-light-in-the-attic_1000/index.html", Some("a-light-in-the-attic_1000"))]
    #[case("https://books.toscrape.com/catalogue/soumission_998/", Some("soumission_998"))]
    #[case("https://books.toscrape.com/", None)]
    fn slug_extraction(#[case] url: &str, #[case] expected: Option<&str>) {
        let url = url::Url::parse(url).unwrap();
        assert_eq!(slug_from_url(&url).as_deref(), expected);
    }
}
