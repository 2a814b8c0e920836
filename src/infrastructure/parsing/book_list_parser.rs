//! Listing-page parser
//!
//! Extracts book candidates from one catalog listing page along with the
//! pagination facts needed for page discovery ("Page 1 of 50" plus the
//! presence of a next link).

use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

use crate::domain::book::{Availability, BookCandidate};
use crate::infrastructure::parsing::{
    normalize_price, parse_rating_word, slug_from_url, ParseError,
};

/// Result of parsing one listing page. Candidate-level failures are absorbed
/// into `failures` so one bad entry never hides the rest of the page.
#[derive(Debug, Clone)]
pub struct ListParseOutcome {
    pub candidates: Vec<BookCandidate>,
    /// Reasons for entries that could not be parsed.
    pub failures: Vec<String>,
    /// Parsed from the pager text; absent on single-page catalogs.
    pub total_pages: Option<u32>,
    pub has_next: bool,
}

/// Parser with precompiled selectors for the listing-page markup.
pub struct BookListParser {
    entry: Selector,
    title_link: Selector,
    price: Selector,
    rating: Selector,
    availability: Selector,
    thumbnail: Selector,
    pager_current: Selector,
    pager_next: Selector,
}

impl BookListParser {
    pub fn new() -> Result<Self, ParseError> {
        let sel = |s: &str| {
            Selector::parse(s).map_err(|e| ParseError::InvalidSelector(format!("{s}: {e}")))
        };
        Ok(Self {
            entry: sel("article.product_pod")?,
            title_link: sel("h3 a")?,
            price: sel("p.price_color")?,
            rating: sel("p.star-rating")?,
            availability: sel("p.instock.availability")?,
            thumbnail: sel("div.image_container img")?,
            pager_current: sel("ul.pager li.current")?,
            pager_next: sel("ul.pager li.next a")?,
        })
    }

    /// Parse one listing page. `page_url` is the URL the page was fetched
    /// from; relative links resolve against it.
    pub fn parse(&self, html: &str, page_url: &str) -> Result<ListParseOutcome, ParseError> {
        let base = Url::parse(page_url).map_err(|_| ParseError::UrlResolution {
            base: page_url.to_string(),
            href: String::new(),
        })?;
        let document = Html::parse_document(html);

        let mut candidates = Vec::new();
        let mut failures = Vec::new();
        let mut entries = 0usize;

        for entry in document.select(&self.entry) {
            entries += 1;
            match self.parse_entry(entry, &base) {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => {
                    warn!(page = page_url, error = %e, "dropping malformed listing entry");
                    failures.push(e.to_string());
                }
            }
        }

        if entries == 0 {
            return Err(ParseError::NoEntries);
        }

        let total_pages = document
            .select(&self.pager_current)
            .next()
            .and_then(|el| Self::total_from_pager(&el.text().collect::<String>()));
        let has_next = document.select(&self.pager_next).next().is_some();

        Ok(ListParseOutcome { candidates, failures, total_pages, has_next })
    }

    fn parse_entry(&self, entry: ElementRef<'_>, base: &Url) -> Result<BookCandidate, ParseError> {
        let link = entry
            .select(&self.title_link)
            .next()
            .ok_or(ParseError::RequiredFieldMissing("title link"))?;

        // The anchor text is truncated with an ellipsis; the title attribute
        // carries the full title. An empty attribute counts as absent so the
        // entry is dropped rather than stored without a title.
        let title = link
            .value()
            .attr("title")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| {
                let text = link.text().collect::<String>().trim().to_string();
                (!text.is_empty()).then_some(text)
            })
            .ok_or(ParseError::RequiredFieldMissing("title"))?;

        let href = link
            .value()
            .attr("href")
            .ok_or(ParseError::RequiredFieldMissing("detail link"))?;
        let source_url = base.join(href).map_err(|_| ParseError::UrlResolution {
            base: base.to_string(),
            href: href.to_string(),
        })?;
        let id = slug_from_url(&source_url)
            .ok_or(ParseError::RequiredFieldMissing("catalogue slug"))?;

        let price = entry
            .select(&self.price)
            .next()
            .and_then(|el| normalize_price(&el.text().collect::<String>()));

        let rating = entry.select(&self.rating).next().and_then(|el| {
            el.value()
                .classes()
                .find_map(parse_rating_word)
        });

        let in_stock = entry
            .select(&self.availability)
            .next()
            .map(|el| el.text().collect::<String>().to_lowercase().contains("in stock"))
            .unwrap_or(false);

        let image_url = entry
            .select(&self.thumbnail)
            .next()
            .and_then(|el| el.value().attr("src"))
            .and_then(|src| base.join(src).ok())
            .map(|u| u.to_string());

        Ok(BookCandidate {
            id,
            title,
            category: None,
            price,
            rating,
            availability: if in_stock {
                Availability::in_stock(None)
            } else {
                Availability::out_of_stock()
            },
            description: None,
            image_url,
            source_url: source_url.to_string(),
        })
    }

    /// Pager text reads "Page 1 of 50".
    fn total_from_pager(text: &str) -> Option<u32> {
        let mut words = text.split_whitespace();
        while let Some(word) = words.next() {
            if word.eq_ignore_ascii_case("of") {
                return words.next().and_then(|n| n.parse().ok());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://books.toscrape.com/catalogue/page-1.html";

    fn pod(title: &str, slug: &str, price: &str, rating: &str, stock: &str) -> String {
        format!(
            r#"<article class="product_pod">
                 <div class="image_container">
                   <a href="{slug}/index.html"><img src="../media/{slug}.jpg"/></a>
                 </div>
                 <p class="star-rating {rating}"></p>
                 <h3><a href="{slug}/index.html" title="{title}">{title}</a></h3>
                 <div class="product_price">
                   <p class="price_color">{price}</p>
                   <p class="instock availability"><i class="icon-ok"></i> {stock}</p>
                 </div>
               </article>"#
        )
    }

    fn page(pods: &[String], pager: &str) -> String {
        format!("<html><body><section>{}</section>{pager}</body></html>", pods.join("\n"))
    }

    #[test]
    fn parses_entries_and_pagination() {
        let html = page(
            &[
                pod("A Light in the Attic", "a-light-in-the-attic_1000", "£51.77", "Three", "In stock"),
                pod("Tipping the Velvet", "tipping-the-velvet_999", "£53.74", "One", "In stock"),
            ],
            r#"<ul class="pager">
                 <li class="current">Page 1 of 50</li>
                 <li class="next"><a href="page-2.html">next</a></li>
               </ul>"#,
        );

        let parser = BookListParser::new().unwrap();
        let outcome = parser.parse(&html, PAGE_URL).unwrap();

        assert_eq!(outcome.candidates.len(), 2);
        assert_eq!(outcome.total_pages, Some(50));
        assert!(outcome.has_next);
        assert!(outcome.failures.is_empty());

        let first = &outcome.candidates[0];
        assert_eq!(first.id, "a-light-in-the-attic_1000");
        assert_eq!(first.title, "A Light in the Attic");
        assert_eq!(first.price, Some(51.77));
        assert_eq!(first.rating, Some(3));
        assert!(first.availability.in_stock);
        assert_eq!(
            first.source_url,
            "https://books.toscrape.com/catalogue/a-light-in-the-attic_1000/index.html"
        );
        assert_eq!(
            first.image_url.as_deref(),
            Some("https://books.toscrape.com/media/a-light-in-the-attic_1000.jpg")
        );
    }

    #[test]
    fn malformed_entry_drops_only_that_entry() {
        let broken = r#"<article class="product_pod"><h3>no link here</h3></article>"#.to_string();
        let html = page(
            &[broken, pod("Soumission", "soumission_998", "£50.10", "One", "In stock")],
            "",
        );

        let parser = BookListParser::new().unwrap();
        let outcome = parser.parse(&html, PAGE_URL).unwrap();

        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.candidates[0].id, "soumission_998");
    }

    #[test]
    fn empty_title_attribute_drops_the_entry() {
        let empty_title = r#"<article class="product_pod">
            <h3><a href="ghost_7/index.html" title=""></a></h3>
            <p class="price_color">£9.99</p>
        </article>"#
            .to_string();
        let html = page(
            &[empty_title, pod("Soumission", "soumission_998", "£50.10", "One", "In stock")],
            "",
        );

        let parser = BookListParser::new().unwrap();
        let outcome = parser.parse(&html, PAGE_URL).unwrap();

        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.candidates[0].id, "soumission_998");
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].contains("title"));
    }

    #[test]
    fn unparseable_price_and_rating_become_absent() {
        let html = page(&[pod("Odd", "odd_1", "call us", "Zero", "In stock")], "");
        let parser = BookListParser::new().unwrap();
        let outcome = parser.parse(&html, PAGE_URL).unwrap();
        let c = &outcome.candidates[0];
        assert_eq!(c.price, None);
        assert_eq!(c.rating, None);
    }

    #[test]
    fn empty_page_is_an_error() {
        let parser = BookListParser::new().unwrap();
        let result = parser.parse("<html><body></body></html>", PAGE_URL);
        assert!(matches!(result, Err(ParseError::NoEntries)));
    }

    #[test]
    fn last_page_has_no_next_link() {
        let html = page(
            &[pod("End", "end_1", "£9.99", "Five", "In stock")],
            r#"<ul class="pager"><li class="current">Page 50 of 50</li></ul>"#,
        );
        let parser = BookListParser::new().unwrap();
        let outcome = parser.parse(&html, PAGE_URL).unwrap();
        assert_eq!(outcome.total_pages, Some(50));
        assert!(!outcome.has_next);
    }
}
