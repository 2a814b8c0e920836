//! Detail-page parser
//!
//! A detail page is the authoritative source for the category (third
//! breadcrumb entry), the description and the exact stock count. The parser
//! produces a candidate that the listing candidate is enriched from.

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::domain::book::{Availability, BookCandidate};
use crate::infrastructure::parsing::{
    normalize_price, parse_rating_word, slug_from_url, ParseError,
};

pub struct BookDetailParser {
    title: Selector,
    breadcrumb_category: Selector,
    price: Selector,
    rating: Selector,
    availability: Selector,
    description: Selector,
    image: Selector,
    stock_count: Regex,
}

impl BookDetailParser {
    pub fn new() -> Result<Self, ParseError> {
        let sel = |s: &str| {
            Selector::parse(s).map_err(|e| ParseError::InvalidSelector(format!("{s}: {e}")))
        };
        Ok(Self {
            title: sel("div.product_main h1")?,
            // Breadcrumb reads Home / Books / <category> / <title>.
            breadcrumb_category: sel("ul.breadcrumb li:nth-child(3) a")?,
            price: sel("div.product_main p.price_color")?,
            rating: sel("div.product_main p.star-rating")?,
            availability: sel("div.product_main p.instock.availability")?,
            description: sel("#product_description + p")?,
            image: sel("#product_gallery img, div.item.active img")?,
            stock_count: Regex::new(r"\((\d+)\s+available\)")
                .map_err(|e| ParseError::InvalidSelector(e.to_string()))?,
        })
    }

    /// Parse one detail page fetched from `page_url`.
    pub fn parse(&self, html: &str, page_url: &str) -> Result<BookCandidate, ParseError> {
        let base = Url::parse(page_url).map_err(|_| ParseError::UrlResolution {
            base: page_url.to_string(),
            href: String::new(),
        })?;
        let id = slug_from_url(&base).ok_or(ParseError::RequiredFieldMissing("catalogue slug"))?;
        let document = Html::parse_document(html);

        let title = document
            .select(&self.title)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ParseError::RequiredFieldMissing("title"))?;

        let category = document
            .select(&self.breadcrumb_category)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|c| !c.is_empty());

        let price = document
            .select(&self.price)
            .next()
            .and_then(|el| normalize_price(&el.text().collect::<String>()));

        let rating = document
            .select(&self.rating)
            .next()
            .and_then(|el| el.value().classes().find_map(parse_rating_word));

        let availability_text = document
            .select(&self.availability)
            .next()
            .map(|el| el.text().collect::<String>());
        let in_stock = availability_text
            .as_deref()
            .map(|t| t.to_lowercase().contains("in stock"))
            .unwrap_or(false);
        let stock_count = availability_text.as_deref().and_then(|t| {
            self.stock_count
                .captures(t)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
        });

        let description = document
            .select(&self.description)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|d| !d.is_empty());

        let image_url = document
            .select(&self.image)
            .next()
            .and_then(|el| el.value().attr("src"))
            .and_then(|src| base.join(src).ok())
            .map(|u| u.to_string());

        Ok(BookCandidate {
            id,
            title,
            category,
            price,
            rating,
            availability: if in_stock {
                Availability::in_stock(stock_count)
            } else {
                Availability::out_of_stock()
            },
            description,
            image_url,
            source_url: page_url.to_string(),
        })
    }
}
