//! Book catalog entities and merge semantics
//!
//! A `Book` is one ingested catalog item keyed by its stable external
//! identifier (the catalogue slug of its detail URL). Candidates parsed from
//! pages are canonicalized and merged into stored records; a blake3
//! fingerprint over the mutable fields detects real change without comparing
//! full payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category assigned when no category could be parsed for a record.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Stock state as shown on a listing or detail page.
///
/// Listing pages only reveal "In stock"; detail pages additionally expose a
/// count ("In stock (22 available)"), so the count is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub in_stock: bool,
    pub stock_count: Option<u32>,
}

impl Availability {
    pub fn out_of_stock() -> Self {
        Self { in_stock: false, stock_count: None }
    }

    pub fn in_stock(count: Option<u32>) -> Self {
        Self { in_stock: true, stock_count: count }
    }
}

impl Default for Availability {
    fn default() -> Self {
        Self::out_of_stock()
    }
}

/// One ingested catalog item.
///
/// Invariant: `id` identifies at most one `Book` in the catalog at any time;
/// re-ingesting the same `id` updates in place, never duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Stable external identifier derived from the catalogue slug.
    pub id: String,
    pub title: String,
    /// Never empty; [`UNKNOWN_CATEGORY`] when unparseable.
    pub category: String,
    /// Currency-normalized, non-negative, rounded to two decimal places.
    /// Absent when the source price could not be parsed.
    pub price: Option<f64>,
    /// Star rating 1..=5; absent when unparseable.
    pub rating: Option<u8>,
    pub availability: Availability,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Detail-page URL, kept for re-fetch and debugging.
    pub source_url: String,
    /// Timestamp of the most recent successful parse of this record.
    pub last_seen_at: DateTime<Utc>,
    /// blake3 hex digest over the mutable fields.
    pub fingerprint: String,
}

impl Book {
    /// Hash over the mutable fields. `last_seen_at` and `source_url` are
    /// excluded so a re-parse that changed nothing hashes identically.
    pub fn compute_fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.title.as_bytes());
        hasher.update(&[0x1f]);
        hasher.update(self.category.as_bytes());
        hasher.update(&[0x1f]);
        match self.price {
            Some(price) => hasher.update(format!("{price:.2}").as_bytes()),
            None => hasher.update(b"-"),
        };
        hasher.update(&[0x1f]);
        match self.rating {
            Some(rating) => hasher.update(&[rating]),
            None => hasher.update(b"-"),
        };
        hasher.update(&[0x1f, u8::from(self.availability.in_stock)]);
        match self.availability.stock_count {
            Some(count) => hasher.update(count.to_string().as_bytes()),
            None => hasher.update(b"-"),
        };
        hasher.update(&[0x1f]);
        hasher.update(self.description.as_deref().unwrap_or("").as_bytes());
        hasher.update(&[0x1f]);
        hasher.update(self.image_url.as_deref().unwrap_or("").as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Recompute and store the fingerprint after field changes.
    pub fn refresh_fingerprint(&mut self) {
        self.fingerprint = self.compute_fingerprint();
    }
}

/// Candidate record parsed from a page, not yet canonicalized or merged.
///
/// Optional fields preserve the absent/unknown/zero distinction: a missing
/// price is not a zero price, and an unparseable category stays `None` until
/// canonicalization maps it to the unknown bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookCandidate {
    pub id: String,
    pub title: String,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub rating: Option<u8>,
    pub availability: Availability,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub source_url: String,
}

impl BookCandidate {
    /// Fill fields a listing parse could not provide from a detail-page parse
    /// of the same record. Detail values win for category and description;
    /// everything else only fills gaps.
    pub fn enrich_from_detail(&mut self, detail: &BookCandidate) {
        if detail.category.is_some() {
            self.category.clone_from(&detail.category);
        }
        if detail.description.is_some() {
            self.description.clone_from(&detail.description);
        }
        if self.price.is_none() {
            self.price = detail.price;
        }
        if self.rating.is_none() {
            self.rating = detail.rating;
        }
        if self.availability.stock_count.is_none() {
            self.availability.stock_count = detail.availability.stock_count;
        }
    }

    /// Canonicalize into a storable record: round the price to two decimal
    /// places, map a missing category to the unknown bucket and compute the
    /// fingerprint.
    pub fn canonicalize(self, seen_at: DateTime<Utc>) -> Book {
        let category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
        let price = self
            .price
            .filter(|p| p.is_finite() && *p >= 0.0)
            .map(|p| (p * 100.0).round() / 100.0);
        let rating = self.rating.filter(|r| (1..=5).contains(r));

        let mut book = Book {
            id: self.id,
            title: self.title,
            category,
            price,
            rating,
            availability: self.availability,
            description: self.description.filter(|d| !d.trim().is_empty()),
            image_url: self.image_url.filter(|u| !u.is_empty()),
            source_url: self.source_url,
            last_seen_at: seen_at,
            fingerprint: String::new(),
        };
        book.refresh_fingerprint();
        book
    }
}

/// Outcome of a catalog upsert, decided by fingerprint comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

impl std::fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpsertOutcome::Created => write!(f, "created"),
            UpsertOutcome::Updated => write!(f, "updated"),
            UpsertOutcome::Unchanged => write!(f, "unchanged"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str) -> BookCandidate {
        BookCandidate {
            id: id.to_string(),
            title: "A Light in the Attic".to_string(),
            category: Some("Poetry".to_string()),
            price: Some(51.774),
            rating: Some(3),
            availability: Availability::in_stock(Some(22)),
            description: Some("A classic collection.".to_string()),
            image_url: None,
            source_url: "https://books.toscrape.com/catalogue/a-light-in-the-attic_1000/index.html"
                .to_string(),
        }
    }

    #[test]
    fn canonicalize_rounds_price_and_keeps_fields() {
        let book = candidate("a-light-in-the-attic_1000").canonicalize(Utc::now());
        assert_eq!(book.price, Some(51.77));
        assert_eq!(book.category, "Poetry");
        assert_eq!(book.rating, Some(3));
        assert!(!book.fingerprint.is_empty());
    }

    #[test]
    fn missing_category_maps_to_unknown_bucket() {
        let mut c = candidate("x");
        c.category = None;
        let book = c.canonicalize(Utc::now());
        assert_eq!(book.category, UNKNOWN_CATEGORY);
    }

    #[test]
    fn out_of_range_rating_becomes_absent() {
        let mut c = candidate("x");
        c.rating = Some(9);
        let book = c.canonicalize(Utc::now());
        assert_eq!(book.rating, None);
    }

    #[test]
    fn fingerprint_ignores_last_seen_at() {
        let c = candidate("x");
        let a = c.clone().canonicalize(Utc::now());
        let b = c.canonicalize(Utc::now() + chrono::Duration::hours(1));
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn fingerprint_changes_with_price() {
        let c = candidate("x");
        let a = c.clone().canonicalize(Utc::now());
        let mut c2 = c;
        c2.price = Some(12.0);
        let b = c2.canonicalize(Utc::now());
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn detail_enrichment_fills_gaps_without_clobbering() {
        let mut listing = candidate("x");
        listing.category = None;
        listing.description = None;
        listing.availability = Availability::in_stock(None);

        let mut detail = candidate("x");
        detail.price = Some(99.0);

        listing.enrich_from_detail(&detail);
        assert_eq!(listing.category.as_deref(), Some("Poetry"));
        assert_eq!(listing.availability.stock_count, Some(22));
        // Listing price was present, the detail price must not replace it.
        assert_eq!(listing.price, Some(51.774));
    }
}
