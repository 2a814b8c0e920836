//! Feature vectors derived from catalog snapshots
//!
//! Every feature is a pure function of a record's fields plus the category
//! universe of the snapshot it came from. Categories unseen at encoding time
//! land in a reserved unknown bucket at index 0 so a model trained on an
//! older universe keeps serving predictions.

use std::collections::BTreeMap;

use crate::application::catalog::CatalogSnapshot;
use crate::domain::book::Book;

/// Width of [`FeatureVector::to_row`].
pub const FEATURE_DIM: usize = 5;

/// Price threshold and minimum rating defining the "recommended" label.
const RECOMMEND_MAX_PRICE: f64 = 40.0;
const RECOMMEND_MIN_RATING: u8 = 4;

/// Category-to-index encoding fitted on one snapshot's category universe.
/// Index 0 is reserved for unknown categories; known categories are numbered
/// from 1 in sorted order, so the encoding is deterministic per universe.
#[derive(Debug, Clone, Default)]
pub struct CategoryEncoder {
    index: BTreeMap<String, usize>,
}

impl CategoryEncoder {
    pub fn fit<'a>(categories: impl IntoIterator<Item = &'a str>) -> Self {
        let mut sorted: Vec<&str> = categories.into_iter().collect();
        sorted.sort_unstable();
        sorted.dedup();
        let index = sorted
            .into_iter()
            .enumerate()
            .map(|(i, category)| (category.to_string(), i + 1))
            .collect();
        Self { index }
    }

    /// Index for a category; 0 when the category was not in the fitted
    /// universe.
    pub fn encode(&self, category: &str) -> usize {
        self.index.get(category).copied().unwrap_or(0)
    }

    /// Number of distinct indices, unknown bucket included.
    pub fn universe_size(&self) -> usize {
        self.index.len() + 1
    }
}

/// Numeric encoding of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub book_id: String,
    /// Price divided by 100 to keep it near unit scale; 0.0 when absent.
    pub price_scaled: f64,
    /// Rating 1..=5; imputed to 0.0 when absent.
    pub rating: f64,
    pub category_index: usize,
    /// 1.0 when in stock.
    pub availability: f64,
    /// Description length bucket 0..=3 (none, short, medium, long).
    pub description_bucket: f64,
}

impl FeatureVector {
    pub fn from_book(book: &Book, encoder: &CategoryEncoder) -> Self {
        Self {
            book_id: book.id.clone(),
            price_scaled: book.price.unwrap_or(0.0) / 100.0,
            rating: book.rating.map(f64::from).unwrap_or(0.0),
            category_index: encoder.encode(&book.category),
            availability: if book.availability.in_stock { 1.0 } else { 0.0 },
            description_bucket: f64::from(description_bucket(book.description.as_deref())),
        }
    }

    pub fn to_row(&self) -> [f64; FEATURE_DIM] {
        [
            self.price_scaled,
            self.rating,
            self.category_index as f64,
            self.availability,
            self.description_bucket,
        ]
    }
}

fn description_bucket(description: Option<&str>) -> u8 {
    match description.map(str::len).unwrap_or(0) {
        0 => 0,
        1..=100 => 1,
        101..=500 => 2,
        _ => 3,
    }
}

/// "Recommended" label: highly rated and affordable. Absent when price or
/// rating is missing; such records are excluded from training.
pub fn label_for(book: &Book) -> Option<bool> {
    let price = book.price?;
    let rating = book.rating?;
    Some(rating >= RECOMMEND_MIN_RATING && price < RECOMMEND_MAX_PRICE)
}

/// One feature vector per record, id order, encoded against the snapshot's
/// own category universe.
pub fn build_features(snapshot: &CatalogSnapshot) -> (CategoryEncoder, Vec<FeatureVector>) {
    let encoder =
        CategoryEncoder::fit(snapshot.books().iter().map(|b| b.category.as_str()));
    let features = snapshot
        .books()
        .iter()
        .map(|b| FeatureVector::from_book(b, &encoder))
        .collect();
    (encoder, features)
}

/// Serialize a feature matrix to CSV text, header included, for export to
/// external tooling.
pub fn features_to_csv(features: &[FeatureVector]) -> String {
    let mut out = String::from(
        "book_id,price_scaled,rating,category_index,availability,description_bucket\n",
    );
    for f in features {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            f.book_id,
            f.price_scaled,
            f.rating,
            f.category_index,
            f.availability,
            f.description_bucket
        ));
    }
    out
}
