//! Catalog statistics computed over snapshots
//!
//! All aggregates are pure functions of a `CatalogSnapshot`, so a crawl
//! running concurrently never skews a report halfway through. Price
//! aggregates cover only records with a parsed price; records without one
//! are counted separately, never imputed as zero.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::application::catalog::CatalogSnapshot;
use crate::domain::book::Book;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Mean of the two middle values for an even count.
    pub median: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogOverview {
    pub total_records: usize,
    pub records_missing_price: usize,
    pub per_category_counts: BTreeMap<String, usize>,
    /// Absent when no record has a parsed price.
    pub price: Option<PriceStats>,
    /// Rating value 1..=5 to record count; unrated records are omitted.
    pub rating_distribution: BTreeMap<u8, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryBreakdown {
    pub category: String,
    pub records: usize,
    pub mean_price: Option<f64>,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn price_stats(prices: &mut Vec<f64>) -> Option<PriceStats> {
    if prices.is_empty() {
        return None;
    }
    prices.sort_by(|a, b| a.total_cmp(b));
    let n = prices.len();
    let mean = prices.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 1 {
        prices[n / 2]
    } else {
        (prices[n / 2 - 1] + prices[n / 2]) / 2.0
    };
    Some(PriceStats {
        min: round2(prices[0]),
        max: round2(prices[n - 1]),
        mean: round2(mean),
        median: round2(median),
    })
}

/// Whole-catalog aggregate report.
pub fn overview(snapshot: &CatalogSnapshot) -> CatalogOverview {
    let books = snapshot.books();
    let mut per_category_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut rating_distribution: BTreeMap<u8, usize> = BTreeMap::new();
    let mut prices = Vec::new();
    let mut missing_price = 0usize;

    for book in books {
        *per_category_counts.entry(book.category.clone()).or_default() += 1;
        if let Some(rating) = book.rating {
            *rating_distribution.entry(rating).or_default() += 1;
        }
        match book.price {
            Some(price) => prices.push(price),
            None => missing_price += 1,
        }
    }

    CatalogOverview {
        total_records: books.len(),
        records_missing_price: missing_price,
        per_category_counts,
        price: price_stats(&mut prices),
        rating_distribution,
    }
}

/// Per-category record counts and mean prices, category-sorted.
pub fn category_breakdown(snapshot: &CatalogSnapshot) -> Vec<CategoryBreakdown> {
    let mut groups: BTreeMap<&str, Vec<&Book>> = BTreeMap::new();
    for book in snapshot.books() {
        groups.entry(book.category.as_str()).or_default().push(book);
    }
    groups
        .into_iter()
        .map(|(category, books)| {
            let prices: Vec<f64> = books.iter().filter_map(|b| b.price).collect();
            let mean_price = (!prices.is_empty())
                .then(|| round2(prices.iter().sum::<f64>() / prices.len() as f64));
            CategoryBreakdown { category: category.to_string(), records: books.len(), mean_price }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::application::catalog::CatalogStore;
    use crate::domain::book::{Availability, BookCandidate};
    use crate::domain::events::NullSink;
    use crate::infrastructure::memory_repository::MemoryBookRepository;

    async fn snapshot_of(rows: &[(&str, &str, Option<f64>, Option<u8>)]) -> CatalogSnapshot {
        let store =
            CatalogStore::open(Arc::new(MemoryBookRepository::new()), Arc::new(NullSink))
                .await
                .unwrap();
        for (id, category, price, rating) in rows {
            store
                .upsert_candidate(BookCandidate {
                    id: id.to_string(),
                    title: format!("title-{id}"),
                    category: Some(category.to_string()),
                    price: *price,
                    rating: *rating,
                    availability: Availability::in_stock(None),
                    description: None,
                    image_url: None,
                    source_url: format!("https://example.test/{id}/index.html"),
                })
                .await
                .unwrap();
        }
        store.snapshot().await.unwrap()
    }

    #[tokio::test]
    async fn overview_counts_and_price_stats() {
        let snapshot = snapshot_of(&[
            ("a_1", "Poetry", Some(10.0), Some(5)),
            ("b_2", "Poetry", Some(20.0), Some(3)),
            ("c_3", "Fiction", None, None),
        ])
        .await;

        let report = overview(&snapshot);
        assert_eq!(report.total_records, 3);
        assert_eq!(report.records_missing_price, 1);
        assert_eq!(report.per_category_counts["Poetry"], 2);
        assert_eq!(report.per_category_counts["Fiction"], 1);

        let price = report.price.unwrap();
        assert_eq!(price.min, 10.0);
        assert_eq!(price.max, 20.0);
        assert_eq!(price.mean, 15.0);
        assert_eq!(price.median, 15.0);

        assert_eq!(report.rating_distribution.get(&5), Some(&1));
        assert_eq!(report.rating_distribution.get(&1), None);
    }

    #[tokio::test]
    async fn odd_count_median_is_middle_value() {
        let snapshot = snapshot_of(&[
            ("a_1", "Poetry", Some(1.0), None),
            ("b_2", "Poetry", Some(100.0), None),
            ("c_3", "Poetry", Some(2.0), None),
        ])
        .await;
        assert_eq!(overview(&snapshot).price.unwrap().median, 2.0);
    }

    #[tokio::test]
    async fn empty_catalog_has_no_price_stats() {
        let snapshot = snapshot_of(&[]).await;
        let report = overview(&snapshot);
        assert_eq!(report.total_records, 0);
        assert!(report.price.is_none());
        assert!(report.per_category_counts.is_empty());
    }

    #[tokio::test]
    async fn all_prices_missing_has_no_price_stats() {
        let snapshot = snapshot_of(&[("a_1", "Poetry", None, Some(3))]).await;
        let report = overview(&snapshot);
        assert!(report.price.is_none());
        assert_eq!(report.records_missing_price, 1);
    }

    #[tokio::test]
    async fn breakdown_groups_by_category() {
        let snapshot = snapshot_of(&[
            ("a_1", "Poetry", Some(10.0), None),
            ("b_2", "Poetry", Some(30.0), None),
            ("c_3", "Fiction", None, None),
        ])
        .await;

        let breakdown = category_breakdown(&snapshot);
        assert_eq!(breakdown.len(), 2);
        // BTreeMap ordering puts Fiction first.
        assert_eq!(breakdown[0].category, "Fiction");
        assert_eq!(breakdown[0].mean_price, None);
        assert_eq!(breakdown[1].category, "Poetry");
        assert_eq!(breakdown[1].records, 2);
        assert_eq!(breakdown[1].mean_price, Some(20.0));
    }
}
