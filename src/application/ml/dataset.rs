//! Training dataset assembly with a deterministic seeded split.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::application::catalog::CatalogSnapshot;
use crate::application::ml::features::{build_features, label_for, CategoryEncoder, FeatureVector};
use crate::application::ml::MlError;

#[derive(Debug, Clone)]
pub struct LabeledExample {
    pub features: FeatureVector,
    pub label: bool,
}

/// Labeled examples split into train and test partitions. Regenerated from a
/// snapshot on demand, never persisted.
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    pub train: Vec<LabeledExample>,
    pub test: Vec<LabeledExample>,
    pub split_ratio: f64,
    pub seed: u64,
    /// Encoder fitted on the snapshot, carried along so predictions made
    /// against the resulting model encode categories the same way.
    pub encoder: CategoryEncoder,
}

impl TrainingDataset {
    pub fn labeled_count(&self) -> usize {
        self.train.len() + self.test.len()
    }

    /// CSV export of both partitions with a `split` column, for external
    /// tooling.
    pub fn to_csv(&self) -> String {
        let mut out = String::from(
            "book_id,price_scaled,rating,category_index,availability,description_bucket,label,split\n",
        );
        let mut push = |examples: &[LabeledExample], split: &str| {
            for e in examples {
                let f = &e.features;
                out.push_str(&format!(
                    "{},{},{},{},{},{},{},{split}\n",
                    f.book_id,
                    f.price_scaled,
                    f.rating,
                    f.category_index,
                    f.availability,
                    f.description_bucket,
                    u8::from(e.label)
                ));
            }
        };
        push(&self.train, "train");
        push(&self.test, "test");
        out
    }
}

/// Shuffle-and-split the labeled records of a snapshot. The shuffle is keyed
/// by `seed`, so identical snapshot and seed reproduce the exact partition.
/// Records without both price and rating carry no label and are excluded.
pub fn build_training_dataset(
    snapshot: &CatalogSnapshot,
    split_ratio: f64,
    seed: u64,
) -> Result<TrainingDataset, MlError> {
    if !(split_ratio > 0.0 && split_ratio < 1.0) {
        return Err(MlError::InvalidSplitRatio(split_ratio));
    }

    let (encoder, features) = build_features(snapshot);
    let mut examples: Vec<LabeledExample> = snapshot
        .books()
        .iter()
        .zip(features)
        .filter_map(|(book, features)| {
            label_for(book).map(|label| LabeledExample { features, label })
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    examples.shuffle(&mut rng);

    let split_at = (examples.len() as f64 * split_ratio).floor() as usize;
    let test = examples.split_off(split_at);

    Ok(TrainingDataset { train: examples, test, split_ratio, seed, encoder })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::application::catalog::CatalogStore;
    use crate::domain::book::{Availability, BookCandidate};
    use crate::domain::events::NullSink;
    use crate::infrastructure::memory_repository::MemoryBookRepository;

    async fn snapshot(n: usize) -> CatalogSnapshot {
        let store =
            CatalogStore::open(Arc::new(MemoryBookRepository::new()), Arc::new(NullSink))
                .await
                .unwrap();
        for i in 0..n {
            store
                .upsert_candidate(BookCandidate {
                    id: format!("book_{i:03}"),
                    title: format!("Book {i}"),
                    category: Some(if i % 2 == 0 { "Poetry" } else { "Fiction" }.to_string()),
                    price: Some(10.0 + i as f64),
                    rating: Some((i % 5 + 1) as u8),
                    availability: Availability::in_stock(None),
                    description: None,
                    image_url: None,
                    source_url: format!("https://example.test/book_{i:03}/index.html"),
                })
                .await
                .unwrap();
        }
        store.snapshot().await.unwrap()
    }

    #[tokio::test]
    async fn split_is_deterministic_per_seed() {
        let snapshot = snapshot(20).await;
        let a = build_training_dataset(&snapshot, 0.7, 42).unwrap();
        let b = build_training_dataset(&snapshot, 0.7, 42).unwrap();

        let ids = |ds: &TrainingDataset| {
            ds.train.iter().map(|e| e.features.book_id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(a.train.len(), 14);
        assert_eq!(a.test.len(), 6);
    }

    #[tokio::test]
    async fn different_seeds_differ() {
        let snapshot = snapshot(20).await;
        let a = build_training_dataset(&snapshot, 0.7, 42).unwrap();
        let b = build_training_dataset(&snapshot, 0.7, 43).unwrap();
        let ids = |ds: &TrainingDataset| {
            ds.train.iter().map(|e| e.features.book_id.clone()).collect::<Vec<_>>()
        };
        assert_ne!(ids(&a), ids(&b));
    }

    #[tokio::test]
    async fn unlabeled_records_are_excluded() {
        let store =
            CatalogStore::open(Arc::new(MemoryBookRepository::new()), Arc::new(NullSink))
                .await
                .unwrap();
        store
            .upsert_candidate(BookCandidate {
                id: "no-price_1".to_string(),
                title: "No Price".to_string(),
                category: Some("Poetry".to_string()),
                price: None,
                rating: Some(5),
                availability: Availability::in_stock(None),
                description: None,
                image_url: None,
                source_url: "https://example.test/no-price_1/index.html".to_string(),
            })
            .await
            .unwrap();
        let snapshot = store.snapshot().await.unwrap();
        let dataset = build_training_dataset(&snapshot, 0.5, 1).unwrap();
        assert_eq!(dataset.labeled_count(), 0);
    }

    #[tokio::test]
    async fn csv_covers_both_partitions() {
        let snapshot = snapshot(10).await;
        let dataset = build_training_dataset(&snapshot, 0.7, 42).unwrap();
        let csv = dataset.to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 11);
        assert_eq!(lines.iter().filter(|l| l.ends_with(",train")).count(), 7);
        assert_eq!(lines.iter().filter(|l| l.ends_with(",test")).count(), 3);
    }

    #[tokio::test]
    async fn invalid_ratio_is_rejected() {
        let snapshot = snapshot(5).await;
        assert!(matches!(
            build_training_dataset(&snapshot, 0.0, 1),
            Err(MlError::InvalidSplitRatio(_))
        ));
        assert!(matches!(
            build_training_dataset(&snapshot, 1.0, 1),
            Err(MlError::InvalidSplitRatio(_))
        ));
    }
}
