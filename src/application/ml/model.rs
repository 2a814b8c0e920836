//! Prediction engine holding the trained recommendation model
//!
//! The engine owns at most one trained model at a time. Retraining fits a
//! fresh logistic regression and only swaps it in after the fit succeeded,
//! so callers never observe a half-replaced model. Versions are monotonic
//! across retrains.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{Array1, Array2};
use tokio::sync::RwLock;
use tracing::info;

use crate::application::ml::features::{CategoryEncoder, FeatureVector, FEATURE_DIM};
use crate::application::ml::{MlError, TrainingDataset, MIN_TRAINING_EXAMPLES};
use crate::domain::book::Book;
use crate::domain::events::{AppEvent, EventSink};

const MAX_ITERATIONS: u64 = 200;

/// Prediction for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Whether the record is predicted "recommended".
    pub value: bool,
    /// Probability assigned to the predicted class, in [0, 1].
    pub confidence: f64,
    pub model_version: u64,
}

/// Metadata of the currently held model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub version: u64,
    pub trained_at: DateTime<Utc>,
    pub training_examples: usize,
}

struct TrainedModel {
    fitted: FittedLogisticRegression<f64, usize>,
    encoder: CategoryEncoder,
    info: ModelInfo,
}

pub struct PredictionEngine {
    events: Arc<dyn EventSink>,
    current: RwLock<Option<Arc<TrainedModel>>>,
    next_version: AtomicU64,
}

impl PredictionEngine {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self { events, current: RwLock::new(None), next_version: AtomicU64::new(1) }
    }

    /// Fit a fresh model on the dataset's train partition. The previous model
    /// keeps serving until the new fit succeeds; only then is it replaced.
    pub async fn train(&self, dataset: &TrainingDataset) -> Result<ModelInfo, MlError> {
        let labeled = dataset.labeled_count();
        if labeled < MIN_TRAINING_EXAMPLES {
            return Err(MlError::DataInsufficient { have: labeled, need: MIN_TRAINING_EXAMPLES });
        }

        let positives = dataset.train.iter().filter(|e| e.label).count();
        if positives == 0 || positives == dataset.train.len() {
            // A single-class partition cannot separate anything.
            return Err(MlError::DataInsufficient { have: labeled, need: MIN_TRAINING_EXAMPLES });
        }

        let rows = dataset.train.len();
        let mut flat = Vec::with_capacity(rows * FEATURE_DIM);
        let mut targets = Vec::with_capacity(rows);
        for example in &dataset.train {
            flat.extend_from_slice(&example.features.to_row());
            targets.push(usize::from(example.label));
        }
        let records = Array2::from_shape_vec((rows, FEATURE_DIM), flat)
            .map_err(|e| MlError::Training(e.to_string()))?;
        let targets = Array1::from_vec(targets);
        let training = Dataset::new(records, targets);

        let fitted = LogisticRegression::default()
            .max_iterations(MAX_ITERATIONS)
            .fit(&training)
            .map_err(|e| MlError::Training(e.to_string()))?;

        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let info =
            ModelInfo { version, trained_at: Utc::now(), training_examples: labeled };
        let model = Arc::new(TrainedModel {
            fitted,
            encoder: dataset.encoder.clone(),
            info: info.clone(),
        });
        *self.current.write().await = Some(model);

        info!(version, training_examples = labeled, "model trained");
        self.events.emit(AppEvent::ModelTrained { version, training_examples: labeled });
        Ok(info)
    }

    /// Predict from an already built feature vector.
    pub async fn predict(&self, features: &FeatureVector) -> Result<Prediction, MlError> {
        let model = self
            .current
            .read()
            .await
            .clone()
            .ok_or(MlError::ModelNotTrained)?;

        let row = Array2::from_shape_vec((1, FEATURE_DIM), features.to_row().to_vec())
            .map_err(|e| MlError::Training(e.to_string()))?;

        let class = model.fitted.predict(&row)[0];
        let value = class == 1;
        // predict_probabilities yields P(class 1); confidence is the
        // probability of the class actually predicted.
        let p_positive = model.fitted.predict_probabilities(&row)[0];
        let confidence = if value { p_positive } else { 1.0 - p_positive };
        let confidence = confidence.clamp(0.0, 1.0);

        let prediction = Prediction { value, confidence, model_version: model.info.version };
        self.events.emit(AppEvent::PredictionServed {
            version: model.info.version,
            value,
            confidence,
        });
        Ok(prediction)
    }

    /// Predict for a record, encoding its category with the encoder the
    /// current model was trained with. Categories that appeared after
    /// training fall into the unknown bucket instead of failing.
    pub async fn predict_book(&self, book: &Book) -> Result<Prediction, MlError> {
        let encoder = {
            let current = self.current.read().await;
            current.as_ref().ok_or(MlError::ModelNotTrained)?.encoder.clone()
        };
        let features = FeatureVector::from_book(book, &encoder);
        self.predict(&features).await
    }

    pub async fn model_info(&self) -> Option<ModelInfo> {
        self.current.read().await.as_ref().map(|m| m.info.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ml::dataset::LabeledExample;
    use crate::domain::events::NullSink;

    fn example(id: usize, price: f64, rating: f64, label: bool) -> LabeledExample {
        LabeledExample {
            features: FeatureVector {
                book_id: format!("book_{id}"),
                price_scaled: price / 100.0,
                rating,
                category_index: 1,
                availability: 1.0,
                description_bucket: 1.0,
            },
            label,
        }
    }

    fn dataset(n: usize) -> TrainingDataset {
        // Cheap high-rated books are positive, expensive low-rated negative.
        let train = (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    example(i, 15.0, 5.0, true)
                } else {
                    example(i, 55.0, 2.0, false)
                }
            })
            .collect();
        TrainingDataset {
            train,
            test: Vec::new(),
            split_ratio: 0.7,
            seed: 42,
            encoder: CategoryEncoder::fit(["Poetry"]),
        }
    }

    #[tokio::test]
    async fn predict_before_train_fails() {
        let engine = PredictionEngine::new(Arc::new(NullSink));
        let result = engine.predict(&dataset(2).train[0].features).await;
        assert!(matches!(result, Err(MlError::ModelNotTrained)));
    }

    #[tokio::test]
    async fn too_few_examples_is_data_insufficient() {
        let engine = PredictionEngine::new(Arc::new(NullSink));
        let result = engine.train(&dataset(4)).await;
        assert!(matches!(result, Err(MlError::DataInsufficient { have: 4, need: _ })));
    }

    #[tokio::test]
    async fn single_class_is_data_insufficient() {
        let engine = PredictionEngine::new(Arc::new(NullSink));
        let mut ds = dataset(20);
        for e in &mut ds.train {
            e.label = true;
        }
        assert!(matches!(engine.train(&ds).await, Err(MlError::DataInsufficient { .. })));
    }

    #[tokio::test]
    async fn train_then_predict_with_confidence_in_range() {
        let engine = PredictionEngine::new(Arc::new(NullSink));
        let info = engine.train(&dataset(50)).await.unwrap();
        assert_eq!(info.version, 1);
        assert_eq!(info.training_examples, 50);

        let positive = engine.predict(&example(99, 10.0, 5.0, true).features).await.unwrap();
        assert!(positive.value);
        assert!((0.0..=1.0).contains(&positive.confidence));

        let negative = engine.predict(&example(98, 60.0, 1.0, false).features).await.unwrap();
        assert!(!negative.value);
        assert!((0.0..=1.0).contains(&negative.confidence));
    }

    #[tokio::test]
    async fn retrain_bumps_version_and_failed_retrain_keeps_model() {
        let engine = PredictionEngine::new(Arc::new(NullSink));
        engine.train(&dataset(20)).await.unwrap();
        let second = engine.train(&dataset(20)).await.unwrap();
        assert_eq!(second.version, 2);

        // A rejected retrain leaves the current model in place.
        assert!(engine.train(&dataset(2)).await.is_err());
        assert_eq!(engine.model_info().await.unwrap().version, 2);
    }
}
