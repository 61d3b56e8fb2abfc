//! Model Ensemble Runner.

use std::sync::Arc;

use futures::future::join_all;

use crate::ensemble::heuristic;
use crate::ensemble::model::{CropClassifier, Features};
use crate::error::ModelError;
use crate::models::{ModelPrediction, PredictionInput};

/// Confidence assigned to models without a probability interface.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

pub struct EnsembleRunner {
    models: Vec<Arc<dyn CropClassifier>>,
    default_confidence: f64,
}

/// Label plus confidence for one model.
fn classify(model: &dyn CropClassifier, features: &Features, default_confidence: f64) -> Result<ModelPrediction, ModelError> {
    // ---
    let label = model.predict(features)?;

    let confidence = if model.has_confidence_output() {
        match model.predict_probability(features) {
            Ok(dist) => dist
                .iter()
                .find(|(l, _)| *l == label)
                .or_else(|| dist.iter().max_by(|a, b| a.1.total_cmp(&b.1)))
                .map(|(_, p)| *p)
                .unwrap_or(default_confidence),
            Err(e) => {
                tracing::debug!("Model {} probability failed, using default: {}", model.id(), e);
                default_confidence
            }
        }
    } else {
        default_confidence
    };

    Ok(ModelPrediction::new(model.id(), &label, confidence))
}

impl EnsembleRunner {
    pub fn new(models: Vec<Arc<dyn CropClassifier>>) -> Self {
        Self {
            models,
            default_confidence: DEFAULT_CONFIDENCE,
        }
    }

    pub fn with_default_confidence(mut self, confidence: f64) -> Self {
        self.default_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn model_ids(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.id()).collect()
    }

    /// One prediction per model that answered, in model order.
    ///
    /// Models run concurrently on the blocking pool. A failing or panicking
    /// model is skipped. If none answer, the rule-based predictor does.
    pub async fn run_all(&self, input: &PredictionInput) -> Vec<ModelPrediction> {
        // ---
        let features = input.features();
        let default_confidence = self.default_confidence;

        let tasks = self.models.iter().map(|model| {
            let model = Arc::clone(model);
            async move {
                let id = model.id().to_string();
                tokio::task::spawn_blocking(move || classify(model.as_ref(), &features, default_confidence))
                    .await
                    .unwrap_or_else(|_| Err(ModelError::TaskFailed(id)))
            }
        });

        let mut predictions = Vec::with_capacity(self.models.len());
        for result in join_all(tasks).await {
            match result {
                Ok(prediction) => {
                    tracing::debug!(
                        "Model {} predicted {} ({:.3})",
                        prediction.model_id,
                        prediction.crop,
                        prediction.confidence
                    );
                    predictions.push(prediction);
                }
                Err(e) => tracing::warn!("Skipping model: {}", e),
            }
        }

        if predictions.is_empty() {
            tracing::warn!(
                "No model produced a prediction ({} loaded), using rule-based fallback",
                self.models.len()
            );
            predictions.push(heuristic::predict(input));
        }
        predictions
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::{Provenance, ResolvedValue};

    struct Fixed {
        id: &'static str,
        label: &'static str,
        proba: Option<f64>,
    }

    impl CropClassifier for Fixed {
        fn id(&self) -> &str {
            self.id
        }

        fn predict(&self, _features: &Features) -> Result<String, ModelError> {
            Ok(self.label.to_string())
        }

        fn has_confidence_output(&self) -> bool {
            self.proba.is_some()
        }

        fn predict_probability(&self, _features: &Features) -> Result<Vec<(String, f64)>, ModelError> {
            let p = self.proba.unwrap_or_default();
            Ok(vec![(self.label.to_string(), p), ("other".to_string(), 1.0 - p)])
        }
    }

    struct Broken;

    impl CropClassifier for Broken {
        fn id(&self) -> &str {
            "broken"
        }

        fn predict(&self, _features: &Features) -> Result<String, ModelError> {
            Err(ModelError::Invalid {
                id: "broken".into(),
                reason: "weights missing".into(),
            })
        }
    }

    struct Panics;

    impl CropClassifier for Panics {
        fn id(&self) -> &str {
            "panics"
        }

        fn predict(&self, _features: &Features) -> Result<String, ModelError> {
            panic!("corrupt artifact")
        }
    }

    fn input() -> PredictionInput {
        // ---
        let v = |value| ResolvedValue::new(value, Provenance::User);
        PredictionInput {
            nitrogen: v(90.0),
            phosphorus: v(42.0),
            potassium: v(43.0),
            temperature: v(20.87),
            humidity: v(82.0),
            ph: v(6.5),
            rainfall: v(202.9),
        }
    }

    #[tokio::test]
    async fn test_probability_and_default_confidence() {
        // ---
        let runner = EnsembleRunner::new(vec![
            Arc::new(Fixed { id: "nb", label: "Rice", proba: Some(0.95) }),
            Arc::new(Fixed { id: "tree", label: "rice", proba: None }),
        ]);

        let predictions = runner.run_all(&input()).await;
        assert_eq!(
            predictions,
            vec![
                ModelPrediction::new("nb", "rice", 0.95),
                ModelPrediction::new("tree", "rice", DEFAULT_CONFIDENCE),
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_models_are_skipped() {
        // ---
        let runner = EnsembleRunner::new(vec![
            Arc::new(Broken),
            Arc::new(Panics),
            Arc::new(Fixed { id: "nc", label: "maize", proba: Some(0.7) }),
        ]);

        let predictions = runner.run_all(&input()).await;
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].model_id, "nc");
    }

    #[tokio::test]
    async fn test_all_models_failing_uses_heuristic() {
        // ---
        let runner = EnsembleRunner::new(vec![Arc::new(Broken), Arc::new(Panics)]);
        let predictions = runner.run_all(&input()).await;
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].model_id, heuristic::HEURISTIC_MODEL_ID);

        let empty = EnsembleRunner::new(Vec::new());
        assert_eq!(empty.run_all(&input()).await[0].model_id, heuristic::HEURISTIC_MODEL_ID);
    }

    #[test]
    fn test_default_confidence_is_configurable() {
        // ---
        let runner = EnsembleRunner::new(vec![Arc::new(Fixed { id: "tree", label: "wheat", proba: None })])
            .with_default_confidence(0.65);

        let predictions = tokio_test::block_on(runner.run_all(&input()));
        assert_eq!(predictions, vec![ModelPrediction::new("tree", "wheat", 0.65)]);
        assert_eq!(runner.model_ids(), vec!["tree"]);
        assert_eq!(runner.model_count(), 1);
    }
}
