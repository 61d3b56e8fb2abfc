//! Ensemble Aggregator.
//!
//! Groups per-model predictions by crop, averages their confidence, rewards
//! agreement between models and keeps the best `top_k` crops. The top entry
//! gets an input-dependent rationale; risk factors come from thresholding the
//! resolved features.

use std::collections::BTreeMap;

use crate::ensemble::advice::{self, RiskThresholds};
use crate::models::{EnsembleRecommendation, ModelPrediction, PredictionInput, RankedCrop};

pub const DEFAULT_AGREEMENT_BOOST: f64 = 1.1;
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    /// Multiplier applied when more than one model picks the same crop.
    pub agreement_boost: f64,
    pub top_k: usize,
    pub risk: RiskThresholds,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            agreement_boost: DEFAULT_AGREEMENT_BOOST,
            top_k: DEFAULT_TOP_K,
            risk: RiskThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Rank crops across `predictions`.
    ///
    /// Ordering is by confidence descending, then agreement descending, then
    /// crop name, so the same predictions always produce the same ranking.
    pub fn aggregate(&self, predictions: &[ModelPrediction], input: &PredictionInput) -> EnsembleRecommendation {
        // ---
        let mut groups: BTreeMap<&str, Vec<&ModelPrediction>> = BTreeMap::new();
        for prediction in predictions {
            groups.entry(prediction.crop.as_str()).or_default().push(prediction);
        }

        let mut rankings: Vec<RankedCrop> = groups
            .into_iter()
            .map(|(crop, members)| {
                let agreement = members.len();
                let mean = members.iter().map(|p| p.confidence).sum::<f64>() / agreement as f64;
                let confidence = if agreement > 1 {
                    (mean * self.config.agreement_boost).min(1.0)
                } else {
                    mean
                };
                RankedCrop {
                    crop: crop.to_string(),
                    confidence,
                    supporting_models: members.iter().map(|p| p.model_id.clone()).collect(),
                    model_agreement: agreement,
                }
            })
            .collect();

        rankings.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| b.model_agreement.cmp(&a.model_agreement))
                .then_with(|| a.crop.cmp(&b.crop))
        });
        rankings.truncate(self.config.top_k.max(1));

        if rankings.is_empty() {
            return EnsembleRecommendation {
                rankings,
                rationale: "No model produced a prediction for these conditions.".to_string(),
                risk_factors: advice::risk_factors(input, None, &self.config.risk),
            };
        }
        let top = &rankings[0];

        let rationale = format!(
            "{} Supported by {} of {} models.",
            advice::rationale(&top.crop, input),
            top.model_agreement,
            predictions.len()
        );
        let risk_factors = advice::risk_factors(input, Some(&top.crop), &self.config.risk);

        tracing::debug!(
            "Top crop {} at {:.3} with agreement {}",
            top.crop,
            top.confidence,
            top.model_agreement
        );

        EnsembleRecommendation {
            rankings,
            rationale,
            risk_factors,
        }
    }
}
