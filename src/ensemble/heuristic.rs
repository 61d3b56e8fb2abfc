//! Rule-based predictor used when no classifier produced an answer.

use crate::models::{ModelPrediction, PredictionInput};

pub const HEURISTIC_MODEL_ID: &str = "rule_based";

/// Threshold rules over temperature, humidity, rainfall and pH. The first
/// matching rule wins; maize is the catch-all.
pub fn predict(input: &PredictionInput) -> ModelPrediction {
    // ---
    let t = input.temperature.value;
    let h = input.humidity.value;
    let r = input.rainfall.value;
    let ph = input.ph.value;

    let (crop, confidence) = if h > 80.0 && r > 200.0 && (20.0..=30.0).contains(&t) {
        ("rice", 0.85)
    } else if (18.0..=27.0).contains(&t) && (55.0..=75.0).contains(&h) && (60.0..=110.0).contains(&r) {
        ("maize", 0.80)
    } else if r > 150.0 && t > 24.0 && h > 70.0 {
        ("jute", 0.72)
    } else if t < 20.0 && r < 100.0 && (6.0..=7.5).contains(&ph) {
        ("wheat", 0.75)
    } else if h < 40.0 && (18.0..=30.0).contains(&t) {
        ("chickpea", 0.70)
    } else if ph < 5.5 && h > 60.0 {
        ("coffee", 0.62)
    } else {
        ("maize", 0.60)
    };

    ModelPrediction::new(HEURISTIC_MODEL_ID, crop, confidence)
}
