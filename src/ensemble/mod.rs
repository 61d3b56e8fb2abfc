//! Classifier ensemble: loading, running and ranking crop predictions.

pub mod advice;
pub mod aggregator;
pub mod heuristic;
pub mod model;
pub mod runner;

pub use advice::RiskThresholds;
pub use aggregator::{Aggregator, AggregatorConfig};
pub use model::{load_models, CropClassifier};
pub use runner::EnsembleRunner;
