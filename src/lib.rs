//! Environmental data resolution and ensemble crop recommendation.
//!
//! The engine fills every agronomic feature for a request from the best
//! source available (caller, field sensor, weather service, regional
//! defaults), runs each loaded classifier against the resolved features and
//! merges their answers into a ranked recommendation with a rationale and
//! risk flags. Upstream failures never reach the caller; only a malformed or
//! cancelled request does.

pub mod cache;
pub mod config;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod models;
pub mod regional;
pub mod resolver;
pub mod routes;
pub mod schema;
pub mod sensor;
pub mod weather;

pub use config::Config;
pub use engine::{RecommendationEngine, RecommendationRequest, RecommendationResponse};
pub use error::{EngineError, ModelError, RequestError};
pub use models::{EnsembleRecommendation, ModelPrediction, PredictionInput, SensorReading, UserInput};
