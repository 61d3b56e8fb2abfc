//! Error types for the recommendation engine.
//!
//! Upstream failures never show up here: the gateways and the ensemble
//! runner recover from them locally. What is left is a malformed request,
//! a cancelled request, and classifier failures that the runner skips.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

/// A request that is structurally invalid and is rejected before resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    /// Region was empty or whitespace
    #[error("region must not be empty")]
    MissingRegion,

    /// Sensor id was given but empty
    #[error("sensor_id must not be empty when supplied")]
    EmptySensorId,

    /// Season name not recognised
    #[error("unknown season '{0}' (expected spring, summer, monsoon, autumn or winter)")]
    UnknownSeason(String),

    /// A user-supplied value was NaN or infinite
    #[error("user_input.{0} must be a finite number")]
    NonFinite(&'static str),
}

/// Failure of one classifier artifact. Always recovered by the runner.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Artifact could not be read from disk
    #[error("cannot read model artifact: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact JSON did not match any known model kind
    #[error("cannot parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),

    /// Artifact parsed but is internally inconsistent
    #[error("invalid model artifact '{id}': {reason}")]
    Invalid { id: String, reason: String },

    /// Model has no probability interface
    #[error("model '{0}' has no probability output")]
    NoProbability(String),

    /// Inference task panicked or was aborted
    #[error("model '{0}' inference task failed")]
    TaskFailed(String),
}

/// Errors surfaced by [`crate::engine::RecommendationEngine::recommend`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Invalid(#[from] RequestError),

    /// Caller went away; nothing partial is returned
    #[error("request cancelled")]
    Cancelled,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> axum::response::Response {
        // ---
        let status = match self {
            EngineError::Invalid(_) => StatusCode::BAD_REQUEST,
            EngineError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> axum::response::Response {
        EngineError::from(self).into_response()
    }
}
