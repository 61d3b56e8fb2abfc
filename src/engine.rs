//! Recommendation engine: the explicit context shared by every request.
//!
//! Built once at startup from the gateways, the regional table, the loaded
//! classifiers and the aggregator settings, then shared behind an `Arc`.
//! A request flows resolver -> ensemble runner -> aggregator; the whole
//! pipeline races the caller's [`CancellationToken`] so a cancelled request
//! never returns a partial result.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::ensemble::{Aggregator, EnsembleRunner};
use crate::error::{EngineError, RequestError};
use crate::models::{EnsembleRecommendation, ModelPrediction, UserInput};
use crate::regional::RegionalTable;
use crate::resolver::{Resolution, Resolver};
use crate::sensor::{SensorGateway, SensorHealth};
use crate::weather::{Season, WeatherGateway};

/// Incoming `{user_input, sensor_id, region, season}` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default)]
    pub user_input: UserInput,
    #[serde(default)]
    pub sensor_id: Option<String>,
    pub region: String,
    #[serde(default)]
    pub season: Option<String>,
}

impl RecommendationRequest {
    /// Reject structurally invalid requests; returns the parsed season.
    pub fn validate(&self) -> Result<Option<Season>, RequestError> {
        // ---
        if self.region.trim().is_empty() {
            return Err(RequestError::MissingRegion);
        }
        if self.sensor_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(RequestError::EmptySensorId);
        }
        if let Some(field) = self.user_input.first_non_finite() {
            return Err(RequestError::NonFinite(field));
        }
        self.season.as_deref().map(str::parse::<Season>).transpose()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationResponse {
    pub request_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub recommendation: EnsembleRecommendation,
    pub resolution: Resolution,
    pub predictions: Vec<ModelPrediction>,
}

pub struct RecommendationEngine {
    sensors: Arc<SensorGateway>,
    regional: Arc<RegionalTable>,
    resolver: Resolver,
    runner: EnsembleRunner,
    aggregator: Aggregator,
}

impl RecommendationEngine {
    pub fn new(
        sensors: Arc<SensorGateway>,
        weather: Arc<WeatherGateway>,
        regional: Arc<RegionalTable>,
        runner: EnsembleRunner,
        aggregator: Aggregator,
    ) -> Self {
        // ---
        let resolver = Resolver::new(Arc::clone(&sensors), weather, Arc::clone(&regional));
        Self {
            sensors,
            regional,
            resolver,
            runner,
            aggregator,
        }
    }

    pub fn regional(&self) -> &RegionalTable {
        &self.regional
    }

    pub fn model_ids(&self) -> Vec<&str> {
        self.runner.model_ids()
    }

    /// Advisory health report for one sensor.
    pub async fn sensor_health(&self, sensor_id: &str, region: &str) -> SensorHealth {
        self.sensors.health_status(sensor_id, region).await
    }

    /// Validate, resolve, run the ensemble and aggregate.
    ///
    /// Only a malformed request or cancellation is an error. Upstream and
    /// model failures are recovered further down.
    pub async fn recommend(
        &self,
        request: &RecommendationRequest,
        cancel: &CancellationToken,
    ) -> Result<RecommendationResponse, EngineError> {
        // ---
        let season = request.validate()?;
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("recommend", %request_id, region = %request.region);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(%request_id, "Recommendation cancelled; discarding partial work");
                Err(EngineError::Cancelled)
            }
            response = self.run(request_id, request, season).instrument(span) => Ok(response),
        }
    }

    async fn run(&self, request_id: Uuid, request: &RecommendationRequest, season: Option<Season>) -> RecommendationResponse {
        // ---
        let sensor_id = request.sensor_id.as_deref().map(str::trim);
        let resolution = self
            .resolver
            .resolve(&request.user_input, sensor_id, request.region.trim(), season)
            .await;

        let predictions = self.runner.run_all(&resolution.input).await;
        let recommendation = self.aggregator.aggregate(&predictions, &resolution.input);

        if let Some(top) = recommendation.top() {
            tracing::info!(
                "Recommended {} ({:.3}) from {} prediction(s)",
                top.crop,
                top.confidence,
                predictions.len()
            );
        }

        RecommendationResponse {
            request_id,
            generated_at: Utc::now(),
            recommendation,
            resolution,
            predictions,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn request(region: &str) -> RecommendationRequest {
        RecommendationRequest {
            region: region.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_accepts_minimal_request() {
        // ---
        assert_eq!(request("Chitwan").validate(), Ok(None));
    }

    #[test]
    fn test_validate_parses_season() {
        // ---
        let req = RecommendationRequest {
            season: Some("Monsoon".into()),
            ..request("Chitwan")
        };
        assert_eq!(req.validate(), Ok(Some(Season::Monsoon)));

        let bad = RecommendationRequest {
            season: Some("dry".into()),
            ..request("Chitwan")
        };
        assert_eq!(bad.validate(), Err(RequestError::UnknownSeason("dry".into())));
    }

    #[test]
    fn test_validate_rejects_structural_problems() {
        // ---
        assert_eq!(request("  ").validate(), Err(RequestError::MissingRegion));

        let empty_sensor = RecommendationRequest {
            sensor_id: Some(" ".into()),
            ..request("Pokhara")
        };
        assert_eq!(empty_sensor.validate(), Err(RequestError::EmptySensorId));

        let nan = RecommendationRequest {
            user_input: UserInput {
                ph: Some(f64::NAN),
                ..Default::default()
            },
            ..request("Pokhara")
        };
        assert_eq!(nan.validate(), Err(RequestError::NonFinite("ph")));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        // ---
        let req: RecommendationRequest = serde_json::from_str(r#"{"region": "Jumla"}"#).expect("valid json");
        assert_eq!(req, request("Jumla"));
    }
}
