use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use super::AppState;
use crate::sensor::SensorHealth;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/sensors/{sensor_id}/health", get(handler))
}

#[derive(Debug, Deserialize)]
struct HealthQuery {
    /// Region used if a default reading has to be synthesized.
    region: Option<String>,
}

async fn handler(
    Path(sensor_id): Path<String>,
    Query(params): Query<HealthQuery>,
    State((engine, _)): State<AppState>,
) -> Json<SensorHealth> {
    // ---
    let region = params
        .region
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| engine.regional().baseline().region.clone());

    info!("GET /sensors/{}/health - region {}", sensor_id, region);
    Json(engine.sensor_health(&sensor_id, &region).await)
}
