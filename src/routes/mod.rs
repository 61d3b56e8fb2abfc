use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;

use crate::engine::RecommendationEngine;

mod health;
mod recommend;
mod regions;
mod sensors;

/// Shared engine plus the server's shutdown token.
pub type AppState = (Arc<RecommendationEngine>, CancellationToken);

// ---

pub fn router(engine: Arc<RecommendationEngine>, shutdown: CancellationToken) -> Router {
    // ---
    Router::new()
        .merge(recommend::router())
        .merge(sensors::router())
        .merge(regions::router())
        .merge(health::router())
        .with_state((engine, shutdown))
}
