use axum::{extract::State, routing::post, Json, Router};
use tracing::info;

use super::AppState;
use crate::engine::{RecommendationRequest, RecommendationResponse};
use crate::error::EngineError;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/recommendations", post(handler))
}

async fn handler(
    State((engine, shutdown)): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> Result<Json<RecommendationResponse>, EngineError> {
    // ---
    info!("POST /recommendations - region {}", request.region);

    // Child of the server token: shutdown cancels every in-flight request,
    // and the guard cancels this one if the client goes away.
    let cancel = shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    engine.recommend(&request, &cancel).await.map(Json)
}
