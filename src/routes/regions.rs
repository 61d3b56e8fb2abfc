use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/regions", get(handler))
}

#[derive(Serialize)]
struct RegionsResponse {
    baseline: String,
    regions: Vec<String>,
}

/// Known regions; anything else resolves to `baseline`.
async fn handler(State((engine, _)): State<AppState>) -> Json<RegionsResponse> {
    // ---
    let table = engine.regional();
    Json(RegionsResponse {
        baseline: table.baseline().region.clone(),
        regions: table.regions().into_iter().map(str::to_string).collect(),
    })
}
