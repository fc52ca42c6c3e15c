use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::request_id::RequestId,
    models::{RecommendRequest, RecommendResponse},
    routes::AppState,
};

/// Handler for the recommendations endpoint
pub async fn recommend(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RecommendRequest>,
) -> AppResult<Json<RecommendResponse>> {
    tracing::info!(
        request_id = %request_id,
        query = ?request.query,
        streaming_services = ?request.streaming_services,
        "Processing recommendation request"
    );

    let response = state.recommender.recommend(request).await?;

    tracing::info!(
        request_id = %request_id,
        recommendations = response.recommendations.len(),
        other_services = response.other_services.len(),
        unmatched = response.unmatched.len(),
        "Recommendation request completed"
    );

    Ok(Json(response))
}
