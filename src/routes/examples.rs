use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use crate::{
    error::AppResult, middleware::request_id::RequestId, models::SearchExamples,
    routes::AppState, services::examples,
};

/// Handler for the search examples endpoint
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
) -> AppResult<Json<SearchExamples>> {
    tracing::debug!(request_id = %request_id, "Generating search examples");

    let examples = examples::generate_examples(state.recommender.language_model()).await?;
    Ok(Json(examples))
}
