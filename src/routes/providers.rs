use axum::Json;

use crate::models::{KnownProvider, KNOWN_PROVIDERS};

/// Streaming services the client can filter by
pub async fn list() -> Json<&'static [KnownProvider]> {
    Json(KNOWN_PROVIDERS)
}
