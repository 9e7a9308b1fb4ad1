use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::FeatureState;
use crate::db;

/// Health check handler
pub async fn health_check(State(state): State<FeatureState>) -> Response {
    let cache = if state.service.cache().has_primary() {
        "redis"
    } else {
        "local"
    };

    let Some(pool) = &state.db else {
        return Json(json!({
            "status": "healthy",
            "database": "memory",
            "cache": cache
        }))
        .into_response();
    };

    match db::health_check(pool).await {
        Ok(()) => Json(json!({
            "status": "healthy",
            "database": "connected",
            "cache": cache
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "unreachable",
                    "cache": cache
                })),
            )
                .into_response()
        }
    }
}
