//! API Routes
//!
//! Configures the Axum router with the cache admin endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, health_handler, invalidate_key_handler, invalidate_tags_handler,
    metrics_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check with active backend
/// - `GET /cache/stats` - Size, tags, version and backend
/// - `GET /cache/metrics` - Hit/miss/set/invalidation counters
/// - `DELETE /cache/keys/:key` - Invalidate one key
/// - `POST /cache/invalidate` - Invalidate every entry carrying any given tag
/// - `DELETE /cache` - Clear the cache
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/cache", delete(clear_handler))
        .route("/cache/stats", get(stats_handler))
        .route("/cache/metrics", get(metrics_handler))
        .route("/cache/keys/:key", delete(invalidate_key_handler))
        .route("/cache/invalidate", post(invalidate_tags_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        create_router(AppState::new(Cache::local()))
    }

    async fn status_of(method: &str, uri: &str, body: Body) -> StatusCode {
        create_test_app()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        assert_eq!(status_of("GET", "/health", Body::empty()).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        assert_eq!(
            status_of("GET", "/cache/stats", Body::empty()).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        assert_eq!(
            status_of("GET", "/cache/metrics", Body::empty()).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_invalidate_missing_key_is_ok() {
        assert_eq!(
            status_of("DELETE", "/cache/keys/nonexistent", Body::empty()).await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_invalidate_tags_bad_request() {
        assert_eq!(
            status_of("POST", "/cache/invalidate", Body::from(r#"{"tags":[]}"#)).await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_unknown_route() {
        assert_eq!(
            status_of("GET", "/get/key", Body::empty()).await,
            StatusCode::NOT_FOUND
        );
    }
}
