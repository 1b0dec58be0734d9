use std::sync::Arc;

use axum::{middleware, routing::get, routing::post, Router};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};
use crate::services::{QueryRouter, RecommendationService};

/// Creates the API router for whichever services the state carries
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new().route("/health", get(handlers::health_check));

    if let Some(queries) = state.queries {
        router = router.merge(query_routes(queries));
    }
    if let Some(recommender) = state.recommender {
        router = router.merge(inference_routes(recommender));
    }

    // Request ids are assigned before the trace span is created
    router.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(request_id_middleware))
            .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
            .layer(CorsLayer::permissive()),
    )
}

fn query_routes(router: Arc<QueryRouter>) -> Router {
    Router::new()
        .route(
            "/recommendations",
            get(handlers::get_recommendations).post(handlers::post_recommendations),
        )
        .with_state(router)
}

fn inference_routes(service: Arc<RecommendationService>) -> Router {
    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/invocations", post(handlers::invocations))
        .with_state(service)
}
