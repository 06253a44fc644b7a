use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware, pipeline, steps, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Steps
        .route("/steps", get(steps::list_steps))
        .route("/steps/stop-all", post(steps::stop_all))
        .route("/steps/{id}", get(steps::get_step))
        .route(
            "/steps/{id}/config",
            get(steps::get_step_config).put(steps::update_step_config),
        )
        .route("/steps/{id}/run", post(steps::run_step))
        .route("/steps/{id}/stop", post(steps::stop_step))
        // Pipeline
        .route("/pipeline", get(pipeline::get_pipeline))
        .route("/pipeline/run", post(pipeline::run_pipeline))
        .route("/pipeline/reset", post(pipeline::reset_pipeline))
        // Live updates
        .route("/ws", get(ws::ws_handler));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
