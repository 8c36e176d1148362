//! Router composition shared by the binary and the integration tests.

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::ws;

/// Builds the full application: WebSocket upgrade routes plus the REST API.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(ws::routes(&state))
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
