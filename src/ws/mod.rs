//! WebSocket layer: envelope, admission handshake, throttling, sessions.
//!
//! Every client connects to `/ws` (or `/`), authenticates with an `auth`
//! message, joins a room with `join`, and then exchanges `message`s with
//! the other members of that room.

pub mod handler;
pub mod handshake;
pub mod messages;
pub mod rate_limiter;
pub mod session;

use axum::Router;
use axum::middleware;
use axum::routing::get;

use crate::app_state::AppState;
use crate::middleware::{require_allowed_origin, require_upgrade_token};

/// WebSocket upgrade routes with origin and token gating applied.
pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handler::ws_handler))
        .route("/ws", get(handler::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_upgrade_token,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_allowed_origin,
        ))
}
