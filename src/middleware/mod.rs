//! Transport gating applied to the WebSocket upgrade routes.
//!
//! Both checks run before the upgrade, so a rejected client sees a plain
//! HTTP error and never gets a socket.

use axum::extract::{Query, Request, State};
use axum::http::header::ORIGIN;
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;

use crate::app_state::AppState;
use crate::error::RelayError;

/// Query string accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct UpgradeQuery {
    /// Bearer token checked when the upgrade gate is enabled.
    #[serde(default)]
    pub token: Option<String>,
}

/// Rejects upgrades whose `Origin` header is not on the allow-list.
///
/// # Errors
///
/// Returns [`RelayError::OriginRejected`] (403) on mismatch.
pub async fn require_allowed_origin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, RelayError> {
    let origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok());

    if !state.origin_allowed(origin) {
        let origin = origin.unwrap_or("<none>").to_string();
        tracing::warn!(origin = %origin, "rejected websocket origin");
        return Err(RelayError::OriginRejected(origin));
    }
    Ok(next.run(request).await)
}

/// Requires a valid `?token=` when the upgrade gate is enabled.
///
/// The in-band `auth` message is still required after the upgrade.
///
/// # Errors
///
/// Returns [`RelayError::Unauthorized`] (401) when the token is missing
/// or fails validation.
pub async fn require_upgrade_token(
    State(state): State<AppState>,
    Query(query): Query<UpgradeQuery>,
    request: Request,
    next: Next,
) -> Result<Response, RelayError> {
    if !state.upgrade_token_required {
        return Ok(next.run(request).await);
    }
    let valid = query
        .token
        .as_deref()
        .is_some_and(|token| state.validator.validate(token));
    if !valid {
        tracing::warn!("rejected websocket upgrade without a valid token");
        return Err(RelayError::Unauthorized);
    }
    Ok(next.run(request).await)
}
