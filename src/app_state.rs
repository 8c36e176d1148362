//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::auth::TokenValidator;
use crate::config::{ANY_ORIGIN, RelayConfig, SessionSettings};
use crate::domain::RoomRegistry;
use crate::ws::session::SessionContext;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
///
/// Built once in `main` and cloned per request; every clone points at the
/// same [`RoomRegistry`].
#[derive(Debug, Clone)]
pub struct AppState {
    /// Room membership for the whole process.
    pub registry: Arc<RoomRegistry>,
    /// Token check shared by the upgrade gate and the `auth` message.
    pub validator: Arc<dyn TokenValidator>,
    /// Origins permitted to upgrade. Empty refuses every origin.
    pub allowed_origins: Arc<[String]>,
    /// Whether `?token=` is checked before the upgrade.
    pub upgrade_token_required: bool,
    /// Per-session deadlines and limits.
    pub session: SessionSettings,
}

impl AppState {
    /// Builds state from loaded configuration and a fresh registry.
    #[must_use]
    pub fn new(config: &RelayConfig, validator: Arc<dyn TokenValidator>) -> Self {
        Self {
            registry: Arc::new(RoomRegistry::new()),
            validator,
            allowed_origins: config.allowed_origins.clone().into(),
            upgrade_token_required: config.upgrade_token_required,
            session: config.session,
        }
    }

    /// The slice of state a single WebSocket session needs.
    #[must_use]
    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            registry: Arc::clone(&self.registry),
            validator: Arc::clone(&self.validator),
            settings: self.session,
        }
    }

    /// Returns `true` if `origin` may open a WebSocket.
    ///
    /// An empty allow-list admits nothing; [`ANY_ORIGIN`] admits everything.
    #[must_use]
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.iter().any(|allowed| allowed == ANY_ORIGIN) {
            return true;
        }
        origin.is_some_and(|o| self.allowed_origins.iter().any(|allowed| allowed == o))
    }
}
