//! # chat-relay
//!
//! Real-time WebSocket chat relay: clients connect, authenticate with a
//! bearer token, join a named room, and exchange text messages with every
//! other member of that room.
//!
//! The core is the connection lifecycle: a concurrent [`domain::RoomRegistry`],
//! the per-connection [`ws::handshake::AuthJoinHandshake`] with its auth and
//! join deadlines, and the per-connection [`ws::rate_limiter::RateLimiter`].
//! Everything else is transport plumbing around them.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, HTTP)
//!     │
//!     ├── Origin / token gate (middleware/)
//!     ├── WS Handler + writer task (ws/handler)
//!     ├── REST Handlers (api/)
//!     │
//!     ├── ConnectionSession (ws/session)
//!     │     ├── RateLimiter
//!     │     └── AuthJoinHandshake ── TokenValidator (auth/)
//!     │
//!     └── RoomRegistry (domain/)
//! ```

pub mod api;
pub mod app;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod middleware;
pub mod ws;
