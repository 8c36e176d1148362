//! Domain layer: connection handles and the room registry.
//!
//! This module contains the state shared between connection tasks: the
//! [`Connection`] handle each session hands to the registry, and the
//! [`RoomRegistry`] that maps room names to their members.

pub mod connection;
pub mod connection_id;
pub mod room_registry;

pub use connection::{Connection, DeliveryError, OutboundFrame};
pub use connection_id::ConnectionId;
pub use room_registry::RoomRegistry;
