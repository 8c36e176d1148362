//! WebSocket message envelope shared by both directions.
//!
//! Inbound frames are attacker-controlled: decoding only establishes the
//! shape, and every field is re-checked by the handshake and session
//! before it is trusted.

use serde::{Deserialize, Serialize};

/// Wire unit exchanged with clients, one per text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    /// Bearer token for `auth`, chat text for `message`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Acting user's display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Target room (inbound `join` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Room size after a join or leave (outbound only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_users: Option<usize>,
}

/// Discriminator for envelope types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Client → Server: present a bearer token.
    Auth,
    /// Client → Server: join a room. Server → Client: someone joined.
    Join,
    /// Client → Server: leaving. Server → Client: someone left.
    UserLeave,
    /// Chat text in either direction.
    Message,
    /// Any other `type` string. Always a protocol violation.
    #[serde(other)]
    Unknown,
}

impl MessageType {
    /// Wire name of this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Join => "join",
            Self::UserLeave => "userleave",
            Self::Message => "message",
            Self::Unknown => "unknown",
        }
    }
}

impl Envelope {
    fn bare(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            body: None,
            username: None,
            room: None,
            total_users: None,
        }
    }

    /// Server notice that `username` joined; `total_users` includes them.
    #[must_use]
    pub fn joined(username: impl Into<String>, total_users: usize) -> Self {
        Self {
            username: Some(username.into()),
            total_users: Some(total_users),
            ..Self::bare(MessageType::Join)
        }
    }

    /// Server notice that `username` left; `total_users` excludes them.
    #[must_use]
    pub fn user_left(username: impl Into<String>, total_users: usize) -> Self {
        Self {
            username: Some(username.into()),
            total_users: Some(total_users),
            ..Self::bare(MessageType::UserLeave)
        }
    }

    /// Chat text from `username`.
    #[must_use]
    pub fn chat(username: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            body: Some(body.into()),
            ..Self::bare(MessageType::Message)
        }
    }

    /// Decodes one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the frame is not an object with a
    /// string `type` and correctly typed optional fields.
    pub fn decode(frame: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(frame)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> Envelope {
        let Ok(env) = serde_json::from_value(value) else {
            panic!("envelope should decode");
        };
        env
    }

    #[test]
    fn decodes_auth() {
        let env = decode(json!({"type": "auth", "body": "tok"}));
        assert_eq!(env.msg_type, MessageType::Auth);
        assert_eq!(env.body.as_deref(), Some("tok"));
        assert_eq!(env.username, None);
    }

    #[test]
    fn decodes_join() {
        let env = decode(json!({"type": "join", "username": "alice", "room": "lobby"}));
        assert_eq!(env.msg_type, MessageType::Join);
        assert_eq!(env.username.as_deref(), Some("alice"));
        assert_eq!(env.room.as_deref(), Some("lobby"));
    }

    #[test]
    fn unknown_type_decodes_as_unknown() {
        let env = decode(json!({"type": "shout", "body": "x"}));
        assert_eq!(env.msg_type, MessageType::Unknown);
    }

    #[test]
    fn missing_type_is_rejected() {
        assert!(Envelope::decode(br#"{"body":"x"}"#).is_err());
    }

    #[test]
    fn wrongly_typed_field_is_rejected() {
        assert!(Envelope::decode(br#"{"type":"message","body":42}"#).is_err());
    }

    #[test]
    fn non_json_is_rejected() {
        assert!(Envelope::decode(b"hello").is_err());
    }

    #[test]
    fn joined_notice_wire_shape() {
        let Ok(value) = serde_json::to_value(Envelope::joined("alice", 1)) else {
            panic!("serialize");
        };
        assert_eq!(value, json!({"type": "join", "username": "alice", "totalUsers": 1}));
    }

    #[test]
    fn chat_wire_shape_has_no_total() {
        let Ok(value) = serde_json::to_value(Envelope::chat("bob", "hi")) else {
            panic!("serialize");
        };
        assert_eq!(value, json!({"type": "message", "username": "bob", "body": "hi"}));
    }

    #[test]
    fn user_left_keeps_zero_total() {
        let Ok(value) = serde_json::to_value(Envelope::user_left("bob", 0)) else {
            panic!("serialize");
        };
        assert_eq!(value["type"], "userleave");
        assert_eq!(value["totalUsers"], 0);
    }
}
