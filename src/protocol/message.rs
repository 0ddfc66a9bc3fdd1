//! Message type exchanged over a connection.
//!
//! # Format
//!
//! ```json
//! {
//!   "wait": "client_1712345678901234567",
//!   "ns": "/chat",
//!   "room": "general",
//!   "event": "chat",
//!   "body": "aGVsbG8=",
//!   "err": "optional error text"
//! }
//! ```
//!
//! `body` is base64 on the wire. Empty optional fields are omitted.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::identifiers::WaitToken;

// ============================================================================
// Reserved Events
// ============================================================================

/// Reserved control-plane event names.
pub mod events {
    /// Request to connect to a namespace.
    pub const ON_NAMESPACE_CONNECT: &str = "_OnNamespaceConnect";
    /// Namespace connection completed.
    pub const ON_NAMESPACE_CONNECTED: &str = "_OnNamespaceConnected";
    /// Request to disconnect from a namespace.
    pub const ON_NAMESPACE_DISCONNECT: &str = "_OnNamespaceDisconnect";
    /// Request to join a room.
    pub const ON_ROOM_JOIN: &str = "_OnRoomJoin";
    /// Room join completed.
    pub const ON_ROOM_JOINED: &str = "_OnRoomJoined";
    /// Request to leave a room.
    pub const ON_ROOM_LEAVE: &str = "_OnRoomLeave";
    /// Room leave completed.
    pub const ON_ROOM_LEFT: &str = "_OnRoomLeft";
}

// ============================================================================
// Message
// ============================================================================

/// A single unit of traffic on a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Correlation token when this message is a request or a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<WaitToken>,

    /// Target namespace.
    #[serde(rename = "ns", default)]
    pub namespace: String,

    /// Target room within the namespace (empty for namespace-wide).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room: String,

    /// Event name.
    pub event: String,

    /// Application payload.
    #[serde(default, with = "body_base64", skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<u8>,

    /// Error text carried by a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,

    /// Set when the message originated on this side; never serialized.
    #[serde(skip)]
    pub is_local: bool,
}

impl Message {
    /// Creates a namespace-wide message.
    #[must_use]
    pub fn new(namespace: impl Into<String>, event: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            namespace: namespace.into(),
            event: event.into(),
            body,
            is_local: true,
            ..Default::default()
        }
    }

    /// Scopes the message to a room.
    #[inline]
    #[must_use]
    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room = room.into();
        self
    }

    /// Builds a failed reply carrying only an error.
    #[must_use]
    pub fn from_error(err: impl ToString) -> Self {
        Self {
            err: Some(err.to_string()),
            ..Default::default()
        }
    }

    /// Returns the wait token if present and non-empty.
    #[inline]
    #[must_use]
    pub fn wait_token(&self) -> Option<&WaitToken> {
        self.wait.as_ref().filter(|token| !token.as_str().is_empty())
    }

    /// Returns `true` if this message carries an error.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.err.is_some()
    }

    /// Returns `true` for a namespace connect request.
    #[inline]
    #[must_use]
    pub fn is_connect(&self) -> bool {
        self.event == events::ON_NAMESPACE_CONNECT
    }

    /// Returns `true` for a namespace disconnect request.
    #[inline]
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        self.event == events::ON_NAMESPACE_DISCONNECT
    }

    /// Returns `true` for a room join request.
    #[inline]
    #[must_use]
    pub fn is_room_join(&self) -> bool {
        self.event == events::ON_ROOM_JOIN
    }

    /// Returns `true` for a room leave request.
    #[inline]
    #[must_use]
    pub fn is_room_leave(&self) -> bool {
        self.event == events::ON_ROOM_LEAVE
    }

    /// Returns `true` for any control-plane message.
    #[inline]
    #[must_use]
    pub fn is_control(&self) -> bool {
        self.is_connect() || self.is_disconnect() || self.is_room_join() || self.is_room_leave()
    }
}

mod body_base64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================
