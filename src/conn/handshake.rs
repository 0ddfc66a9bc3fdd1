//! Identity handshake policies.
//!
//! The handshake runs over the same transport as data, using frames that
//! start with the reserved `ack` tag.
//!
//! # Exchange
//!
//! ```text
//! Client                         Server (id = 7)
//!   │ ─────────── "ack" ──────────► │
//!   │ ◄────────── "ack7" ────────── │
//!   │  adopt id 7, acknowledged     │
//!   │ ────────── "ack_ok" ────────► │
//!   │                               │ acknowledged
//! ```
//!
//! Policies are pure: they inspect a frame and return the actions the read
//! loop must execute, in order.

// ============================================================================
// Imports
// ============================================================================

use crate::identifiers::ConnId;

use super::Role;

// ============================================================================
// Constants
// ============================================================================

/// Reserved handshake tag.
pub const ACK: &str = "ack";

/// Frame sent by the client once it adopted its id.
pub const ACK_OK: &str = "ack_ok";

/// Returns `true` if `frame` belongs to the handshake.
#[inline]
#[must_use]
pub fn is_handshake_frame(frame: &str) -> bool {
    frame.starts_with(ACK)
}

// ============================================================================
// HandshakeAction
// ============================================================================

/// Step the read loop performs on behalf of a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeAction {
    /// Write this raw frame to the peer.
    Reply(String),
    /// Take this id as the connection's identity.
    AdoptId(ConnId),
    /// Mark the connection acknowledged and replay buffered frames.
    Acknowledge,
}

// ============================================================================
// HandshakePolicy
// ============================================================================

/// Role-specific handshake behaviour, chosen once per connection.
pub trait HandshakePolicy: Send + Sync {
    /// Frame to send when the reader starts, if this side opens the exchange.
    fn initiate(&self) -> Option<String>;

    /// Reacts to a handshake frame received while unacknowledged.
    fn on_frame(&self, frame: &str, own_id: &ConnId) -> Vec<HandshakeAction>;
}

/// Returns the policy for `role`.
#[must_use]
pub fn policy_for(role: Role) -> Box<dyn HandshakePolicy> {
    match role {
        Role::Client => Box::new(ClientHandshake),
        Role::Server => Box::new(ServerHandshake),
    }
}

// ============================================================================
// ClientHandshake
// ============================================================================

/// Dialing side: asks for an id, adopts it, confirms.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientHandshake;

impl HandshakePolicy for ClientHandshake {
    fn initiate(&self) -> Option<String> {
        Some(ACK.to_owned())
    }

    fn on_frame(&self, frame: &str, _own_id: &ConnId) -> Vec<HandshakeAction> {
        let offered = frame.strip_prefix(ACK).unwrap_or_default();
        vec![
            HandshakeAction::AdoptId(ConnId::new(offered)),
            HandshakeAction::Acknowledge,
            HandshakeAction::Reply(ACK_OK.to_owned()),
        ]
    }
}

// ============================================================================
// ServerHandshake
// ============================================================================

/// Accepting side: offers its assigned id, waits for confirmation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerHandshake;

impl HandshakePolicy for ServerHandshake {
    fn initiate(&self) -> Option<String> {
        None
    }

    fn on_frame(&self, frame: &str, own_id: &ConnId) -> Vec<HandshakeAction> {
        if frame.len() == ACK.len() {
            vec![HandshakeAction::Reply(format!("{ACK}{own_id}"))]
        } else {
            vec![HandshakeAction::Acknowledge]
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
