//! Wire message types.
//!
//! This module defines the unit exchanged over the transport and the codec
//! turning it into text frames.
//!
//! # Frame Kinds
//!
//! | Frame | Purpose |
//! |-------|---------|
//! | `ack`, `ack<id>`, `ack_ok` | Identity handshake (see [`crate::conn::handshake`]) |
//! | encoded [`Message`] | Control-plane or application traffic |
//!
//! # Control Events
//!
//! Namespace connect/disconnect and room join/leave travel as ordinary
//! messages whose `event` is one of the reserved names in [`events`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | [`Codec`] trait and default [`JsonCodec`] |
//! | `message` | [`Message`] and reserved event names |

// ============================================================================
// Submodules
// ============================================================================

/// Message encoding and decoding.
pub mod codec;

/// Message type and reserved event names.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{Codec, JsonCodec};
pub use message::{Message, events};
