//! In-flight reply registry.
//!
//! Maps a [`WaitToken`] to the oneshot sender of the caller blocked in
//! `ask`. Owned by exactly one connection.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::trace;

use crate::identifiers::WaitToken;
use crate::protocol::Message;

// ============================================================================
// Types
// ============================================================================

/// Map of wait tokens to reply channels.
type WaitMap = FxHashMap<WaitToken, oneshot::Sender<Message>>;

// ============================================================================
// WaitRegistry
// ============================================================================

#[derive(Default)]
pub(crate) struct WaitRegistry {
    entries: RwLock<WaitMap>,
}

impl WaitRegistry {
    /// Registers a waiter and returns its reply receiver.
    pub(crate) fn register(&self, token: WaitToken) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        self.entries.write().insert(token, tx);
        rx
    }

    /// Drops the entry for `token`, if any.
    pub(crate) fn remove(&self, token: &WaitToken) {
        self.entries.write().remove(token);
    }

    /// Hands `msg` to the waiter registered under its token.
    ///
    /// Returns the message back when nobody waits for it.
    pub(crate) fn try_deliver(&self, token: &WaitToken, msg: Message) -> Option<Message> {
        // Inbound requests from the peer carry tokens we never registered.
        if !self.entries.read().contains_key(token) {
            return Some(msg);
        }

        let Some(tx) = self.entries.write().remove(token) else {
            return Some(msg);
        };

        if tx.send(msg).is_err() {
            trace!(%token, "Reply arrived after waiter left");
        }
        None
    }

    /// Removes every entry. Dropped senders wake their waiters.
    pub(crate) fn clear(&self) -> usize {
        let drained: Vec<_> = self.entries.write().drain().collect();
        drained.len()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

// ============================================================================
// Tests
// ============================================================================
