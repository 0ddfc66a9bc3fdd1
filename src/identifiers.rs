//! Type-safe identifiers for connections and in-flight requests.
//!
//! Newtype wrappers prevent mixing a connection id with a wait token at
//! compile time.
//!
//! | Type | Source |
//! |------|--------|
//! | [`ConnId`] | Registry (server) or handshake identity offer (client) |
//! | [`WaitToken`] | Nanosecond clock reading, one per `ask` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conn::Role;

// ============================================================================
// Constants
// ============================================================================

/// Prefix applied to client-generated wait tokens.
const CLIENT_WAIT_PREFIX: &str = "client_";

/// Last clock reading handed out as a wait token.
static LAST_WAIT_NANOS: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// ConnId
// ============================================================================

/// Identity of a connection.
///
/// Assigned by the accepting side and adopted by the client during the
/// handshake. May be empty before the handshake completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(String);

impl ConnId {
    /// Creates an id from any string.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if no id has been assigned yet.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// WaitToken
// ============================================================================

/// Correlation id pairing an outbound request with its reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaitToken(String);

impl WaitToken {
    /// Generates a new token from the current time in nanoseconds.
    ///
    /// Readings are forced strictly increasing across the process so two
    /// calls within the same clock tick still differ. Client tokens carry a
    /// prefix so they never collide with server tokens from the same clock.
    #[must_use]
    pub fn generate(role: Role) -> Self {
        let nanos = next_wait_nanos();
        match role {
            Role::Client => Self(format!("{CLIENT_WAIT_PREFIX}{nanos}")),
            Role::Server => Self(nanos.to_string()),
        }
    }

    /// Wraps a token received from the wire.
    #[inline]
    #[must_use]
    pub fn from_wire(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this token was generated by a client.
    #[inline]
    #[must_use]
    pub fn is_client(&self) -> bool {
        self.0.starts_with(CLIENT_WAIT_PREFIX)
    }
}

impl fmt::Display for WaitToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn next_wait_nanos() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();

    let mut last = LAST_WAIT_NANOS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_WAIT_NANOS.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(current) => last = current,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    use proptest::prelude::*;

    #[test]
    fn test_client_token_prefixed() {
        let token = WaitToken::generate(Role::Client);
        assert!(token.as_str().starts_with("client_"));
        assert!(token.is_client());
    }

    #[test]
    fn test_server_token_is_decimal() {
        let token = WaitToken::generate(Role::Server);
        assert!(token.as_str().chars().all(|c| c.is_ascii_digit()));
        assert!(!token.is_client());
    }

    #[test]
    fn test_tokens_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..500)
                        .map(|_| WaitToken::generate(Role::Server))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for token in handle.join().unwrap() {
                assert!(seen.insert(token));
            }
        }
        assert_eq!(seen.len(), 2000);
    }

    #[test]
    fn test_conn_id_display() {
        let id = ConnId::new("42");
        assert_eq!(id.to_string(), "42");
        assert!(!id.is_empty());
        assert!(ConnId::default().is_empty());
    }

    proptest! {
        #[test]
        fn prop_server_tokens_increase(count in 1usize..64) {
            let readings: Vec<u64> = (0..count)
                .map(|_| WaitToken::generate(Role::Server).as_str().parse().unwrap())
                .collect();
            prop_assert!(readings.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
