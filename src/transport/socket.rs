//! Transport abstraction consumed by the connection.
//!
//! A [`Socket`] moves whole text frames. The read loop is its only reader;
//! writes may come from any task at once, so implementations serialize
//! them internally.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::error::{Error, Result};

// ============================================================================
// RequestInfo
// ============================================================================

/// Metadata of the request that opened the transport.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// Peer address, when known.
    pub remote_addr: Option<SocketAddr>,
    /// Request path (server side) or URL (client side).
    pub path: String,
    /// Request headers as received.
    pub headers: Vec<(String, String)>,
}

impl RequestInfo {
    /// Returns the first header matching `name`, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

// ============================================================================
// Socket
// ============================================================================

/// Message-framed duplex transport.
#[async_trait]
pub trait Socket: Send + Sync {
    /// Reads the next text frame. `None` waits forever.
    async fn read_text(&self, timeout: Option<Duration>) -> Result<String>;

    /// Writes one text frame. `None` waits forever.
    async fn write_text(&self, frame: &str, timeout: Option<Duration>) -> Result<()>;

    /// Forcefully closes the underlying transport.
    ///
    /// Pending and future reads fail with [`Error::ConnectionClosed`].
    fn close(&self);

    /// Metadata of the originating request.
    fn request(&self) -> &RequestInfo;
}

/// Runs `fut`, bounding it by `limit` when set.
pub(crate) async fn bounded<T, F>(
    limit: Option<Duration>,
    fut: F,
    on_timeout: fn(u64) -> Error,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => timeout(limit, fut)
            .await
            .map_err(|_| on_timeout(limit.as_millis() as u64))?,
        None => fut.await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_case_insensitive() {
        let info = RequestInfo {
            headers: vec![("X-Client".into(), "cli".into())],
            ..Default::default()
        };
        assert_eq!(info.header("x-client"), Some("cli"));
        assert_eq!(info.header("missing"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded(
            Some(Duration::from_millis(50)),
            std::future::pending(),
            Error::read_timeout,
        )
        .await;
        assert!(matches!(result, Err(Error::ReadTimeout { timeout_ms: 50 })));
    }
}
