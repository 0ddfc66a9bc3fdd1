//! In-process transport.
//!
//! [`MemorySocket::pair`] returns two connected ends backed by tokio
//! channels. Closing either end closes the link for both.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Error, Result};

use super::socket::{RequestInfo, Socket, bounded};

// ============================================================================
// MemorySocket
// ============================================================================

/// One end of an in-memory duplex link.
pub struct MemorySocket {
    /// Frames to the peer.
    tx: mpsc::UnboundedSender<String>,
    /// Frames from the peer.
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
    /// Shared by both ends.
    link: CancellationToken,
    /// Request metadata.
    request: RequestInfo,
}

impl MemorySocket {
    /// Creates two connected ends.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let link = CancellationToken::new();

        let a = Self {
            tx: a_tx,
            rx: Mutex::new(a_rx),
            link: link.clone(),
            request: RequestInfo::default(),
        };
        let b = Self {
            tx: b_tx,
            rx: Mutex::new(b_rx),
            link,
            request: RequestInfo::default(),
        };
        (a, b)
    }

    /// Replaces the request metadata reported by this end.
    #[must_use]
    pub fn with_request(mut self, request: RequestInfo) -> Self {
        self.request = request;
        self
    }

    /// Returns a frame already sent by the peer, without waiting.
    pub fn try_read_text(&self) -> Option<String> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Returns `true` once either end has closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.link.is_cancelled()
    }
}

#[async_trait]
impl Socket for MemorySocket {
    async fn read_text(&self, timeout: Option<Duration>) -> Result<String> {
        bounded(
            timeout,
            async {
                let mut rx = self.rx.lock().await;
                tokio::select! {
                    _ = self.link.cancelled() => Err(Error::ConnectionClosed),
                    frame = rx.recv() => frame.ok_or(Error::ConnectionClosed),
                }
            },
            Error::read_timeout,
        )
        .await
    }

    async fn write_text(&self, frame: &str, _timeout: Option<Duration>) -> Result<()> {
        if self.link.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }
        trace!(frame, "memory write");
        self.tx
            .send(frame.to_owned())
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        self.link.cancel();
    }

    fn request(&self) -> &RequestInfo {
        &self.request
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_delivers_in_order() {
        let (a, b) = MemorySocket::pair();
        a.write_text("one", None).await.unwrap();
        a.write_text("two", None).await.unwrap();

        assert_eq!(b.read_text(None).await.unwrap(), "one");
        assert_eq!(b.try_read_text().as_deref(), Some("two"));
        assert!(b.try_read_text().is_none());
    }

    #[tokio::test]
    async fn test_close_fails_both_ends() {
        let (a, b) = MemorySocket::pair();
        b.close();

        assert!(a.is_closed());
        assert!(matches!(a.read_text(None).await, Err(Error::ConnectionClosed)));
        assert!(matches!(
            a.write_text("x", None).await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let (a, _b) = MemorySocket::pair();
        let result = a.read_text(Some(Duration::from_millis(10))).await;
        assert!(matches!(result, Err(Error::ReadTimeout { .. })));
    }
}
