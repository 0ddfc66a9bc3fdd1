//! WebSocket transport.
//!
//! Wraps a `tokio_tungstenite` stream split into sink and stream halves.
//! Only text frames carry traffic; binary frames holding UTF-8 are accepted
//! as text, ping/pong are skipped, a close frame ends the read side.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::socket::{RequestInfo, Socket, bounded};

// ============================================================================
// Constants
// ============================================================================

/// How long the close frame may take to flush.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Types
// ============================================================================

type WsSink<S> = SplitSink<WebSocketStream<S>, WsMessage>;
type WsStream<S> = SplitStream<WebSocketStream<S>>;

// ============================================================================
// WsSocket
// ============================================================================

/// [`Socket`] over a WebSocket stream.
pub struct WsSocket<S> {
    /// Write half, shared with the close task.
    sink: Arc<Mutex<WsSink<S>>>,
    /// Read half.
    stream: Mutex<WsStream<S>>,
    /// Cancelled on close.
    closed: CancellationToken,
    /// Request metadata.
    request: RequestInfo,
}

impl<S> WsSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an established WebSocket stream.
    pub fn new(ws_stream: WebSocketStream<S>, request: RequestInfo) -> Self {
        let (sink, stream) = ws_stream.split();
        Self {
            sink: Arc::new(Mutex::new(sink)),
            stream: Mutex::new(stream),
            closed: CancellationToken::new(),
            request,
        }
    }

    async fn next_text(&self) -> Result<String> {
        let mut stream = self.stream.lock().await;
        loop {
            let message = tokio::select! {
                _ = self.closed.cancelled() => return Err(Error::ConnectionClosed),
                message = stream.next() => message,
            };

            match message {
                Some(Ok(WsMessage::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Ok(text),
                    Err(_) => trace!("Skipping non UTF-8 binary frame"),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!("WebSocket closed by remote");
                    return Err(Error::ConnectionClosed);
                }
                Some(Err(e)) => return Err(e.into()),
                // Ping, Pong, raw frames
                Some(Ok(_)) => {}
            }
        }
    }
}

#[async_trait]
impl<S> Socket for WsSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_text(&self, timeout: Option<Duration>) -> Result<String> {
        bounded(timeout, self.next_text(), Error::read_timeout).await
    }

    async fn write_text(&self, frame: &str, timeout: Option<Duration>) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }

        let send = async {
            let mut sink = self.sink.lock().await;
            sink.send(WsMessage::Text(frame.to_owned().into())).await?;
            Ok(())
        };

        bounded(
            timeout,
            async {
                tokio::select! {
                    _ = self.closed.cancelled() => Err(Error::ConnectionClosed),
                    result = send => result,
                }
            },
            Error::write_timeout,
        )
        .await
    }

    fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();

        // Best-effort close frame, given up on if the peer stopped reading.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let sink = Arc::clone(&self.sink);
            runtime.spawn(async move {
                let closing = async { sink.lock().await.close().await };
                if tokio::time::timeout(CLOSE_FRAME_TIMEOUT, closing).await.is_err() {
                    debug!("Close frame not flushed, dropping sink");
                }
            });
        }
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

    use tokio::io::duplex;
    use tokio_tungstenite::tungstenite::protocol::Role as WsRole;

    async fn socket_pair() -> (
        WsSocket<tokio::io::DuplexStream>,
        WsSocket<tokio::io::DuplexStream>,
    ) {
        let (a, b) = duplex(64 * 1024);
        let a = WebSocketStream::from_raw_socket(a, WsRole::Server, None).await;
        let b = WebSocketStream::from_raw_socket(b, WsRole::Client, None).await;
        (
            WsSocket::new(a, RequestInfo::default()),
            WsSocket::new(b, RequestInfo::default()),
        )
    }

    #[tokio::test]
    async fn test_text_frames_cross() {
        let (server, client) = socket_pair().await;

        client.write_text("ack", None).await.unwrap();
        assert_eq!(server.read_text(None).await.unwrap(), "ack");

        server.write_text("ack7", None).await.unwrap();
        assert_eq!(client.read_text(None).await.unwrap(), "ack7");
    }

    #[tokio::test]
    async fn test_close_fails_local_read_and_write() {
        let (server, _client) = socket_pair().await;
        server.close();

        assert!(matches!(server.read_text(None).await, Err(Error::ConnectionClosed)));
        assert!(matches!(
            server.write_text("x", None).await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_interrupts_stalled_write() {
        // Small pipe and a peer that never reads, so the write blocks.
        let (a, b) = duplex(256);
        let a = WebSocketStream::from_raw_socket(a, WsRole::Server, None).await;
        let _stalled_peer = WebSocketStream::from_raw_socket(b, WsRole::Client, None).await;
        let socket = Arc::new(WsSocket::new(a, RequestInfo::default()));

        let writer = Arc::clone(&socket);
        let handle = tokio::spawn(async move {
            let frame = "x".repeat(64 * 1024);
            writer.write_text(&frame, None).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        socket.close();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("write still blocked after close")
            .unwrap();
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_remote_close_ends_read() {
        let (server, client) = socket_pair().await;
        client.close();

        let result = server.read_text(Some(Duration::from_secs(5))).await;
        assert!(result.is_err());
    }
}
