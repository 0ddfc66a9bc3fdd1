//! Client-side dialing.
//!
//! Opens a WebSocket to a server, wraps it in a [`WsSocket`], and starts a
//! client-role [`Conn`] whose read loop begins the handshake.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{debug, info};

use crate::conn::{Conn, ConnOptions, Role};
use crate::error::{Error, Result};
use crate::session::SessionDirectory;

use super::socket::RequestInfo;
use super::websocket::WsSocket;

// ============================================================================
// Dial
// ============================================================================

/// Connects to `url` and starts a client connection.
///
/// The returned connection has no id until the server's handshake reply
/// arrives; use [`Conn::wait_connect`] or poll
/// [`Conn::is_acknowledged`] before relying on it.
///
/// # Errors
///
/// - [`Error::Config`] if `options` is invalid
/// - [`Error::Connection`] if the WebSocket upgrade fails
pub async fn dial(
    url: &str,
    directory: Arc<dyn SessionDirectory>,
    options: ConnOptions,
) -> Result<Conn> {
    options.validate()?;

    debug!(url, "Dialing");

    let (ws_stream, response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| Error::connection(format!("Failed to connect to {url}: {e}")))?;

    let request = RequestInfo {
        remote_addr: None,
        path: url.to_owned(),
        headers: response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    value.to_str().unwrap_or_default().to_owned(),
                )
            })
            .collect(),
    };

    let conn = Conn::builder(Arc::new(WsSocket::new(ws_stream, request)), directory)
        .role(Role::Client)
        .options(options)
        .build()?;
    conn.start()?;

    info!(url, "Dialed");
    Ok(conn)
}

// ============================================================================
// Tests
// ============================================================================
