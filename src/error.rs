//! Error types for roomwire.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use roomwire::{CallContext, Message, Result};
//!
//! async fn example(conn: &Conn) -> Result<()> {
//!     let ctx = CallContext::with_timeout(Duration::from_secs(5));
//!     let reply = conn.ask(&ctx, Message::new("/chat", "ping", b"hi".to_vec())).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::Write`] |
//! | Transport | [`Error::ReadTimeout`], [`Error::WriteTimeout`] |
//! | Protocol | [`Error::Protocol`], [`Error::Codec`], [`Error::BadNamespace`] |
//! | Request | [`Error::DeadlineExceeded`], [`Error::Cancelled`], [`Error::Remote`] |
//! | Application | [`Error::ManualClose`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Base64`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::{Error as IoError, ErrorKind};
use std::result::Result as StdResult;

use base64::DecodeError;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when connection or server options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection could not be established or was rejected.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Transport closed underneath an operation.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Outbound message was not written.
    ///
    /// Returned by `ask` when the connection is closed or the write gate
    /// rejected the message.
    #[error("write closed")]
    Write,

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Frame read exceeded the configured read timeout.
    #[error("Read timed out after {timeout_ms}ms")]
    ReadTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Frame write exceeded the configured write timeout.
    #[error("Write timed out after {timeout_ms}ms")]
    WriteTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected frame.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Frame could not be decoded into a message.
    #[error("Codec error: {message}")]
    Codec {
        /// Description of the decode failure.
        message: String,
    },

    /// Namespace is not known or not connected.
    #[error("Bad namespace: {namespace}")]
    BadNamespace {
        /// The namespace that was requested.
        namespace: String,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// Caller deadline passed before a reply arrived.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// Caller cancelled the wait.
    #[error("context canceled")]
    Cancelled,

    /// Peer replied with an error.
    #[error("{message}")]
    Remote {
        /// Error text carried by the reply.
        message: String,
    },

    // ========================================================================
    // Application Errors
    // ========================================================================
    /// Handler requested the connection be closed.
    ///
    /// The dispatcher relays it to the peer, then terminates the connection.
    #[error("{reason}")]
    ManualClose {
        /// Reason relayed to the peer.
        reason: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Base64 body decode error.
    #[error("Base64 error: {0}")]
    Base64(#[from] DecodeError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a read timeout error.
    #[inline]
    pub fn read_timeout(timeout_ms: u64) -> Self {
        Self::ReadTimeout { timeout_ms }
    }

    /// Creates a write timeout error.
    #[inline]
    pub fn write_timeout(timeout_ms: u64) -> Self {
        Self::WriteTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    #[inline]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a bad namespace error.
    #[inline]
    pub fn bad_namespace(namespace: impl Into<String>) -> Self {
        Self::BadNamespace {
            namespace: namespace.into(),
        }
    }

    /// Creates an error carried by a peer reply.
    #[inline]
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Creates a manual-close error.
    #[inline]
    pub fn manual_close(reason: impl Into<String>) -> Self {
        Self::ManualClose {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the error means the transport is gone.
    ///
    /// Write failures of this class tear the connection down.
    #[must_use]
    pub fn is_close_error(&self) -> bool {
        match self {
            Self::ConnectionClosed | Self::ManualClose { .. } => true,
            Self::WebSocket(WsError::ConnectionClosed | WsError::AlreadyClosed) => true,
            Self::WebSocket(WsError::Io(err)) | Self::Io(err) => is_closed_io(err.kind()),
            _ => false,
        }
    }

    /// Returns `true` if a handler asked for the connection to be closed.
    #[inline]
    #[must_use]
    pub fn is_manual_close(&self) -> bool {
        matches!(self, Self::ManualClose { .. })
    }

    /// Returns `true` if the caller's context ended the wait.
    #[inline]
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::DeadlineExceeded | Self::Cancelled)
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::DeadlineExceeded | Self::ReadTimeout { .. } | Self::WriteTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::Write | Self::WebSocket(_)
        )
    }
}

fn is_closed_io(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
        assert_eq!(Error::Write.to_string(), "write closed");
    }

    #[test]
    fn test_remote_and_manual_close_display_verbatim() {
        assert_eq!(Error::remote("not allowed").to_string(), "not allowed");
        assert_eq!(Error::manual_close("bye").to_string(), "bye");
    }

    #[test]
    fn test_is_close_error() {
        assert!(Error::ConnectionClosed.is_close_error());
        assert!(Error::WebSocket(WsError::AlreadyClosed).is_close_error());
        assert!(Error::Io(IoError::new(ErrorKind::BrokenPipe, "pipe")).is_close_error());
        assert!(!Error::write_timeout(10).is_close_error());
        assert!(!Error::Io(IoError::new(ErrorKind::Other, "other")).is_close_error());
    }

    #[test]
    fn test_is_manual_close() {
        assert!(Error::manual_close("x").is_manual_close());
        assert!(!Error::remote("x").is_manual_close());
    }

    #[test]
    fn test_is_cancellation() {
        assert!(Error::DeadlineExceeded.is_cancellation());
        assert!(Error::Cancelled.is_cancellation());
        assert!(!Error::remote("deadline").is_cancellation());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::Write.is_connection_error());
        assert!(!Error::config("x").is_connection_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
