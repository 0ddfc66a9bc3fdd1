//! Message encoding and decoding.
//!
//! The connection only ever sees text frames. A [`Codec`] turns a
//! [`Message`] into a frame and back; the default [`JsonCodec`] uses
//! `serde_json`.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{from_str, to_string};

use crate::error::{Error, Result};

use super::Message;

// ============================================================================
// Codec
// ============================================================================

/// Converts messages to and from text frames.
pub trait Codec: Send + Sync {
    /// Encodes a message into a frame.
    fn encode(&self, msg: &Message) -> Result<String>;

    /// Decodes a frame into a message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] or [`Error::Json`] for frames that are not
    /// messages. The read loop drops such frames.
    fn decode(&self, frame: &str) -> Result<Message>;
}

// ============================================================================
// JsonCodec
// ============================================================================

/// JSON codec, the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, msg: &Message) -> Result<String> {
        Ok(to_string(msg)?)
    }

    fn decode(&self, frame: &str) -> Result<Message> {
        let msg: Message = from_str(frame)?;
        if msg.event.is_empty() {
            return Err(Error::codec("message without event"));
        }
        Ok(msg)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::WaitToken;

    #[test]
    fn test_reply_with_error_survives_wire() {
        let mut msg = Message::new("/chat", "ask", b"q".to_vec());
        msg.wait = Some(WaitToken::from_wire("client_1"));
        msg.err = Some("denied".into());

        let decoded = JsonCodec.decode(&JsonCodec.encode(&msg).unwrap()).unwrap();

        assert_eq!(decoded.wait, msg.wait);
        assert_eq!(decoded.err.as_deref(), Some("denied"));
        assert_eq!(decoded.body, b"q");
        assert!(!decoded.is_local);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(JsonCodec.decode("not json").is_err());
        assert!(JsonCodec.decode("ack_ok").is_err());
        assert!(matches!(
            JsonCodec.decode(r#"{"ns":"/chat","event":""}"#),
            Err(Error::Codec { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_body() {
        let frame = r#"{"ns":"/chat","event":"chat","body":"%%%"}"#;
        assert!(JsonCodec.decode(frame).is_err());
    }
}
