//! Read loop and dispatcher.
//!
//! The only reader of the socket. Each frame is routed by precedence:
//!
//! 1. handshake frame (while unacknowledged) → handshake policy
//! 2. reply whose wait token has a waiter → that waiter
//! 3. namespace connect/disconnect, room join/leave → session directory
//! 4. anything else → the namespace's event handler, dropped if not connected
//!
//! Frames decoded before acknowledgement are held back and replayed in
//! arrival order the moment acknowledgement completes.

// ============================================================================
// Imports
// ============================================================================

use tracing::{debug, trace, warn};

use crate::protocol::{Message, events};

use super::Conn;
use super::handshake::{HandshakeAction, HandshakePolicy, is_handshake_frame};

// ============================================================================
// Entry Point
// ============================================================================

/// Runs until the socket fails or a handler demands a close, then closes.
pub(super) async fn run(conn: Conn, policy: Box<dyn HandshakePolicy>) {
    if conn.is_closed() {
        return;
    }

    let reader = ReadLoop {
        conn,
        policy,
        backlog: Some(Vec::new()),
    };
    reader.run().await;
}

// ============================================================================
// ReadLoop
// ============================================================================

struct ReadLoop {
    conn: Conn,
    policy: Box<dyn HandshakePolicy>,
    /// Frames held back until acknowledgement; `None` once replayed.
    backlog: Option<Vec<Message>>,
}

impl ReadLoop {
    async fn run(mut self) {
        if let Some(frame) = self.policy.initiate()
            && let Err(e) = self.conn.write_frame(&frame).await
        {
            warn!(error = %e, "Failed to open handshake");
            self.conn.close();
            return;
        }

        let read_timeout = self.conn.options().read_timeout;

        loop {
            let frame = match self.conn.socket().read_text(read_timeout).await {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(conn_id = %self.conn.id(), error = %e, "Read loop stopped");
                    break;
                }
            };

            if !self.conn.is_acknowledged() && is_handshake_frame(&frame) {
                if !self.on_handshake(&frame).await {
                    break;
                }
                continue;
            }

            let msg = match self.conn.codec().decode(&frame) {
                Ok(msg) => msg,
                Err(e) => {
                    trace!(error = %e, "Dropping undecodable frame");
                    continue;
                }
            };

            if !self.conn.is_acknowledged()
                && let Some(backlog) = self.backlog.as_mut()
            {
                backlog.push(msg);
                continue;
            }

            if !self.dispatch(msg).await {
                break;
            }
        }

        self.conn.close();
    }

    /// Executes the policy's actions. Returns `false` to stop the loop.
    async fn on_handshake(&mut self, frame: &str) -> bool {
        let mut acknowledged = false;

        for action in self.policy.on_frame(frame, &self.conn.id()) {
            match action {
                HandshakeAction::Reply(reply) => {
                    if let Err(e) = self.conn.write_frame(&reply).await {
                        warn!(error = %e, "Failed to send handshake frame");
                    }
                }
                HandshakeAction::AdoptId(id) => self.conn.set_id(id),
                HandshakeAction::Acknowledge => {
                    self.conn.set_acknowledged();
                    acknowledged = true;
                }
            }
        }

        if acknowledged {
            return self.replay_backlog().await;
        }
        true
    }

    async fn replay_backlog(&mut self) -> bool {
        let Some(backlog) = self.backlog.take() else {
            return true;
        };

        if !backlog.is_empty() {
            debug!(conn_id = %self.conn.id(), count = backlog.len(), "Replaying buffered messages");
        }

        for msg in backlog {
            if !self.dispatch(msg).await {
                return false;
            }
        }
        true
    }

    /// Routes one message. Returns `false` if the connection must close.
    async fn dispatch(&self, mut msg: Message) -> bool {
        if let Some(token) = msg.wait_token().cloned() {
            match self.conn.waiting().try_deliver(&token, msg) {
                Some(unclaimed) => msg = unclaimed,
                None => return true,
            }
        }

        let conn = &self.conn;
        let directory = conn.directory();

        match msg.event.as_str() {
            events::ON_NAMESPACE_CONNECT => directory.reply_connect(conn, msg).await,
            events::ON_NAMESPACE_DISCONNECT => directory.reply_disconnect(conn, msg).await,
            events::ON_ROOM_JOIN => match directory.namespace(&msg.namespace) {
                Some(ns) => ns.reply_room_join(conn, msg).await,
                None => trace!(namespace = %msg.namespace, "Room join for unknown namespace"),
            },
            events::ON_ROOM_LEAVE => match directory.namespace(&msg.namespace) {
                Some(ns) => ns.reply_room_leave(conn, msg).await,
                None => trace!(namespace = %msg.namespace, "Room leave for unknown namespace"),
            },
            _ => {
                msg.is_local = false;

                let Some(ns) = directory.namespace(&msg.namespace) else {
                    trace!(namespace = %msg.namespace, event = %msg.event, "Dropping message for unknown namespace");
                    return true;
                };

                if let Err(err) = ns.fire_event(conn, msg.clone()).await {
                    let manual_close = err.is_manual_close();
                    msg.err = Some(err.to_string());

                    if !conn.write(msg).await {
                        debug!(conn_id = %conn.id(), error = %err, "Could not relay handler error");
                    }
                    if manual_close {
                        debug!(conn_id = %conn.id(), reason = %err, "Handler closed the connection");
                        return false;
                    }
                }
            }
        }

        true
    }
}

// ============================================================================
// Tests
// ============================================================================
