//! In-memory session directory and connection helpers for unit tests.
//!
//! Event names with canned behaviour in [`StubNamespace::fire_event`]:
//! `fail` returns an ordinary error, `quit` a manual-close error, `echo`
//! replies with the request body.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::conn::{CallContext, Conn, Role};
use crate::error::{Error, Result};
use crate::identifiers::ConnId;
use crate::protocol::{Message, events};
use crate::session::{NamespaceSession, SessionDirectory};
use crate::transport::MemorySocket;

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builds an unstarted connection over one end of a memory pair.
///
/// Server connections get id `7`.
pub(crate) fn conn_over(
    role: Role,
    directory: impl Into<Arc<StubDirectory>>,
) -> (Conn, MemorySocket) {
    let directory: Arc<StubDirectory> = directory.into();
    let (socket, peer) = MemorySocket::pair();

    let mut builder = Conn::builder(Arc::new(socket), directory).role(role);
    if role == Role::Server {
        builder = builder.id(ConnId::new("7"));
    }

    (builder.build().expect("valid test connection"), peer)
}

// ============================================================================
// StubNamespace
// ============================================================================

pub(crate) struct StubNamespace {
    name: String,
    rooms: RwLock<FxHashSet<String>>,
    fired: Mutex<Vec<Message>>,
}

impl StubNamespace {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            rooms: RwLock::new(FxHashSet::default()),
            fired: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl NamespaceSession for StubNamespace {
    fn namespace(&self) -> &str {
        &self.name
    }

    fn is_joined(&self, room: &str) -> bool {
        self.rooms.read().contains(room)
    }

    async fn reply_room_join(&self, conn: &Conn, msg: Message) {
        self.rooms.write().insert(msg.room.clone());
        if msg.wait_token().is_some() {
            conn.write(msg).await;
        }
    }

    async fn reply_room_leave(&self, conn: &Conn, msg: Message) {
        self.rooms.write().remove(&msg.room);
        if msg.wait_token().is_some() {
            conn.write(msg).await;
        }
    }

    async fn fire_event(&self, conn: &Conn, msg: Message) -> Result<()> {
        self.fired.lock().push(msg.clone());

        match msg.event.as_str() {
            "fail" => Err(Error::protocol("handler failed")),
            "quit" => Err(Error::manual_close("bye")),
            "echo" => {
                let mut reply = Message::new(&self.name, "echo", msg.body);
                reply.wait = msg.wait;
                conn.write(reply).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// StubDirectory
// ============================================================================

#[derive(Default)]
pub(crate) struct StubDirectory {
    namespaces: RwLock<FxHashMap<String, Arc<StubNamespace>>>,
    forced: AtomicUsize,
}

impl StubDirectory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_namespace(self, name: &str, rooms: &[&str]) -> Self {
        let ns = self.add_namespace(name);
        ns.rooms
            .write()
            .extend(rooms.iter().map(|room| (*room).to_owned()));
        self
    }

    fn add_namespace(&self, name: &str) -> Arc<StubNamespace> {
        Arc::clone(
            self.namespaces
                .write()
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(StubNamespace::new(name))),
        )
    }

    pub(crate) fn fired(&self, namespace: &str) -> Vec<Message> {
        self.namespaces
            .read()
            .get(namespace)
            .map(|ns| ns.fired.lock().clone())
            .unwrap_or_default()
    }

    pub(crate) fn is_joined(&self, namespace: &str, room: &str) -> bool {
        self.namespaces
            .read()
            .get(namespace)
            .is_some_and(|ns| ns.is_joined(room))
    }

    pub(crate) fn forced_disconnects(&self) -> usize {
        self.forced.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionDirectory for StubDirectory {
    fn namespace(&self, name: &str) -> Option<Arc<dyn NamespaceSession>> {
        self.namespaces
            .read()
            .get(name)
            .map(|ns| Arc::clone(ns) as Arc<dyn NamespaceSession>)
    }

    async fn reply_connect(&self, conn: &Conn, msg: Message) {
        self.add_namespace(&msg.namespace);
        conn.write(msg).await;
    }

    async fn reply_disconnect(&self, conn: &Conn, msg: Message) {
        self.namespaces.write().remove(&msg.namespace);
        conn.write(msg).await;
    }

    async fn ask_connect(
        &self,
        ctx: &CallContext,
        conn: &Conn,
        namespace: &str,
    ) -> Result<Arc<dyn NamespaceSession>> {
        let request = Message::new(namespace, events::ON_NAMESPACE_CONNECT, Vec::new());
        conn.ask(ctx, request).await?;
        Ok(self.add_namespace(namespace))
    }

    async fn ask_disconnect(&self, ctx: &CallContext, conn: &Conn, namespace: &str) -> Result<()> {
        if !self.namespaces.read().contains_key(namespace) {
            return Err(Error::bad_namespace(namespace));
        }

        let request = Message::new(namespace, events::ON_NAMESPACE_DISCONNECT, Vec::new());
        conn.ask(ctx, request).await?;
        self.namespaces.write().remove(namespace);
        Ok(())
    }

    async fn disconnect_all(&self, ctx: &CallContext, conn: &Conn) -> Result<()> {
        let names: Vec<String> = self.namespaces.read().keys().cloned().collect();
        for name in names {
            self.ask_disconnect(ctx, conn, &name).await?;
        }
        Ok(())
    }

    fn force_disconnect_all(&self) {
        self.forced.fetch_add(1, Ordering::SeqCst);
        self.namespaces.write().clear();
    }
}
