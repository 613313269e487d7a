//! Connection abstraction held by channel hubs.
//!
//! A hub only needs identity, a non-blocking `send` and a `close`; the transport
//! (WebSocket writer task, test sink...) lives behind the trait.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::error::SendError;
use crate::payload::Payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 8 premiers caractères suffisent pour les logs
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Must not block: hubs call this while holding their lock.
    fn send(&self, payload: &Payload) -> Result<(), SendError>;

    fn close(&self);
}

pub type ConnectionRef = Arc<dyn Connection>;

/// Connection backed by a bounded queue drained by a writer task.
pub struct ChannelConnection {
    id: ConnectionId,
    tx: Mutex<Option<mpsc::Sender<Payload>>>,
}

impl ChannelConnection {
    /// Returns the connection and the receiving end the writer task must drain.
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Arc::new(Self {
            id: ConnectionId::new(),
            tx: Mutex::new(Some(tx)),
        });
        (conn, rx)
    }

    pub fn is_closed(&self) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }
}

impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, payload: &Payload) -> Result<(), SendError> {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(SendError::Closed);
        };
        tx.try_send(payload.clone()).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    fn close(&self) {
        // drop du sender => le writer voit la fin du flux
        self.tx.lock().take();
    }
}

impl fmt::Debug for ChannelConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConnection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
