//! Registry of live WebSocket sessions, keyed by channel id

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use super::GatewayError;

/// Per-session outbound buffer
pub const OUTBOUND_BUFFER: usize = 64;

/// Work item for a session's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Pre-encoded JSON text frame
    Frame(Arc<str>),
    /// Close the socket with a reason
    Close(String),
}

struct SessionEntry {
    account_id: Uuid,
    tx: mpsc::Sender<Outbound>,
}

/// All connected sessions
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register a channel and hand back the receiving end for its writer
    pub fn register(&self, channel_id: Uuid, account_id: Uuid) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        self.sessions.insert(channel_id, SessionEntry { account_id, tx });
        rx
    }

    pub fn unregister(&self, channel_id: &Uuid) {
        self.sessions.remove(channel_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn account_of(&self, channel_id: &Uuid) -> Option<Uuid> {
        self.sessions.get(channel_id).map(|s| s.account_id)
    }

    /// Queue without waiting; a full buffer drops the item
    pub fn deliver(&self, channel_id: Uuid, item: Outbound) -> Result<(), GatewayError> {
        let session = self
            .sessions
            .get(&channel_id)
            .ok_or(GatewayError::UnknownChannel(channel_id))?;

        session.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => GatewayError::Backpressure(channel_id),
            TrySendError::Closed(_) => GatewayError::Closed(channel_id),
        })
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
