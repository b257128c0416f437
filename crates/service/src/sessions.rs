//! Local socket table
//!
//! Maps connection ids to live session actors. Strictly process-local and
//! exclusively owned by the session server; the shared registry may span
//! several relay processes, but delivery always goes through a socket in
//! this table.

use actix::{Message, Recipient};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::protocol::Role;

/// A serialized frame pushed to a session's socket.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct Outbound(pub String);

/// Tells a session the server is shutting down; the session sends the
/// shutdown frame and closes its socket.
#[derive(Debug, Clone, Copy, Message)]
#[rtype(result = "()")]
pub struct ShutdownNotice;

/// Live session entry: where to push frames, plus the last-known role.
#[derive(Clone)]
pub struct SessionHandle {
    pub sender: Recipient<Outbound>,
    pub control: Recipient<ShutdownNotice>,
    pub role: Role,
}

/// Registry of live sockets plus local delivery counters.
pub struct SessionTable {
    sessions: DashMap<String, SessionHandle>,
    messages_relayed: RwLock<u64>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            messages_relayed: RwLock::new(0),
        }
    }

    pub fn insert(
        &self,
        id: String,
        sender: Recipient<Outbound>,
        control: Recipient<ShutdownNotice>,
        role: Role,
    ) {
        self.sessions.insert(
            id,
            SessionHandle {
                sender,
                control,
                role,
            },
        );
    }

    pub fn remove(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, handle)| handle)
    }

    /// Update the last-known role for a live session. Returns false when
    /// the session is no longer present.
    pub fn set_role(&self, id: &str, role: Role) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut handle) => {
                handle.role = role;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|h| h.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn count_by_role(&self, role: Role) -> usize {
        self.sessions.iter().filter(|h| h.role == role).count()
    }

    /// Control recipients of every live session, for the shutdown notice.
    pub fn controls(&self) -> Vec<Recipient<ShutdownNotice>> {
        self.sessions.iter().map(|h| h.control.clone()).collect()
    }

    pub fn record_relayed(&self, count: u64) {
        *self.messages_relayed.write() += count;
    }

    pub fn messages_relayed(&self) -> u64 {
        *self.messages_relayed.read()
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}
