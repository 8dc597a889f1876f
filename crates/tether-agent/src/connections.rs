//! Server connection table.
//!
//! Owned, index-addressed collection of UDP peers. The stack stores the
//! returned handle opaquely; slots are reused after a close, so a handle is
//! only valid until its connection is closed.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Opaque handle addressing one connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnHandle(usize);

/// One known peer.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Peer address.
    pub peer: SocketAddr,
    /// When a datagram last arrived from this peer.
    pub last_seen: Instant,
}

/// Owned collection of connections addressed by handle.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    slots: Vec<Option<Connection>>,
}

impl ConnectionTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the connection for `peer`, creating it if unknown, and mark it
    /// live.
    pub fn touch(&mut self, peer: SocketAddr) -> ConnHandle {
        let now = Instant::now();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(connection) = slot
                && connection.peer == peer
            {
                connection.last_seen = now;
                return ConnHandle(index);
            }
        }

        let connection = Some(Connection { peer, last_seen: now });
        if let Some(index) = self.slots.iter().position(Option::is_none) {
            self.slots[index] = connection;
            ConnHandle(index)
        } else {
            self.slots.push(connection);
            ConnHandle(self.slots.len() - 1)
        }
    }

    /// The connection behind `handle`, if still open.
    #[must_use]
    pub fn get(&self, handle: ConnHandle) -> Option<&Connection> {
        self.slots.get(handle.0).and_then(Option::as_ref)
    }

    /// Close a connection, freeing its slot for reuse.
    pub fn close(&mut self, handle: ConnHandle) -> Option<Connection> {
        self.slots.get_mut(handle.0).and_then(Option::take)
    }

    /// Close every connection idle for `max_idle` or longer, returning how
    /// many were closed.
    pub fn prune_idle(&mut self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut closed = 0;
        for index in 0..self.slots.len() {
            let stale = self.slots[index]
                .as_ref()
                .is_some_and(|c| now.duration_since(c.last_seen) >= max_idle);
            if stale && self.close(ConnHandle(index)).is_some() {
                closed += 1;
            }
        }
        closed
    }

    /// Number of open connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether no connection is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
