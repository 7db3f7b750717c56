use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

/// Counters of a single reflector connection.
///
/// Owned by the connection task; dropped when the connection ends.
#[derive(Debug)]
pub struct Session {
    id: u64,
    peer: SocketAddr,
    received: u64,
    reflected: u64,
}

impl Session {
    pub fn new(id: u64, peer: SocketAddr) -> Session {
        Session {
            id,
            peer,
            received: 0,
            reflected: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn record_received(&mut self) -> u64 {
        self.received += 1;
        self.received
    }

    pub fn record_reflected(&mut self) -> u64 {
        self.reflected += 1;
        self.reflected
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn reflected(&self) -> u64 {
        self.reflected
    }
}

/// Counts reflector connections.
///
/// Only aggregates are kept: a closed session leaves nothing behind besides
/// the `served` total.
#[derive(Default)]
pub struct SessionManager {
    next_id: AtomicU64,
    active: AtomicUsize,
    served: AtomicU64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly accepted connection.
    pub fn open(&self, peer: SocketAddr) -> Session {
        self.active.fetch_add(1, Ordering::Relaxed);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("Session {} opened for {}", id, peer);
        Session::new(id, peer)
    }

    /// Retires a finished connection.
    pub fn close(&self, session: Session) {
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        self.served.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "Session {} with {} closed, rx: {}, tx: {}",
            session.id(),
            session.peer(),
            session.received(),
            session.reflected()
        );
    }

    /// Connections currently open.
    pub fn session_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Connections that have been closed since start.
    pub fn sessions_served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }
}
