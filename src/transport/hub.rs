//! Single realtime connection ownership.
//!
//! The hub holds zero or one connection. Accepting a new connection
//! signals the previous owner task to close before the new one takes the
//! slot, so a phone that reconnects after a drop simply replaces its stale
//! connection.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

// ============================================================================
// ConnectionTicket
// ============================================================================

/// Identity and metadata of one accepted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTicket {
    /// Unique per accept.
    pub id: Uuid,
    /// Client socket address.
    pub remote_addr: SocketAddr,
    /// When the connection was accepted.
    pub connected_at: DateTime<Utc>,
}

/// Resolves when the hub wants the owner task to close its connection.
pub type CloseSignal = oneshot::Receiver<()>;

// ============================================================================
// ConnectionHub
// ============================================================================

/// The held connection.
struct Held {
    ticket: ConnectionTicket,
    close_tx: oneshot::Sender<()>,
}

/// Owns the at-most-one realtime connection.
#[derive(Default)]
pub struct ConnectionHub {
    held: RwLock<Option<Held>>,
}

impl fmt::Debug for ConnectionHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHub")
            .field("current", &self.current())
            .finish()
    }
}

impl ConnectionHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the slot for a new connection from `remote_addr`.
    ///
    /// Any held connection is told to close first. The returned signal
    /// fires if this connection is superseded in turn.
    pub fn accept(&self, remote_addr: SocketAddr) -> (ConnectionTicket, CloseSignal) {
        let (close_tx, close_rx) = oneshot::channel();
        let ticket = ConnectionTicket {
            id: Uuid::new_v4(),
            remote_addr,
            connected_at: Utc::now(),
        };

        let previous = self.held.write().replace(Held {
            ticket: ticket.clone(),
            close_tx,
        });

        if let Some(previous) = previous {
            info!(
                previous = %previous.ticket.remote_addr,
                current = %remote_addr,
                "Superseding realtime connection"
            );
            // the old owner may already be gone
            let _ = previous.close_tx.send(());
        }

        debug!(id = %ticket.id, addr = %remote_addr, "Connection accepted");
        (ticket, close_rx)
    }

    /// Clears the slot if `ticket` still holds it.
    ///
    /// Returns `false` for a ticket that was already superseded.
    pub fn release(&self, ticket: &ConnectionTicket) -> bool {
        let mut held = self.held.write();
        if held.as_ref().is_some_and(|h| h.ticket.id == ticket.id) {
            *held = None;
            debug!(id = %ticket.id, "Connection released");
            true
        } else {
            debug!(id = %ticket.id, "Stale release ignored");
            false
        }
    }

    /// The currently held connection, if any.
    #[must_use]
    pub fn current(&self) -> Option<ConnectionTicket> {
        self.held.read().as_ref().map(|h| h.ticket.clone())
    }

    /// Returns `true` if a connection is held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.held.read().is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================
