//! Broadcast of [`ServerEvent`]s.
//!
//! Sending never blocks and never fails the server: with no subscribers
//! the event is simply dropped.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::trace;

// ============================================================================
// Constants
// ============================================================================

/// Events buffered per subscriber before the slowest one starts lagging.
const CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// ServerEvent
// ============================================================================

/// A state change worth showing to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Listener is up.
    Started {
        /// Server address the phone should open.
        url: String,
        /// URL carrying the bearer token, meant for the QR code.
        pairing_url: String,
        /// Code the operator reads out to the phone.
        pair_code: String,
    },

    /// A realtime client connected.
    ClientConnected {
        /// Client socket address.
        addr: SocketAddr,
    },

    /// A realtime client went away.
    ClientDisconnected {
        /// Client socket address.
        addr: SocketAddr,
    },

    /// A device claimed the pairing slot.
    DevicePaired {
        /// Device identifier.
        device_id: String,
        /// Pairing expiry.
        expires_at: DateTime<Utc>,
    },

    /// Settings were changed through the API.
    SettingsChanged,
}

// ============================================================================
// EventBus
// ============================================================================

/// Fan-out of [`ServerEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribes to events sent from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Publishes `event` to every subscriber.
    pub fn publish(&self, event: ServerEvent) {
        if self.sender.send(event).is_err() {
            trace!("No event subscribers");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
