//! TLS transport layer.
//!
//! This module serves the phone: the JSON API and the single realtime
//! WebSocket connection, both over one HTTPS listener.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Phone browser  │        HTTPS / WSS           │  Host (Rust)    │
//! │                 │◄────────────────────────────►│                 │
//! │  /api/*  fetch  │       <lan>:9527             │  Server         │
//! │  /ws   socket   │                              │  → Connection   │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Server::bind` - Bind the listener with the host TLS identity
//! 2. Phone pairs through `POST /api/pair`
//! 3. `GET /ws` - Token and pairing checked, then upgraded
//! 4. `ConnectionHub::accept` - New connection supersedes any previous one
//! 5. `Connection::run` - Messages dispatched in arrival order until close
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Realtime message loop |
//! | `http` | JSON API handlers |
//! | `hub` | At-most-one connection ownership |
//! | `server` | TLS listener and routing |
//! | `state` | Components shared by handlers |

// ============================================================================
// Submodules
// ============================================================================

/// Realtime message loop.
pub mod connection;

/// JSON API handlers.
pub mod http;

/// Connection slot.
pub mod hub;

/// TLS listener and routing.
pub mod server;

/// Shared handler state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{CloseReason, Connection};
pub use http::Credentials;
pub use hub::{CloseSignal, ConnectionHub, ConnectionTicket};
pub use server::Server;
pub use state::ServerState;
