//! Ginkgo Talk - type on your computer from your phone.
//!
//! This library runs the host side of a LAN remote-input bridge: a phone
//! on the same network pairs with the host, sends dictated text over a
//! WebSocket, and the host types it into whatever application has focus,
//! optionally after an AI rewrite.
//!
//! # Architecture
//!
//! - **Phone (browser)**: Pairs with a short code, sends `text` / `command` messages
//! - **Host (Rust)**: Serves HTTPS + WSS, authorizes, dispatches, injects keystrokes
//!
//! Key design principles:
//!
//! - One bearer token and one pair code per process, both random
//! - At most one paired device and one realtime connection at a time
//! - Messages on a connection are handled strictly in arrival order
//! - AI processing never types on its own; the phone commits the preview
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ginkgo_talk::config::{ServerOptions, SettingsStore};
//! use ginkgo_talk::identity::IdentityManager;
//! use ginkgo_talk::net::AddressResolver;
//! use ginkgo_talk::services::{ChatTransform, CommandInjector};
//! use ginkgo_talk::transport::{Server, ServerState};
//!
//! #[tokio::main]
//! async fn main() -> ginkgo_talk::Result<()> {
//!     let options = ServerOptions::new();
//!     let settings = Arc::new(SettingsStore::load(options.data_dir()));
//!     let resolver = AddressResolver::system();
//!
//!     let identity = IdentityManager::new(options.data_dir()).obtain(&resolver.resolve())?;
//!     let transform = Arc::new(ChatTransform::new(settings.clone())?);
//!     let injector = Arc::new(CommandInjector::for_host());
//!
//!     let state = ServerState::new(options.port, resolver, settings, transform, injector);
//!     let server = Server::bind(options.listen_addr(), identity.server_config()?, state).await?;
//!
//!     println!("Open {}", server.state().pairing_url());
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Runtime options and persisted settings |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`events`] | Lifecycle notifications for presentation adapters |
//! | [`identity`] | Self-signed TLS identity |
//! | [`net`] | LAN address resolution |
//! | [`protocol`] | Realtime message types and dispatch |
//! | [`services`] | AI text transform and keystroke injection |
//! | [`session`] | Bearer token, pair code and pairing slot |
//! | [`transport`] | TLS server, JSON API, realtime connection |

// ============================================================================
// Modules
// ============================================================================

/// Runtime options and persisted settings.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Lifecycle notifications.
pub mod events;

/// Self-signed TLS identity.
pub mod identity;

/// LAN address resolution.
pub mod net;

/// Realtime protocol.
///
/// Inbound messages, outbound events and the dispatcher that turns one
/// into the other.
pub mod protocol;

/// External collaborators: AI transform and input injection.
pub mod services;

/// Session secrets and pairing.
pub mod session;

/// TLS transport layer.
///
/// HTTPS listener, JSON API handlers and the realtime connection loop.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration types
pub use config::{ServerOptions, Settings, SettingsStore};

// Error types
pub use error::{Error, Result};

// Event types
pub use events::{EventBus, ServerEvent};

// Protocol types
pub use protocol::{CommandKind, Message, Mode, OutboundEvent, ProtocolDispatcher};

// Service types
pub use services::{ChatTransform, CommandInjector, InputEvent, InputInjector, TextTransform};

// Session types
pub use session::{PairingState, Session, SessionAuthority};

// Transport types
pub use transport::{ConnectionHub, Server, ServerState};
