//! Shared server state.
//!
//! Each component keeps its own lock; nothing here is held across an
//! external call.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::SettingsStore;
use crate::events::EventBus;
use crate::net::AddressResolver;
use crate::protocol::ProtocolDispatcher;
use crate::services::{InputInjector, TextTransform};
use crate::session::{Session, SessionAuthority, format_timestamp};

use super::hub::ConnectionHub;

// ============================================================================
// ServerState
// ============================================================================

/// Components the HTTP and realtime handlers work against.
#[derive(Clone)]
pub struct ServerState {
    /// Port the listener is bound to.
    pub port: u16,
    /// Process start.
    pub started_at: DateTime<Utc>,
    /// LAN address resolution and override.
    pub resolver: Arc<AddressResolver>,
    /// Token and pairing checks.
    pub authority: Arc<SessionAuthority>,
    /// Realtime connection slot.
    pub hub: Arc<ConnectionHub>,
    /// Persisted settings.
    pub settings: Arc<SettingsStore>,
    /// AI transform, for availability reporting.
    pub transform: Arc<dyn TextTransform>,
    /// Realtime message dispatch.
    pub dispatcher: Arc<ProtocolDispatcher>,
    /// Lifecycle notifications.
    pub events: EventBus,
}

impl fmt::Debug for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerState")
            .field("port", &self.port)
            .field("started_at", &self.started_at)
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// Assembles the state for a fresh process.
    ///
    /// Generates the session secrets and starts with an empty hub. The
    /// port is replaced by the bound one in [`Server::bind`](super::Server::bind).
    #[must_use]
    pub fn new(
        port: u16,
        resolver: AddressResolver,
        settings: Arc<SettingsStore>,
        transform: Arc<dyn TextTransform>,
        injector: Arc<dyn InputInjector>,
    ) -> Self {
        Self::with_session(port, resolver, settings, transform, injector, Session::generate())
    }

    /// [`new`](Self::new) with explicit session secrets.
    #[must_use]
    pub fn with_session(
        port: u16,
        resolver: AddressResolver,
        settings: Arc<SettingsStore>,
        transform: Arc<dyn TextTransform>,
        injector: Arc<dyn InputInjector>,
        session: Session,
    ) -> Self {
        Self {
            port,
            started_at: Utc::now(),
            resolver: Arc::new(resolver),
            authority: Arc::new(SessionAuthority::new(session)),
            hub: Arc::new(ConnectionHub::new()),
            settings,
            dispatcher: Arc::new(ProtocolDispatcher::new(transform.clone(), injector)),
            transform,
            events: EventBus::new(),
        }
    }

    /// Address the phone should open: `https://<lan>:<port>`.
    #[must_use]
    pub fn server_url(&self) -> String {
        format!("https://{}:{}", self.resolver.resolve(), self.port)
    }

    /// Server URL carrying the bearer token, for the QR code.
    #[must_use]
    pub fn pairing_url(&self) -> String {
        format!("{}/?token={}", self.server_url(), self.authority.token())
    }

    /// Start time as RFC 3339.
    #[must_use]
    pub fn started_at_rfc3339(&self) -> String {
        format_timestamp(self.started_at)
    }

    /// Current LAN override as a string, empty when auto-detecting.
    #[must_use]
    pub fn lan_override(&self) -> String {
        self.resolver
            .override_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::Ipv4Addr;

    use async_trait::async_trait;

    use crate::config::Settings;
    use crate::error::{Error, Result};
    use crate::protocol::Mode;
    use crate::services::InputEvent;

    struct Noop;

    impl InputInjector for Noop {
        fn inject(&self, _event: &InputEvent) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl TextTransform for Noop {
        fn is_available(&self) -> bool {
            false
        }

        async fn transform(&self, _text: &str, _mode: Mode) -> Result<String> {
            Err(Error::TransformUnavailable)
        }
    }

    fn state() -> ServerState {
        ServerState::with_session(
            9527,
            AddressResolver::system().with_override(Some(Ipv4Addr::new(192, 168, 0, 8))),
            Arc::new(SettingsStore::from_parts(
                std::env::temp_dir().join("ginkgo-talk-state.json"),
                Settings::default(),
            )),
            Arc::new(Noop),
            Arc::new(Noop),
            Session::with_secrets("abc123", "0001"),
        )
    }

    #[test]
    fn test_urls_follow_lan_override() {
        let state = state();

        assert_eq!(state.server_url(), "https://192.168.0.8:9527");
        assert_eq!(state.pairing_url(), "https://192.168.0.8:9527/?token=abc123");
        assert_eq!(state.lan_override(), "192.168.0.8");

        state.resolver.set_override(Some(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(state.server_url(), "https://10.0.0.2:9527");
    }

    #[test]
    fn test_started_at_is_rfc3339() {
        let started = state().started_at_rfc3339();
        assert!(started.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&started).is_ok());
    }
}
