//! Server runtime options.
//!
//! # Example
//!
//! ```ignore
//! use ginkgo_talk::ServerOptions;
//!
//! let options = ServerOptions::new()
//!     .with_port(9600)
//!     .with_data_dir("/var/lib/ginkgo-talk")
//!     .with_lan_override("192.168.1.20");
//!
//! options.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::net::resolver::parse_override;

use super::files::default_data_dir;
use super::settings::SETTINGS_FILE;

// ============================================================================
// Constants
// ============================================================================

/// Default listening port.
pub const DEFAULT_PORT: u16 = 9527;

// ============================================================================
// ServerOptions
// ============================================================================

/// Where and how the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Listening port.
    pub port: u16,

    /// Bind address.
    pub bind: IpAddr,

    /// Directory holding identity and settings files.
    pub data_dir: PathBuf,

    /// Operator LAN override; wins over the settings file.
    pub lan_override: Option<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ServerOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            data_dir: default_data_dir(),
            lan_override: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ServerOptions {
    /// Sets the listening port. `0` picks a free port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn with_bind(mut self, bind: IpAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Sets the data directory.
    #[inline]
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Sets the LAN override.
    #[inline]
    #[must_use]
    pub fn with_lan_override(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        self.lan_override = (!value.trim().is_empty()).then_some(value);
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ServerOptions {
    /// Socket address to bind.
    #[inline]
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Settings file location.
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    /// Data directory.
    #[inline]
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Parsed LAN override. `None` when unset or `"auto"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLanAddress`](crate::Error::InvalidLanAddress)
    /// if the override is not an IPv4 address.
    pub fn lan_override_addr(&self) -> Result<Option<Ipv4Addr>> {
        match &self.lan_override {
            Some(value) => parse_override(value),
            None => Ok(None),
        }
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLanAddress`](crate::Error::InvalidLanAddress)
    /// for a malformed LAN override.
    pub fn validate(&self) -> Result<()> {
        self.lan_override_addr().map(|_| ())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;

    #[test]
    fn test_new_creates_default() {
        let options = ServerOptions::new();
        assert_eq!(options.port, DEFAULT_PORT);
        assert_eq!(options.bind, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert!(options.lan_override.is_none());
        assert_eq!(options.listen_addr().to_string(), "0.0.0.0:9527");
    }

    #[test]
    fn test_builder_chain() {
        let options = ServerOptions::new()
            .with_port(0)
            .with_bind(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_data_dir("/tmp/gtalk")
            .with_lan_override("10.0.0.7");

        assert_eq!(options.listen_addr().to_string(), "127.0.0.1:0");
        assert_eq!(options.settings_path(), PathBuf::from("/tmp/gtalk").join(SETTINGS_FILE));
        assert_eq!(
            options.lan_override_addr().expect("valid"),
            Some(Ipv4Addr::new(10, 0, 0, 7))
        );
    }

    #[test]
    fn test_blank_override_is_unset() {
        let options = ServerOptions::new().with_lan_override("  ");
        assert!(options.lan_override.is_none());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_auto_override_is_none() {
        let options = ServerOptions::new().with_lan_override("auto");
        assert_eq!(options.lan_override_addr().expect("auto"), None);
    }

    #[test]
    fn test_validate_invalid_override() {
        let options = ServerOptions::new().with_lan_override("not-an-ip");
        assert!(matches!(
            options.validate(),
            Err(Error::InvalidLanAddress { .. })
        ));
    }
}
