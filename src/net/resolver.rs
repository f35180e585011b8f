//! Best-effort LAN address resolution.
//!
//! Host network interfaces come from `netdev` with their link flags;
//! interfaces that are down, loopback or not multicast-capable are skipped.
//! The rest are classified by name: virtual, VPN and
//! container adapters are pushed to the back, physical Wi-Fi and Ethernet
//! adapters to the front. The lowest priority value wins; ties keep the
//! first address seen.
//!
//! An operator override always takes precedence over detection.
//!
//! # Example
//!
//! ```ignore
//! use ginkgo_talk::net::AddressResolver;
//!
//! let resolver = AddressResolver::system();
//! println!("phone should connect to {}", resolver.resolve());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Returned when no usable IPv4 candidate exists.
pub const LOCALHOST: &str = "localhost";

/// Priority for physical Wi-Fi / Ethernet adapters.
const PRIORITY_PHYSICAL: u8 = 10;

/// Priority for adapters that match no pattern.
const PRIORITY_UNKNOWN: u8 = 50;

/// Priority for virtual, VPN and container adapters.
const PRIORITY_VIRTUAL: u8 = 90;

/// Name fragments of virtual / VPN / container adapters.
const VIRTUAL_PATTERNS: &[&str] = &[
    "vmware",
    "vmnet",
    "virtualbox",
    "vbox",
    "hyper-v",
    "vethernet",
    "docker",
    "veth",
    "br-",
    "vpn",
    "starvpn",
    "tap",
    "tun",
    "wireguard",
    "wg",
    "蓝牙",
    "bluetooth",
    "loopback",
    "nodebabylink",
];

/// Name fragments of physical adapters.
const PHYSICAL_PATTERNS: &[&str] = &[
    "wlan", "wi-fi", "wifi", "无线", "以太网", "ethernet", "eth", "en0", "en1",
];

/// Value accepted in place of an address to clear the override.
const AUTO: &str = "auto";

// ============================================================================
// NetInterface
// ============================================================================

/// One address on one host network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetInterface {
    /// Interface name as reported by the OS.
    pub name: String,
    /// Address bound to the interface.
    pub addr: IpAddr,
    /// Interface is administratively up.
    pub is_up: bool,
    /// Interface is a loopback device.
    pub is_loopback: bool,
    /// Interface supports multicast.
    pub is_multicast: bool,
}

/// Link flags of one interface, shared by all of its addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkFlags {
    /// `IFF_UP`.
    pub is_up: bool,
    /// `IFF_LOOPBACK`.
    pub is_loopback: bool,
    /// `IFF_MULTICAST`.
    pub is_multicast: bool,
}

impl NetInterface {
    /// Creates an up, multicast-capable entry; loopback follows `addr`.
    #[must_use]
    pub fn new(name: impl Into<String>, addr: IpAddr) -> Self {
        Self::with_flags(
            name,
            addr,
            LinkFlags {
                is_up: true,
                is_loopback: addr.is_loopback(),
                is_multicast: true,
            },
        )
    }

    /// Creates an entry carrying the flags the OS reported.
    #[must_use]
    pub fn with_flags(name: impl Into<String>, addr: IpAddr, flags: LinkFlags) -> Self {
        Self {
            name: name.into(),
            addr,
            is_up: flags.is_up,
            is_loopback: flags.is_loopback,
            is_multicast: flags.is_multicast,
        }
    }
}

// ============================================================================
// InterfaceSource
// ============================================================================

/// Enumerates host network interfaces.
pub trait InterfaceSource: Send + Sync {
    /// Returns every (interface, address) pair currently configured.
    fn interfaces(&self) -> Vec<NetInterface>;
}

/// Interface source backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> Vec<NetInterface> {
        let links = netdev::get_interfaces();
        if links.is_empty() {
            warn!("No network interfaces reported");
        }

        links
            .iter()
            .flat_map(|link| {
                let flags = LinkFlags {
                    is_up: link.is_up(),
                    is_loopback: link.is_loopback(),
                    is_multicast: link.is_multicast(),
                };
                // Windows names are GUIDs; the friendly name is what classifies
                let name = link.friendly_name.as_deref().unwrap_or(&link.name);
                link.ipv4
                    .iter()
                    .map(move |net| NetInterface::with_flags(name, IpAddr::V4(net.addr()), flags))
            })
            .collect()
    }
}

// ============================================================================
// Heuristic
// ============================================================================

/// Assigns a priority to an interface by name. Lower is better.
#[must_use]
pub fn classify_interface(name: &str) -> u8 {
    let name = name.to_lowercase();

    if VIRTUAL_PATTERNS.iter().any(|p| name.contains(p)) {
        return PRIORITY_VIRTUAL;
    }
    if PHYSICAL_PATTERNS.iter().any(|p| name.contains(p)) {
        return PRIORITY_PHYSICAL;
    }
    PRIORITY_UNKNOWN
}

/// Picks the best LAN IPv4 address from the given interfaces.
///
/// Returns `None` when no candidate survives filtering.
#[must_use]
pub fn select_lan_address(interfaces: &[NetInterface]) -> Option<Ipv4Addr> {
    interfaces
        .iter()
        .filter(|iface| iface.is_up && !iface.is_loopback && iface.is_multicast)
        .filter_map(|iface| match iface.addr {
            IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_link_local() => {
                Some((classify_interface(&iface.name), ip))
            }
            _ => None,
        })
        // min_by_key keeps the first of equal minimums
        .min_by_key(|(priority, _)| *priority)
        .map(|(_, ip)| ip)
}

/// Parses an operator-supplied override.
///
/// `"auto"` (any case) clears the override; anything else must be an
/// IPv4 address.
///
/// # Errors
///
/// Returns [`Error::InvalidLanAddress`] for any other value.
pub fn parse_override(value: &str) -> Result<Option<Ipv4Addr>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case(AUTO) {
        return Ok(None);
    }
    value
        .parse::<Ipv4Addr>()
        .map(Some)
        .map_err(|_| Error::invalid_lan_address(value))
}

// ============================================================================
// AddressResolver
// ============================================================================

/// Resolves the LAN address advertised to the phone.
pub struct AddressResolver {
    /// Where interfaces come from.
    source: Box<dyn InterfaceSource>,
    /// Operator override; wins whenever set.
    override_addr: RwLock<Option<Ipv4Addr>>,
}

impl fmt::Debug for AddressResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressResolver")
            .field("override_addr", &*self.override_addr.read())
            .finish_non_exhaustive()
    }
}

impl AddressResolver {
    /// Creates a resolver over the given interface source.
    #[must_use]
    pub fn new(source: impl InterfaceSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            override_addr: RwLock::new(None),
        }
    }

    /// Creates a resolver over the host's real interfaces.
    #[must_use]
    pub fn system() -> Self {
        Self::new(SystemInterfaces)
    }

    /// Sets the override builder-style.
    #[must_use]
    pub fn with_override(self, addr: Option<Ipv4Addr>) -> Self {
        *self.override_addr.write() = addr;
        self
    }

    /// Replaces the override. `None` returns to auto-detection.
    pub fn set_override(&self, addr: Option<Ipv4Addr>) {
        *self.override_addr.write() = addr;
    }

    /// Returns the current override.
    #[inline]
    #[must_use]
    pub fn override_addr(&self) -> Option<Ipv4Addr> {
        *self.override_addr.read()
    }

    /// Auto-detects the LAN address, ignoring the override.
    #[must_use]
    pub fn detect(&self) -> String {
        let interfaces = self.source.interfaces();
        match select_lan_address(&interfaces) {
            Some(ip) => {
                debug!(%ip, candidates = interfaces.len(), "LAN address detected");
                ip.to_string()
            }
            None => LOCALHOST.to_string(),
        }
    }

    /// Returns the override when set, otherwise the detected address,
    /// otherwise `"localhost"`.
    #[must_use]
    pub fn resolve(&self) -> String {
        match self.override_addr() {
            Some(ip) => ip.to_string(),
            None => self.detect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
