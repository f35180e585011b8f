//! LAN address selection.
//!
//! Picks the IPv4 address the phone should use to reach this host. The
//! result feeds the TLS identity's subject-alternative-names and the
//! pairing URL.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `resolver` | Interface enumeration and name-based priority heuristic |

// ============================================================================
// Submodules
// ============================================================================

/// Interface enumeration and LAN address heuristic.
pub mod resolver;

// ============================================================================
// Re-exports
// ============================================================================

pub use resolver::{
    AddressResolver, InterfaceSource, LOCALHOST, LinkFlags, NetInterface, SystemInterfaces,
};
