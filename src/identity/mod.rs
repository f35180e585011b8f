//! TLS identity management.
//!
//! Owns the self-signed certificate/key pair the HTTPS listener serves,
//! bound to the resolved LAN address.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `manager` | Load, validate, regenerate and persist the identity |

// ============================================================================
// Submodules
// ============================================================================

/// Identity lifecycle.
pub mod manager;

// ============================================================================
// Re-exports
// ============================================================================

pub use manager::{CERT_FILE, Identity, IdentityManager, KEY_FILE};
