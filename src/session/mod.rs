//! Session secrets and device pairing.
//!
//! A session is created once at process start: a bearer token required on
//! every gated request and a 4-digit pair code that lets one device claim
//! the pairing slot for 24 hours.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `authority` | Token authorization and the single pairing slot |
//! | `secret` | Secret generation and constant-time comparison |

// ============================================================================
// Submodules
// ============================================================================

/// Token authorization and the pairing slot.
pub mod authority;

/// Secret generation and comparison.
pub mod secret;

// ============================================================================
// Re-exports
// ============================================================================

pub use authority::{PAIR_TTL, PairingState, Session, SessionAuthority, format_timestamp};
pub use secret::constant_time_eq;
