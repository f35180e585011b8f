//! Server lifecycle notifications.
//!
//! Presentation adapters subscribe to a broadcast channel of
//! [`ServerEvent`]s instead of being wired into the dispatch loop.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `bus` | Event types and broadcast channel |
//! | `console` | Terminal adapter: log lines and pairing QR code |

// ============================================================================
// Submodules
// ============================================================================

/// Event types and broadcast.
pub mod bus;

/// Terminal presentation.
pub mod console;

// ============================================================================
// Re-exports
// ============================================================================

pub use bus::{EventBus, ServerEvent};
pub use console::{ConsoleAdapter, qr_lines};
