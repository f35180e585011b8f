//! Realtime protocol.
//!
//! One JSON object per WebSocket text frame in each direction.
//!
//! | Direction | Type | Purpose |
//! |-----------|------|---------|
//! | Client → Host | `text` | Type text, optionally after AI processing |
//! | Client → Host | `command` | Editing command (`clear`, `enter`, ...) |
//! | Host → Client | `processing` | AI workflow started |
//! | Host → Client | `ai_preview` | Processed text awaiting the client |
//! | Host → Client | `ai_error` | AI workflow failed |
//! | Host → Client | `ack` | Input performed |
//! | Host → Client | `error` | Input failed |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `dispatcher` | Executes messages, produces events |
//! | `event` | Outbound event types |
//! | `message` | Inbound message types |

// ============================================================================
// Submodules
// ============================================================================

/// Message dispatch.
pub mod dispatcher;

/// Outbound events.
pub mod event;

/// Inbound messages.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatcher::{EventSink, ProtocolDispatcher};
pub use event::OutboundEvent;
pub use message::{CommandKind, Message, Mode};
