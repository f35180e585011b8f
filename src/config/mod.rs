//! Runtime options and persisted settings.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `files` | Data directory and owner-only file writes |
//! | `options` | [`ServerOptions`] builder |
//! | `settings` | [`SettingsStore`] backed by `gtalk_config.json` |

// ============================================================================
// Submodules
// ============================================================================

/// Data directory and owner-only writes.
pub mod files;

/// Server runtime options.
pub mod options;

/// Persisted transform-service settings.
pub mod settings;

// ============================================================================
// Re-exports
// ============================================================================

pub use options::{DEFAULT_PORT, ServerOptions};
pub use settings::{ConfigPatch, SETTINGS_FILE, Settings, SettingsStore, SettingsUpdate};
