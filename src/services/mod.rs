//! External collaborators of the dispatcher.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `injector` | [`InputInjector`] trait, logical [`InputEvent`]s, [`CommandInjector`] |
//! | `transform` | [`TextTransform`] trait and [`ChatTransform`] client |

// ============================================================================
// Submodules
// ============================================================================

/// Host input injection.
pub mod injector;

/// AI text transform.
pub mod transform;

// ============================================================================
// Re-exports
// ============================================================================

pub use injector::{Backend, CommandInjector, InputEvent, InputInjector, Key, Modifier};
pub use transform::{ChatTransform, TRANSFORM_TIMEOUT, TextTransform};
