//! Inbound realtime messages.
//!
//! Each WebSocket text frame carries one JSON object:
//!
//! ```json
//! { "type": "text", "text": "hello", "mode": "tidy" }
//! { "type": "command", "text": "ctrl_z" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::services::injector::{InputEvent, Key, Modifier};

// ============================================================================
// Mode
// ============================================================================

/// Text processing mode requested by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Type the text as-is.
    #[default]
    Raw,
    /// Remove repetitions and fillers, add punctuation.
    Tidy,
    /// Tidy, then rewrite in written register.
    Formal,
    /// Translate between Chinese and English.
    Translate,
}

impl Mode {
    /// Parses a wire mode. Empty or unknown values are [`Mode::Raw`].
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match value {
            "tidy" => Self::Tidy,
            "formal" => Self::Formal,
            "translate" => Self::Translate,
            _ => Self::Raw,
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Tidy => "tidy",
            Self::Formal => "formal",
            Self::Translate => "translate",
        }
    }

    /// Returns `true` for [`Mode::Raw`].
    #[inline]
    #[must_use]
    pub const fn is_raw(self) -> bool {
        matches!(self, Self::Raw)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CommandKind
// ============================================================================

/// Editing command the client can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Select all and delete in the focused field.
    Clear,
    /// Press Enter.
    Enter,
    /// Press Shift+Enter.
    ShiftEnter,
    /// Undo.
    CtrlZ,
    /// Paste.
    CtrlV,
    /// Press Tab.
    Tab,
    /// Press Escape.
    Escape,
}

impl CommandKind {
    /// Every command, in wire order.
    pub const ALL: [Self; 7] = [
        Self::Clear,
        Self::Enter,
        Self::ShiftEnter,
        Self::CtrlZ,
        Self::CtrlV,
        Self::Tab,
        Self::Escape,
    ];

    /// Parses a wire command name.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == value)
    }

    /// Wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Enter => "enter",
            Self::ShiftEnter => "shift_enter",
            Self::CtrlZ => "ctrl_z",
            Self::CtrlV => "ctrl_v",
            Self::Tab => "tab",
            Self::Escape => "escape",
        }
    }

    /// Status reported in the `ack` for this command.
    #[must_use]
    pub const fn ack_status(self) -> &'static str {
        match self {
            Self::Clear => "cleared",
            other => other.name(),
        }
    }

    /// The single injector operation this command performs.
    #[must_use]
    pub fn input_event(self) -> InputEvent {
        match self {
            Self::Clear => InputEvent::ClearField,
            Self::Enter => InputEvent::Press(Key::Enter),
            Self::ShiftEnter => InputEvent::Combo(Modifier::Shift, Key::Enter),
            Self::CtrlZ => InputEvent::Combo(Modifier::Ctrl, Key::Z),
            Self::CtrlV => InputEvent::Combo(Modifier::Ctrl, Key::V),
            Self::Tab => InputEvent::Press(Key::Tab),
            Self::Escape => InputEvent::Press(Key::Escape),
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// Raw wire shape of an inbound frame.
#[derive(Debug, Clone, Default, Deserialize)]
struct WireMessage {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    mode: Option<String>,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Text to type, possibly after AI processing.
    Text {
        /// Text as sent by the client.
        text: String,
        /// Requested mode; absent means raw.
        mode: Mode,
    },

    /// Known editing command.
    Command(CommandKind),

    /// Command name not in the closed set.
    UnknownCommand(String),

    /// Message type not understood.
    Unknown(String),
}

impl Message {
    /// Decodes one frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRequest`] if the frame is not a JSON object
    /// of the expected shape.
    pub fn decode(frame: &str) -> Result<Self> {
        let wire: WireMessage = serde_json::from_str(frame)
            .map_err(|e| Error::malformed(format!("invalid message: {e}")))?;

        Ok(match wire.kind.as_str() {
            "text" => Self::Text {
                text: wire.text,
                mode: wire.mode.as_deref().map(Mode::from_wire).unwrap_or_default(),
            },
            "command" => match CommandKind::from_wire(&wire.text) {
                Some(kind) => Self::Command(kind),
                None => Self::UnknownCommand(wire.text),
            },
            _ => Self::Unknown(wire.kind),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
