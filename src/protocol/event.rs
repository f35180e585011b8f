//! Outbound realtime events.
//!
//! Every dispatched message produces at most one terminal event, optionally
//! preceded by `processing`.
//!
//! # Event Types
//!
//! | Type | Fields | Meaning |
//! |------|--------|---------|
//! | `processing` | `text`, `status` | AI workflow started |
//! | `ai_preview` | `text`, `original`, `mode` | Processed text, not typed |
//! | `ai_error` | `error` | Transform failed, nothing typed |
//! | `ack` | `text?`, `original?`, `mode?`, `status` | Injection succeeded |
//! | `error` | `error` | Injection failed |

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;

use super::message::{CommandKind, Mode};

// ============================================================================
// Constants
// ============================================================================

/// Status carried by `processing`.
pub const STATUS_AI_PROCESSING: &str = "ai_processing";

/// Status carried by the `ack` of a committed text.
pub const STATUS_SENT: &str = "sent";

// ============================================================================
// OutboundEvent
// ============================================================================

/// An event sent from the host to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// AI processing started.
    Processing {
        /// Original text.
        text: String,
        /// Always `ai_processing`.
        status: String,
    },

    /// Processed text awaiting client action.
    AiPreview {
        /// Processed text.
        text: String,
        /// Text as submitted.
        original: String,
        /// Mode that produced `text`.
        mode: Mode,
    },

    /// Transform failure.
    AiError {
        /// Failure message.
        error: String,
    },

    /// Injection succeeded.
    Ack {
        /// Typed text (text workflow only).
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Submitted text (text workflow only).
        #[serde(skip_serializing_if = "Option::is_none")]
        original: Option<String>,
        /// Requested mode (text workflow only).
        #[serde(skip_serializing_if = "Option::is_none")]
        mode: Option<Mode>,
        /// `sent` or the command's status.
        status: String,
    },

    /// Injection failure.
    Error {
        /// Failure message.
        error: String,
    },
}

// ============================================================================
// Constructors
// ============================================================================

impl OutboundEvent {
    /// `processing` for `text`.
    #[inline]
    #[must_use]
    pub fn processing(text: impl Into<String>) -> Self {
        Self::Processing {
            text: text.into(),
            status: STATUS_AI_PROCESSING.to_string(),
        }
    }

    /// `ai_preview` with the processed and original text.
    #[inline]
    #[must_use]
    pub fn ai_preview(processed: impl Into<String>, original: impl Into<String>, mode: Mode) -> Self {
        Self::AiPreview {
            text: processed.into(),
            original: original.into(),
            mode,
        }
    }

    /// `ai_error` with a failure message.
    #[inline]
    #[must_use]
    pub fn ai_error(error: impl Into<String>) -> Self {
        Self::AiError {
            error: error.into(),
        }
    }

    /// `ack` for text typed and submitted.
    #[must_use]
    pub fn sent(text: impl Into<String>, mode: Mode) -> Self {
        let text = text.into();
        Self::Ack {
            original: Some(text.clone()),
            text: Some(text),
            mode: Some(mode),
            status: STATUS_SENT.to_string(),
        }
    }

    /// `ack` for an executed command.
    #[inline]
    #[must_use]
    pub fn command_ack(kind: CommandKind) -> Self {
        Self::Ack {
            text: None,
            original: None,
            mode: None,
            status: kind.ack_status().to_string(),
        }
    }

    /// `error` with a failure message.
    #[inline]
    #[must_use]
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl OutboundEvent {
    /// Wire `type` of this event.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Processing { .. } => "processing",
            Self::AiPreview { .. } => "ai_preview",
            Self::AiError { .. } => "ai_error",
            Self::Ack { .. } => "ack",
            Self::Error { .. } => "error",
        }
    }

    /// Serializes to the JSON text frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{Value, json};

    fn wire(event: &OutboundEvent) -> Value {
        serde_json::to_value(event).expect("serialize")
    }

    #[test]
    fn test_processing_shape() {
        assert_eq!(
            wire(&OutboundEvent::processing("hello")),
            json!({ "type": "processing", "text": "hello", "status": "ai_processing" })
        );
    }

    #[test]
    fn test_ai_preview_shape() {
        assert_eq!(
            wire(&OutboundEvent::ai_preview("Hello.", "hello", Mode::Tidy)),
            json!({ "type": "ai_preview", "text": "Hello.", "original": "hello", "mode": "tidy" })
        );
    }

    #[test]
    fn test_sent_ack_shape() {
        assert_eq!(
            wire(&OutboundEvent::sent("hi", Mode::Raw)),
            json!({ "type": "ack", "text": "hi", "original": "hi", "mode": "raw", "status": "sent" })
        );
    }

    #[test]
    fn test_command_ack_omits_text_fields() {
        assert_eq!(
            wire(&OutboundEvent::command_ack(CommandKind::Clear)),
            json!({ "type": "ack", "status": "cleared" })
        );
    }

    #[test]
    fn test_error_shapes() {
        assert_eq!(
            wire(&OutboundEvent::ai_error("timeout")),
            json!({ "type": "ai_error", "error": "timeout" })
        );
        assert_eq!(
            wire(&OutboundEvent::error("xdotool failed")),
            json!({ "type": "error", "error": "xdotool failed" })
        );
    }

    #[test]
    fn test_kind_matches_wire_type() {
        let events = [
            OutboundEvent::processing("a"),
            OutboundEvent::ai_preview("a", "b", Mode::Formal),
            OutboundEvent::ai_error("e"),
            OutboundEvent::command_ack(CommandKind::Tab),
            OutboundEvent::error("e"),
        ];
        for event in events {
            assert_eq!(wire(&event)["type"], event.kind());
        }
    }
}
