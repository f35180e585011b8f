//! Per-message dispatch for the realtime channel.
//!
//! Messages from one connection are dispatched strictly in arrival order;
//! the caller awaits each dispatch before reading the next frame.
//!
//! # Text Workflows
//!
//! | Mode | Transform available | Workflow |
//! |------|---------------------|----------|
//! | `raw` | any | direct commit |
//! | other | no | direct commit, text unmodified |
//! | other | yes | AI preview, nothing typed |
//!
//! Direct commit types the text then presses Enter. The AI workflow emits
//! `processing`, then `ai_preview` or `ai_error`; the client commits a
//! preview by resubmitting it as a raw text message.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::services::{InputEvent, InputInjector, Key, TextTransform};

use super::event::OutboundEvent;
use super::message::{CommandKind, Message, Mode};

// ============================================================================
// EventSink
// ============================================================================

/// Destination for outbound events.
///
/// A failed emit means the connection is gone and ends the message loop.
#[async_trait]
pub trait EventSink: Send {
    /// Delivers one event.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the event could not be written.
    async fn emit(&mut self, event: OutboundEvent) -> Result<()>;
}

#[async_trait]
impl EventSink for Vec<OutboundEvent> {
    async fn emit(&mut self, event: OutboundEvent) -> Result<()> {
        self.push(event);
        Ok(())
    }
}

// ============================================================================
// ProtocolDispatcher
// ============================================================================

/// Executes inbound messages against the transform and injector services.
pub struct ProtocolDispatcher {
    /// AI text transform.
    transform: Arc<dyn TextTransform>,
    /// Host input injector.
    injector: Arc<dyn InputInjector>,
}

impl fmt::Debug for ProtocolDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolDispatcher")
            .field("transform_available", &self.transform.is_available())
            .finish_non_exhaustive()
    }
}

impl ProtocolDispatcher {
    /// Creates a dispatcher over the given services.
    #[must_use]
    pub fn new(transform: Arc<dyn TextTransform>, injector: Arc<dyn InputInjector>) -> Self {
        Self {
            transform,
            injector,
        }
    }

    /// Decodes and dispatches one text frame.
    ///
    /// Malformed frames are logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns an error only if `sink` fails.
    pub async fn dispatch_frame<S>(&self, frame: &str, sink: &mut S) -> Result<()>
    where
        S: EventSink + ?Sized,
    {
        match Message::decode(frame) {
            Ok(message) => self.dispatch(message, sink).await,
            Err(e) => {
                warn!(error = %e, "Dropping malformed message");
                Ok(())
            }
        }
    }

    /// Dispatches one decoded message.
    ///
    /// # Errors
    ///
    /// Returns an error only if `sink` fails.
    pub async fn dispatch<S>(&self, message: Message, sink: &mut S) -> Result<()>
    where
        S: EventSink + ?Sized,
    {
        match message {
            Message::Text { text, .. } if text.is_empty() => {
                debug!("Ignoring empty text message");
                Ok(())
            }
            Message::Text { text, mode } => {
                if !mode.is_raw() && self.transform.is_available() {
                    self.preview(text, mode, sink).await
                } else {
                    self.commit(text, mode, sink).await
                }
            }
            Message::Command(kind) => self.command(kind, sink).await,
            Message::UnknownCommand(name) => {
                warn!(command = %name, "Unknown command");
                Ok(())
            }
            Message::Unknown(kind) => {
                warn!(message_type = %kind, "Unknown message type");
                Ok(())
            }
        }
    }

    /// AI workflow: transform and return a preview, never inject.
    async fn preview<S>(&self, text: String, mode: Mode, sink: &mut S) -> Result<()>
    where
        S: EventSink + ?Sized,
    {
        info!(%mode, chars = text.chars().count(), "AI processing");
        sink.emit(OutboundEvent::processing(text.as_str())).await?;

        match self.transform.transform(&text, mode).await {
            Ok(processed) => {
                debug!(chars = processed.chars().count(), "AI preview ready");
                sink.emit(OutboundEvent::ai_preview(processed, text, mode))
                    .await
            }
            Err(e) => {
                warn!(error = %e, "AI transform failed");
                sink.emit(OutboundEvent::ai_error(e.to_string())).await
            }
        }
    }

    /// Direct-commit workflow: type the text, then press Enter.
    async fn commit<S>(&self, text: String, mode: Mode, sink: &mut S) -> Result<()>
    where
        S: EventSink + ?Sized,
    {
        info!(chars = text.chars().count(), "Typing and sending");

        let typed = self.inject(InputEvent::Type(text.clone())).await;
        let result = match typed {
            Ok(()) => self.inject(InputEvent::Press(Key::Enter)).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => sink.emit(OutboundEvent::sent(text, mode)).await,
            Err(e) => {
                warn!(error = %e, "Input injection failed");
                sink.emit(OutboundEvent::error(e.to_string())).await
            }
        }
    }

    /// Runs one editing command.
    async fn command<S>(&self, kind: CommandKind, sink: &mut S) -> Result<()>
    where
        S: EventSink + ?Sized,
    {
        info!(command = kind.name(), "Command");

        match self.inject(kind.input_event()).await {
            Ok(()) => sink.emit(OutboundEvent::command_ack(kind)).await,
            Err(e) => {
                warn!(command = kind.name(), error = %e, "Command failed");
                sink.emit(OutboundEvent::error(e.to_string())).await
            }
        }
    }

    /// Runs the injector on the blocking pool.
    async fn inject(&self, event: InputEvent) -> Result<()> {
        let injector = Arc::clone(&self.injector);
        tokio::task::spawn_blocking(move || injector.inject(&event))
            .await
            .map_err(|e| Error::injection(format!("injector task failed: {e}")))?
    }
}

// ============================================================================
// Tests
// ============================================================================
