//! Realtime WebSocket connection loop.
//!
//! One task owns each accepted connection: it reads frames, dispatches
//! them in order, and is the only writer to the socket. The loop ends when
//! the client closes, the stream fails, a write fails, or the hub signals
//! that a newer connection superseded this one.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot::error::TryRecvError;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::protocol::{EventSink, OutboundEvent, ProtocolDispatcher};

use super::hub::{CloseSignal, ConnectionTicket};

// ============================================================================
// CloseReason
// ============================================================================

/// Why a connection loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A newer connection took the slot.
    Superseded,
    /// Client sent a Close frame.
    ClosedByPeer,
    /// Stream ended without a Close frame.
    StreamEnded,
    /// Reading a frame failed.
    ReadFailed,
    /// Writing an event failed.
    WriteFailed,
}

// ============================================================================
// EventSink for WebSocket
// ============================================================================

#[async_trait]
impl<S> EventSink for SplitSink<WebSocketStream<S>, Message>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn emit(&mut self, event: OutboundEvent) -> Result<()> {
        let json = event.to_json()?;
        trace!(event = event.kind(), "Sending event");
        self.send(Message::Text(json.into())).await?;
        Ok(())
    }
}

// ============================================================================
// Connection
// ============================================================================

/// An accepted realtime connection awaiting its loop.
pub struct Connection<S> {
    /// WebSocket stream.
    ws: WebSocketStream<S>,
    /// Slot identity in the hub.
    ticket: ConnectionTicket,
    /// Supersede signal from the hub.
    close_signal: CloseSignal,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an upgraded stream.
    #[must_use]
    pub fn new(ws: WebSocketStream<S>, ticket: ConnectionTicket, close_signal: CloseSignal) -> Self {
        Self {
            ws,
            ticket,
            close_signal,
        }
    }

    /// Runs the message loop to completion.
    pub async fn run(self, dispatcher: &ProtocolDispatcher) -> CloseReason {
        let Self {
            ws,
            ticket,
            mut close_signal,
        } = self;
        let (mut ws_write, mut ws_read) = ws.split();

        loop {
            tokio::select! {
                biased;

                _ = &mut close_signal => return close_superseded(&mut ws_write, &ticket).await,

                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            // frames queued behind a supersede are dropped
                            if !matches!(close_signal.try_recv(), Err(TryRecvError::Empty)) {
                                return close_superseded(&mut ws_write, &ticket).await;
                            }

                            if let Err(e) = dispatcher.dispatch_frame(text.as_str(), &mut ws_write).await {
                                if e.is_connection_error() {
                                    debug!(addr = %ticket.remote_addr, error = %e, "Peer gone while writing event");
                                } else {
                                    warn!(addr = %ticket.remote_addr, error = %e, "Failed to write event");
                                }
                                return CloseReason::WriteFailed;
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!(addr = %ticket.remote_addr, "WebSocket closed by client");
                            return CloseReason::ClosedByPeer;
                        }

                        Some(Err(e)) => {
                            debug!(addr = %ticket.remote_addr, error = %e, "WebSocket read error");
                            return CloseReason::ReadFailed;
                        }

                        None => {
                            debug!(addr = %ticket.remote_addr, "WebSocket stream ended");
                            return CloseReason::StreamEnded;
                        }

                        // Binary, Ping, Pong, Frame
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }
}

/// Sends a Close frame to a connection that lost its slot.
async fn close_superseded<S>(
    ws_write: &mut SplitSink<WebSocketStream<S>, Message>,
    ticket: &ConnectionTicket,
) -> CloseReason
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!(addr = %ticket.remote_addr, "Closing superseded connection");
    // best-effort; the peer may already be gone
    let _ = ws_write.send(Message::Close(None)).await;
    let _ = ws_write.close().await;
    CloseReason::Superseded
}

// ============================================================================
// Tests
// ============================================================================
