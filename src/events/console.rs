//! Terminal presentation adapter.
//!
//! Prints the pairing banner (URL, pair code and a QR code of the pairing
//! URL) when the server starts, and one line per later event.

// ============================================================================
// Imports
// ============================================================================

use std::io::Write;

use qrcodegen::{QrCode, QrCodeEcc};
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::session::format_timestamp;

use super::bus::ServerEvent;

// ============================================================================
// Constants
// ============================================================================

/// Light modules around the symbol.
const QUIET_ZONE: i32 = 2;

// ============================================================================
// QR Rendering
// ============================================================================

/// Renders `data` as terminal rows, two modules per row.
///
/// Returns `None` if the data does not fit in a QR symbol.
#[must_use]
pub fn qr_lines(data: &str) -> Option<Vec<String>> {
    let code = QrCode::encode_text(data, QrCodeEcc::Low).ok()?;
    let size = code.size();

    let lines: Vec<String> = (-QUIET_ZONE..size + QUIET_ZONE)
        .step_by(2)
        .map(|y| {
            (-QUIET_ZONE..size + QUIET_ZONE)
                .map(|x| match (code.get_module(x, y), code.get_module(x, y + 1)) {
                    (true, true) => '█',
                    (true, false) => '▀',
                    (false, true) => '▄',
                    (false, false) => ' ',
                })
                .collect()
        })
        .collect();

    Some(lines)
}

// ============================================================================
// ConsoleAdapter
// ============================================================================

/// Writes server events to a terminal.
pub struct ConsoleAdapter<W> {
    events: Receiver<ServerEvent>,
    out: W,
}

impl<W: Write> ConsoleAdapter<W> {
    /// Creates an adapter reading `events` and writing to `out`.
    #[must_use]
    pub fn new(events: Receiver<ServerEvent>, out: W) -> Self {
        Self { events, out }
    }

    /// Consumes events until the bus closes; returns the writer.
    pub async fn run(mut self) -> W {
        loop {
            match self.events.recv().await {
                Ok(event) => {
                    if let Err(e) = self.show(&event) {
                        warn!(error = %e, "Console write failed");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Console fell behind, events skipped");
                }
                Err(RecvError::Closed) => return self.out,
            }
        }
    }

    /// Presents one event.
    ///
    /// # Errors
    ///
    /// Returns the writer's error.
    pub fn show(&mut self, event: &ServerEvent) -> std::io::Result<()> {
        match event {
            ServerEvent::Started {
                url,
                pairing_url,
                pair_code,
            } => {
                writeln!(self.out)?;
                writeln!(self.out, "  Ginkgo Talk is running at {url}")?;
                writeln!(self.out, "  Scan to open on your phone:")?;
                writeln!(self.out)?;
                match qr_lines(pairing_url) {
                    Some(lines) => {
                        for line in lines {
                            writeln!(self.out, "  {line}")?;
                        }
                    }
                    None => writeln!(self.out, "  (QR code unavailable)")?,
                }
                writeln!(self.out)?;
                writeln!(self.out, "  Or open: {pairing_url}")?;
                writeln!(self.out, "  Pair code: {pair_code}")?;
                writeln!(self.out)?;
                self.out.flush()
            }

            ServerEvent::ClientConnected { addr } => {
                info!(%addr, "Phone connected");
                Ok(())
            }

            ServerEvent::ClientDisconnected { addr } => {
                info!(%addr, "Phone disconnected");
                Ok(())
            }

            ServerEvent::DevicePaired {
                device_id,
                expires_at,
            } => {
                writeln!(
                    self.out,
                    "  Paired with {device_id} until {}",
                    format_timestamp(*expires_at)
                )?;
                self.out.flush()
            }

            ServerEvent::SettingsChanged => {
                info!("Settings changed from phone");
                Ok(())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};

    use crate::events::EventBus;

    #[test]
    fn test_qr_lines_are_square_blocks() {
        let lines = qr_lines("https://192.168.1.20:9527/?token=abcdef").expect("fits");

        let width = lines[0].chars().count();
        assert!(width >= 21 + 4);
        assert!(lines.iter().all(|line| line.chars().count() == width));
        assert_eq!(lines.len(), width.div_ceil(2));
        assert!(lines.iter().any(|line| line.contains('█')));
    }

    #[test]
    fn test_qr_lines_too_long() {
        assert!(qr_lines(&"x".repeat(8000)).is_none());
    }

    #[test]
    fn test_started_banner() {
        let bus = EventBus::new();
        let mut console = ConsoleAdapter::new(bus.subscribe(), Vec::new());

        console
            .show(&ServerEvent::Started {
                url: "https://10.0.0.5:9527".into(),
                pairing_url: "https://10.0.0.5:9527/?token=t0k".into(),
                pair_code: "4821".into(),
            })
            .expect("show");

        let text = String::from_utf8(console.out).expect("utf8");
        assert!(text.contains("running at https://10.0.0.5:9527"));
        assert!(text.contains("Or open: https://10.0.0.5:9527/?token=t0k"));
        assert!(text.contains("Pair code: 4821"));
    }

    #[tokio::test]
    async fn test_run_stops_when_bus_closes() {
        let bus = EventBus::new();
        let console = ConsoleAdapter::new(bus.subscribe(), Vec::new());

        bus.publish(ServerEvent::DevicePaired {
            device_id: "pixel".into(),
            expires_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single().expect("time"),
        });
        drop(bus);

        let out = console.run().await;
        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(text, "  Paired with pixel until 2026-01-02T03:04:05Z\n");
    }
}
