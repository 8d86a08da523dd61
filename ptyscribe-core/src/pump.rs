//! Async glue: PTY bytes in, engine events out.
//!
//! The outbound channel is bounded. When the consumer falls behind, `send`
//! awaits, the pump stops draining the PTY channel, and the PTY reader thread
//! blocks on its own full channel.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::TerminalEngine;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::session::SessionId;

/// Upper bound on bytes merged from already-queued chunks into one
/// `process_output` call.
const COALESCE_LIMIT: usize = 64 * 1024;

/// Run until the byte channel closes or the event receiver goes away.
pub async fn pump_session(
    engine: Arc<TerminalEngine>,
    session_id: SessionId,
    mut bytes_rx: mpsc::Receiver<Vec<u8>>,
    events_tx: mpsc::Sender<EngineEvent>,
) -> Result<(), EngineError> {
    let mut decoder = Utf8Decoder::default();

    while let Some(bytes) = bytes_rx.recv().await {
        let mut text = decoder.decode(&bytes);

        // COALESCING: take whatever is already queued before classifying.
        while text.len() < COALESCE_LIMIT {
            match bytes_rx.try_recv() {
                Ok(more) => text.push_str(&decoder.decode(&more)),
                Err(_) => break,
            }
        }

        if text.is_empty() {
            continue;
        }

        let events = engine.process_output(&session_id, &text)?;
        if !forward(&events_tx, events).await {
            debug!(session = %session_id, "event receiver dropped, pump stopping");
            return Ok(());
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        let events = engine.process_output(&session_id, &rest)?;
        forward(&events_tx, events).await;
    }

    debug!(session = %session_id, "pty stream ended");
    Ok(())
}

async fn forward(tx: &mpsc::Sender<EngineEvent>, events: Vec<EngineEvent>) -> bool {
    for ev in events {
        if tx.send(ev).await.is_err() {
            return false;
        }
    }
    true
}

/// Incremental UTF-8 decoding. A multi-byte character split across reads is
/// held back until its remaining bytes arrive; invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more.
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// Flush whatever is held back, lossily.
    pub fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }
}
