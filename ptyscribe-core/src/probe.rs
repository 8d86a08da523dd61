//! The one question the engine asks the PTY layer.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Answer to "is the foreground program blocked reading the terminal?".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputWait {
    pub waiting: bool,
    /// Line discipline is canonical (line-buffered) rather than raw.
    pub canonical: bool,
    /// Bytes already queued on the PTY and not yet read by us.
    pub available_bytes: usize,
}

/// Implemented by the PTY layer. Must not block.
pub trait InputProbe: Send + Sync {
    fn input_wait(&self) -> anyhow::Result<InputWait>;
}

/// For sessions without a queryable PTY.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverWaiting;

impl InputProbe for NeverWaiting {
    fn input_wait(&self) -> anyhow::Result<InputWait> {
        Ok(InputWait::default())
    }
}

/// A probe flipped by hand. Handy for replaying recorded sessions.
#[derive(Debug, Default)]
pub struct ManualProbe {
    waiting: AtomicBool,
    canonical: AtomicBool,
}

impl ManualProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_waiting(&self, waiting: bool, canonical: bool) {
        self.waiting.store(waiting, Ordering::SeqCst);
        self.canonical.store(canonical, Ordering::SeqCst);
    }
}

impl InputProbe for ManualProbe {
    fn input_wait(&self) -> anyhow::Result<InputWait> {
        Ok(InputWait {
            waiting: self.waiting.load(Ordering::SeqCst),
            canonical: self.canonical.load(Ordering::SeqCst),
            available_bytes: 0,
        })
    }
}

/// Query errors count as "not waiting".
pub(crate) fn is_waiting_for_input(probe: &dyn InputProbe) -> bool {
    match probe.input_wait() {
        Ok(wait) => {
            tracing::trace!(?wait, "input probe");
            wait.waiting
        }
        Err(e) => {
            tracing::debug!("input probe failed: {:#}", e);
            false
        }
    }
}
