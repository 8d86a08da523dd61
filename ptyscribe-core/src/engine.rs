use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::blocks::{CommandId, CommandRecord};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::probe::InputProbe;
use crate::session::reader::Reader;
use crate::session::{SessionId, SessionProcessingState, TerminalSession};
use crate::term::{MarkerPromptDetector, PromptDetector};

type CompletionHook = Box<dyn Fn(&SessionId) + Send + Sync>;

/// The session output engine. One instance serves every open session.
///
/// Chunks for the same session must arrive in order from a single writer;
/// chunks for different sessions may be processed in parallel.
pub struct TerminalEngine {
    config: EngineConfig,
    detector: Box<dyn PromptDetector>,
    sessions: DashMap<SessionId, Arc<Mutex<TerminalSession>>>,
    processing: DashMap<SessionId, SessionProcessingState>,
    on_command_completed: Option<CompletionHook>,
}

impl fmt::Debug for TerminalEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalEngine")
            .field("config", &self.config)
            .field("detector", &"Box<dyn PromptDetector>")
            .field("sessions", &self.sessions.len())
            .field("on_command_completed", &self.on_command_completed.is_some())
            .finish()
    }
}

impl TerminalEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let detector = MarkerPromptDetector::new(&config)?;
        Self::with_detector(config, Box::new(detector))
    }

    /// Swap in a different prompt detection strategy.
    pub fn with_detector(
        config: EngineConfig,
        detector: Box<dyn PromptDetector>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            detector,
            sessions: DashMap::new(),
            processing: DashMap::new(),
            on_command_completed: None,
        })
    }

    /// Called once per finished command, after the session lock is released.
    /// This is where the caller dispatches its next queued command.
    pub fn with_completion_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SessionId) + Send + Sync + 'static,
    {
        self.on_command_completed = Some(Box::new(hook));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ────────────────────────────────────────────────────────────────

    pub fn open_session(
        &self,
        id: SessionId,
        probe: Arc<dyn InputProbe>,
    ) -> Result<(), EngineError> {
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => Err(EngineError::SessionExists(id)),
            Entry::Vacant(slot) => {
                let session = TerminalSession::new(id.clone(), probe, &self.config);
                slot.insert(Arc::new(Mutex::new(session)));
                info!(session = %id, "session opened");
                Ok(())
            }
        }
    }

    /// Drop the session and everything attached to it. Returns false if it
    /// was not open.
    pub fn close_session(&self, id: &SessionId) -> bool {
        self.processing.remove(id);
        let existed = self.sessions.remove(id).is_some();
        if existed {
            info!(session = %id, "session closed");
        }
        existed
    }

    /// Release the ephemeral processing bookkeeping for a session.
    pub fn clear_session_state(&self, id: &SessionId) {
        if let Ok(session) = self.session(id) {
            lock(&session).settle_tail_row();
        }
        if self.processing.remove(id).is_some() {
            debug!(session = %id, "processing state cleared");
        }
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Read-only look at a session.
    pub fn inspect<R>(&self, id: &SessionId, f: impl FnOnce(&TerminalSession) -> R) -> Option<R> {
        let session = self.session(id).ok()?;
        let guard = lock(&session);
        Some(f(&guard))
    }

    // ────────────────────────────────────────────────────────────────
    // Commands + output
    // ────────────────────────────────────────────────────────────────

    /// Record that `command` was written to the shell.
    pub fn begin_command(
        &self,
        id: &SessionId,
        command: impl Into<String>,
    ) -> Result<CommandId, EngineError> {
        let session = self.session(id)?;
        let mut guard = lock(&session);

        if !guard.init_state().is_ready() {
            return Err(EngineError::SessionNotReady(id.clone()));
        }
        if let Some(current) = guard.current_command() {
            return Err(EngineError::CommandInFlight {
                session: id.clone(),
                command: current.command.clone(),
            });
        }

        let cwd = Some(guard.current_directory().to_string()).filter(|d| !d.is_empty());
        let record = CommandRecord::new_now(command, cwd);
        let command_id = record.id;
        debug!(session = %id, command = %record.command, "command dispatched");
        guard.start_command(record);

        // A fresh command starts a fresh row.
        if let Some(mut state) = self.processing.get_mut(id) {
            state.just_handled_carriage_return = false;
        }
        Ok(command_id)
    }

    /// Feed the next chunk of PTY output. Returns the events it produced, in
    /// order.
    pub fn process_output(
        &self,
        id: &SessionId,
        chunk: &str,
    ) -> Result<Vec<EngineEvent>, EngineError> {
        let session = self.session(id)?;

        // Copy out so no map shard stays locked while the chunk is processed.
        let mut state = *self.processing.entry(id.clone()).or_default();
        let mut out = Vec::new();

        {
            let mut guard = lock(&session);
            let mut reader = Reader {
                config: &self.config,
                detector: self.detector.as_ref(),
                state: &mut state,
                out: &mut out,
            };
            guard.ingest(chunk, &mut reader);
        }

        if self.sessions.contains_key(id) {
            self.processing.insert(id.clone(), state);
        }

        if let Some(hook) = &self.on_command_completed {
            for ev in &out {
                if let EngineEvent::CommandCompleted { session_id, .. } = ev {
                    hook(session_id);
                }
            }
        }

        Ok(out)
    }

    fn session(&self, id: &SessionId) -> Result<Arc<Mutex<TerminalSession>>, EngineError> {
        self.sessions
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| EngineError::UnknownSession(id.clone()))
    }
}

/// A panic mid-chunk leaves the session usable; the worst case is one
/// half-classified line.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
