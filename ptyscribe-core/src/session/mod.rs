//! Per-session state.
//!
//! `TerminalSession` is owned by the engine's registry and mutated by exactly
//! one writer at a time (the task delivering that session's chunks).
//! `reader` holds the read-state algorithm that feeds it.

pub(crate) mod reader;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::blocks::{CommandRecord, OutputAccumulator};
use crate::config::EngineConfig;
use crate::probe::InputProbe;
use crate::state_machine::InitState;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Ephemeral bookkeeping that lives beside the session in the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionProcessingState {
    /// A bare `\r` just rewrote the last output row; the next terminated
    /// line settles that same row.
    pub just_handled_carriage_return: bool,
}

pub struct TerminalSession {
    id: SessionId,
    raw_buffer: String,
    init_state: InitState,
    current_directory: String,
    is_fullscreen: bool,
    is_interactive_mode: bool,
    interactive_prompt: Option<String>,
    /// The next terminated line is the user's answer on the prompt row.
    answering_prompt: bool,
    /// Only the first line after dispatch can be the shell's echo.
    echo_pending: bool,
    /// Raw text of a tail already shown as a progress row. Data that does
    /// not open with a line break continues it.
    tail_row: Option<String>,
    current_executing_command: Option<CommandRecord>,
    current_command_output: OutputAccumulator,
    probe: Arc<dyn InputProbe>,
}

impl fmt::Debug for TerminalSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalSession")
            .field("id", &self.id)
            .field("raw_buffer_len", &self.raw_buffer.len())
            .field("init_state", &self.init_state)
            .field("current_directory", &self.current_directory)
            .field("is_fullscreen", &self.is_fullscreen)
            .field("is_interactive_mode", &self.is_interactive_mode)
            .field("current_executing_command", &self.current_executing_command)
            .field("probe", &"Arc<dyn InputProbe>")
            .finish()
    }
}

impl TerminalSession {
    pub fn new(id: SessionId, probe: Arc<dyn InputProbe>, config: &EngineConfig) -> Self {
        Self {
            id,
            raw_buffer: String::new(),
            init_state: InitState::initial(config),
            current_directory: String::new(),
            is_fullscreen: false,
            is_interactive_mode: false,
            interactive_prompt: None,
            answering_prompt: false,
            echo_pending: false,
            tail_row: None,
            current_executing_command: None,
            current_command_output: OutputAccumulator::new(),
            probe,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn raw_buffer(&self) -> &str {
        &self.raw_buffer
    }

    pub fn init_state(&self) -> InitState {
        self.init_state
    }

    pub fn current_directory(&self) -> &str {
        &self.current_directory
    }

    pub fn is_fullscreen(&self) -> bool {
        self.is_fullscreen
    }

    pub fn is_interactive_mode(&self) -> bool {
        self.is_interactive_mode
    }

    pub fn interactive_prompt(&self) -> Option<&str> {
        self.interactive_prompt.as_deref()
    }

    pub fn current_command(&self) -> Option<&CommandRecord> {
        self.current_executing_command.as_ref()
    }

    pub fn current_command_output(&self) -> &str {
        self.current_command_output.as_str()
    }

    pub fn current_output_line_count(&self) -> usize {
        self.current_command_output.line_count()
    }

    /// Put a freshly dispatched command in flight.
    /// Callers check `current_command()` first.
    pub(crate) fn start_command(&mut self, record: CommandRecord) {
        debug_assert!(self.current_executing_command.is_none());
        self.current_command_output.take();
        self.answering_prompt = false;
        self.echo_pending = true;
        self.tail_row = None;
        self.current_executing_command = Some(record);
    }

    /// The row shown for the last tail is final; later data opens a new one.
    pub(crate) fn settle_tail_row(&mut self) {
        self.tail_row = None;
    }
}
