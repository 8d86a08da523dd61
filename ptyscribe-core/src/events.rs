//! Everything the engine tells the outside world.

use serde::Serialize;

use crate::blocks::{CommandId, CommandRecord};
use crate::session::SessionId;

/// Output growth of the in-flight command. Sent once more with
/// `is_completed = true` at finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandExecutionEvent {
    pub command_id: CommandId,
    pub session_id: SessionId,
    /// The page the change landed in.
    pub output_chunk: String,
    pub is_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionDirectoryEvent {
    pub session_id: SessionId,
    pub current_directory: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    CommandOutput(CommandExecutionEvent),
    /// The in-flight slot is free again; the next queued command may go.
    CommandCompleted {
        session_id: SessionId,
        record: CommandRecord,
    },
    DirectoryChanged(SessionDirectoryEvent),
    /// Bytes for the companion renderer (screen clear + welcome).
    RendererWrite { session_id: SessionId, data: String },
    FullscreenChanged { session_id: SessionId, active: bool },
    InteractivePrompt {
        session_id: SessionId,
        command_id: CommandId,
        prompt: String,
    },
}

impl EngineEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            EngineEvent::CommandOutput(e) => &e.session_id,
            EngineEvent::DirectoryChanged(e) => &e.session_id,
            EngineEvent::CommandCompleted { session_id, .. }
            | EngineEvent::RendererWrite { session_id, .. }
            | EngineEvent::FullscreenChanged { session_id, .. }
            | EngineEvent::InteractivePrompt { session_id, .. } => session_id,
        }
    }
}
