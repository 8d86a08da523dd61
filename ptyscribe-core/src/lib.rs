//! ptyscribe-core: turns a raw PTY output stream into structured records.
//!
//! Feed chunks with [`TerminalEngine::process_output`]; get back commands,
//! their paginated output, directory changes, progress-row rewrites and
//! full-screen transitions as [`EngineEvent`]s.

pub mod blocks;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod probe;
pub mod pump;
pub mod session;
pub mod splitter;
pub mod state_machine;
pub mod term;

// Re-export the main struct so users can just use `ptyscribe_core::TerminalEngine`
pub use engine::TerminalEngine;

pub use blocks::{CommandId, CommandRecord};
pub use config::EngineConfig;
pub use error::{ConfigError, EngineError};
pub use events::{CommandExecutionEvent, EngineEvent, SessionDirectoryEvent};
pub use probe::{InputProbe, InputWait, ManualProbe, NeverWaiting};
pub use pump::pump_session;
pub use session::{SessionId, SessionProcessingState, TerminalSession};
pub use state_machine::InitState;
