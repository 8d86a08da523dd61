//! ptyscribe-pty: a real shell on a real PTY, wired for the engine.
//!
//! [`PtyManager`] spawns the shell with a tagged prompt, streams its bytes
//! and hands out a [`PtyInputProbe`] for the interactive-prompt check.

pub mod probe;
pub mod pty_manager;
pub mod util;

pub use probe::PtyInputProbe;
pub use pty_manager::{tagged_prompt, PtyManager};
