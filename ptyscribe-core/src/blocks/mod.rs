//! Command records + the live output page.
//!
//! A command is an atomic terminal interaction:
//! - the text dispatched to the shell
//! - its output, paginated
//! - exit code (when the prompt reports one)
//! - cwd + timing

pub mod accumulator;
pub mod model;

pub use accumulator::OutputAccumulator;
pub use model::{CommandId, CommandRecord};
