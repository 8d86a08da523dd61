//! Text-level helpers that sit *next to* the line splitter.
//!
//! - `ansi`: control-sequence stripping for classification
//! - `modes`: alternate-screen enter/exit detection
//! - `prompt`: shell prompt classification
//! - `progress`: progress-row shapes for unterminated tails

pub mod ansi;
pub mod modes;
pub mod progress;
pub mod prompt;

pub use ansi::{incomplete_escape_start, strip_controls};
pub use modes::{find_alt_screen, AltScreenEdge, AltScreenMatch};
pub use progress::looks_like_progress;
pub use prompt::{MarkerPromptDetector, PromptDetector, PromptMatch};
