//! Session init gate.
//!
//! Shells print an unpredictable amount of banner/login text before they are
//! interactive. Lines are only treated as command output once the session
//! has walked, strictly forward:
//!
//! `Initializing --login marker--> LoggedIn --ready marker--> AwaitingFirstPrompt --prompt--> Ready`

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitState {
    #[default]
    Initializing,
    LoggedIn,
    AwaitingFirstPrompt,
    Ready,
}

impl InitState {
    pub fn initial(config: &EngineConfig) -> Self {
        if config.gate_on_markers {
            InitState::Initializing
        } else {
            InitState::AwaitingFirstPrompt
        }
    }

    pub fn is_ready(self) -> bool {
        self == InitState::Ready
    }

    /// Next state for a terminated, control-stripped line, if it is the
    /// marker this state is waiting for.
    pub fn on_marker_line(self, cleaned: &str, config: &EngineConfig) -> Option<InitState> {
        let line = cleaned.trim();
        match self {
            InitState::Initializing if matches_marker(line, &config.login_marker) => {
                Some(InitState::LoggedIn)
            }
            InitState::LoggedIn if matches_marker(line, &config.ready_marker) => {
                Some(InitState::AwaitingFirstPrompt)
            }
            _ => None,
        }
    }

    /// The first prompt completes the gate.
    pub fn on_prompt(self) -> Option<InitState> {
        match self {
            InitState::AwaitingFirstPrompt => Some(InitState::Ready),
            _ => None,
        }
    }
}

fn matches_marker(line: &str, marker: &str) -> bool {
    let marker = marker.trim();
    !marker.is_empty() && line.contains(marker)
}
