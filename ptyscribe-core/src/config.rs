//! Engine configuration.
//!
//! Everything has a default, so an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

pub const DEFAULT_BUFFER_CAP_BYTES: usize = 256 * 1024;
pub const DEFAULT_PAGE_LINE_THRESHOLD: usize = 10;
pub const DEFAULT_MAX_OUTPUT_PAGES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard cap on unresolved stream data per session. Oldest data goes first.
    pub buffer_cap_bytes: usize,
    /// Lines per output page before the page is archived.
    pub page_line_threshold: usize,
    /// Archived pages kept per command.
    pub max_output_pages: usize,

    /// Text that moves a session out of `Initializing` when a line contains it.
    pub login_marker: String,
    /// Text that moves a session out of `LoggedIn` when a line contains it.
    pub ready_marker: String,
    /// When false, sessions start at `AwaitingFirstPrompt`.
    pub gate_on_markers: bool,

    pub cwd_open_tag: String,
    pub cwd_close_tag: String,
    pub exit_open_tag: String,
    pub exit_close_tag: String,
    /// Accept untagged prompts ending in `$` / `#`.
    pub heuristic_prompts: bool,

    /// Written to the renderer after the screen clear once the shell is ready.
    pub welcome_banner: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_cap_bytes: DEFAULT_BUFFER_CAP_BYTES,
            page_line_threshold: DEFAULT_PAGE_LINE_THRESHOLD,
            max_output_pages: DEFAULT_MAX_OUTPUT_PAGES,
            login_marker: "__PTYSCRIBE_LOGIN__".to_string(),
            ready_marker: "__PTYSCRIBE_READY__".to_string(),
            gate_on_markers: true,
            cwd_open_tag: "<cwd>".to_string(),
            cwd_close_tag: "</cwd>".to_string(),
            exit_open_tag: "<rc>".to_string(),
            exit_close_tag: "</rc>".to_string(),
            heuristic_prompts: true,
            welcome_banner: "ptyscribe: session ready\r\n".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_cap_bytes == 0 {
            return Err(ConfigError::Invalid("buffer_cap_bytes must be > 0".into()));
        }
        if self.page_line_threshold == 0 {
            return Err(ConfigError::Invalid(
                "page_line_threshold must be > 0".into(),
            ));
        }
        if self.max_output_pages == 0 {
            return Err(ConfigError::Invalid("max_output_pages must be > 0".into()));
        }

        let tags = [
            ("cwd_open_tag", &self.cwd_open_tag),
            ("cwd_close_tag", &self.cwd_close_tag),
            ("exit_open_tag", &self.exit_open_tag),
            ("exit_close_tag", &self.exit_close_tag),
        ];
        for (name, tag) in tags {
            if tag.is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }
        if self.cwd_open_tag == self.cwd_close_tag {
            return Err(ConfigError::Invalid(
                "cwd_open_tag and cwd_close_tag must differ".into(),
            ));
        }

        if self.gate_on_markers
            && (self.login_marker.trim().is_empty() || self.ready_marker.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "login_marker and ready_marker are required when gate_on_markers is set".into(),
            ));
        }

        Ok(())
    }
}
