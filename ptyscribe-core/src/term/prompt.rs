//! Shell prompt classification.
//!
//! Two shapes, tried in order:
//! 1. Tagged: `<pre><cwd>/path</cwd>[<rc>N</rc>]$` (tags configurable). Wins
//!    whenever it matches; the heuristic is not consulted.
//! 2. Heuristic: trimmed line ends with `$` or `#`. A `user@host:path$` shape
//!    additionally yields the directory.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::EngineConfig;
use crate::error::ConfigError;

/// What a prompt line told us.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptMatch {
    pub directory: Option<String>,
    pub exit_code: Option<i32>,
    /// Output that shared the line with the prompt (no trailing newline).
    pub preceding: String,
    pub tagged: bool,
}

/// Decides whether a control-stripped line is a shell prompt.
pub trait PromptDetector: Send + Sync {
    fn detect(&self, line: &str) -> Option<PromptMatch>;
}

#[derive(Debug, Clone)]
pub struct MarkerPromptDetector {
    tagged: Regex,
    heuristic: bool,
}

impl MarkerPromptDetector {
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        let pattern = format!(
            r"^(?P<pre>.*?){open}(?P<dir>.*?){close}\s*(?:{eopen}\s*(?P<rc>-?\d+)\s*{eclose})?\s*[#$]\s*$",
            open = regex::escape(&config.cwd_open_tag),
            close = regex::escape(&config.cwd_close_tag),
            eopen = regex::escape(&config.exit_open_tag),
            eclose = regex::escape(&config.exit_close_tag),
        );

        Ok(Self {
            tagged: Regex::new(&pattern)?,
            heuristic: config.heuristic_prompts,
        })
    }

    pub fn detect_tagged(&self, line: &str) -> Option<PromptMatch> {
        let caps = self.tagged.captures(line.trim_end())?;
        let directory = caps
            .name("dir")
            .map(|m| m.as_str().trim().to_string())
            .filter(|d| !d.is_empty());

        Some(PromptMatch {
            directory,
            exit_code: caps.name("rc").and_then(|m| m.as_str().parse().ok()),
            preceding: caps
                .name("pre")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            tagged: true,
        })
    }

    pub fn detect_heuristic(&self, line: &str) -> Option<PromptMatch> {
        let trimmed = line.trim();
        if !(trimmed.ends_with('$') || trimmed.ends_with('#')) {
            return None;
        }

        let directory = user_host_re()
            .captures(trimmed)
            .and_then(|c| c.name("dir"))
            .map(|m| m.as_str().trim().to_string())
            .filter(|d| !d.is_empty());

        Some(PromptMatch {
            directory,
            ..PromptMatch::default()
        })
    }
}

impl PromptDetector for MarkerPromptDetector {
    fn detect(&self, line: &str) -> Option<PromptMatch> {
        if let Some(m) = self.detect_tagged(line) {
            return Some(m);
        }
        if self.heuristic {
            return self.detect_heuristic(line);
        }
        None
    }
}

static USER_HOST_REGEX: OnceLock<Regex> = OnceLock::new();

fn user_host_re() -> &'static Regex {
    USER_HOST_REGEX.get_or_init(|| {
        Regex::new(r"^(?:\([^)]*\)\s*)?[A-Za-z0-9._-]+@[A-Za-z0-9._-]+:(?P<dir>[^$#]*?)\s*[#$]$")
            .expect("Invalid user@host Regex")
    })
}
