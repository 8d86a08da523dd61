use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

pub type CommandId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: CommandId,
    pub command: String,
    /// The visible page. Final once `is_executing` is false.
    pub output: String,
    /// Archived pages, oldest first.
    pub output_pages: VecDeque<String>,
    /// Pages dropped from the front of `output_pages` by the cap.
    pub evicted_pages: usize,
    pub is_executing: bool,
    pub exit_code: Option<i32>,
    pub cwd: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl CommandRecord {
    pub fn new_now(command: impl Into<String>, cwd: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            command: command.into(),
            output: String::new(),
            output_pages: VecDeque::new(),
            evicted_pages: 0,
            is_executing: true,
            exit_code: None,
            cwd,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
        }
    }

    /// Archive a full page, evicting the oldest one past `max_pages`.
    pub fn archive_page(&mut self, page: String, max_pages: usize) {
        self.output_pages.push_back(page);
        while self.output_pages.len() > max_pages {
            self.output_pages.pop_front();
            self.evicted_pages += 1;
        }
    }

    /// Overwrite the last line of the newest archived page and return that
    /// page. A progress row can roll into the archive with the page it filled.
    pub(crate) fn replace_last_archived_line(&mut self, line: &str) -> Option<String> {
        let page = self.output_pages.back_mut()?;
        let keep = page.rfind('\n').map(|i| i + 1).unwrap_or(0);
        page.truncate(keep);
        page.push_str(line);
        Some(page.clone())
    }

    pub(crate) fn complete(&mut self, output: String, exit_code: Option<i32>) {
        let end = Utc::now();
        self.output = output;
        self.exit_code = exit_code;
        self.is_executing = false;
        self.ended_at = Some(end);
        self.duration_ms = Some((end - self.started_at).num_milliseconds());
    }

    /// Every retained line: archived pages then the visible page.
    pub fn full_output(&self) -> String {
        self.output_pages
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.output.as_str()))
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
