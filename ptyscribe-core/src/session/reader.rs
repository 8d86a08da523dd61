//! Read-state algorithm: raw chunk in, classified lines + events out.
//!
//! Order of business for every chunk:
//! 1. append + cap the raw buffer
//! 2. full-screen gate (alt-screen enter/exit)
//! 3. split complete lines, route bare `\r` to the progress handler
//! 4. decide about the unterminated tail (progress, prompt, interactive or wait)

use tracing::{debug, trace, warn};

use super::{SessionProcessingState, TerminalSession};
use crate::config::EngineConfig;
use crate::events::{CommandExecutionEvent, EngineEvent, SessionDirectoryEvent};
use crate::probe::is_waiting_for_input;
use crate::splitter::{enforce_cap, split_line, Terminator};
use crate::state_machine::InitState;
use crate::term::{
    find_alt_screen, incomplete_escape_start, looks_like_progress, strip_controls,
    AltScreenEdge, AltScreenMatch, PromptDetector, PromptMatch,
};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Borrowed engine context for one `ingest` call.
pub(crate) struct Reader<'a> {
    pub config: &'a EngineConfig,
    pub detector: &'a dyn PromptDetector,
    pub state: &'a mut SessionProcessingState,
    pub out: &'a mut Vec<EngineEvent>,
}

impl TerminalSession {
    pub(crate) fn ingest(&mut self, chunk: &str, rd: &mut Reader<'_>) {
        self.resume_tail_row(chunk);
        self.raw_buffer.push_str(chunk);
        let dropped = enforce_cap(&mut self.raw_buffer, rd.config.buffer_cap_bytes);
        if dropped > 0 {
            warn!(session = %self.id, dropped, "raw buffer over cap, oldest bytes dropped");
        }

        loop {
            if self.is_fullscreen {
                match find_alt_screen(&self.raw_buffer, AltScreenEdge::Exit) {
                    Some(m) => {
                        self.leave_fullscreen(m, rd);
                        continue;
                    }
                    None => {
                        self.trim_fullscreen_buffer();
                        return;
                    }
                }
            }

            if let Some(m) = find_alt_screen(&self.raw_buffer, AltScreenEdge::Enter) {
                let rest = self.raw_buffer.split_off(m.end);
                self.raw_buffer.truncate(m.start);
                self.drain_lines(rd, true);
                self.raw_buffer = rest;
                self.enter_fullscreen(m, rd);
                continue;
            }

            self.drain_lines(rd, false);
            return;
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Line splitting
    // ────────────────────────────────────────────────────────────────

    /// `flush_tail`: the buffer is a closed segment (text before an
    /// alt-screen switch), so a leftover partial line is final too.
    fn drain_lines(&mut self, rd: &mut Reader<'_>, flush_tail: bool) {
        while let Some(seg) = split_line(&mut self.raw_buffer) {
            match seg.terminator {
                Terminator::Cr => self.on_carriage_return(&seg.text, rd),
                Terminator::Lf | Terminator::CrLf => self.on_line(&seg.text, rd),
            }
        }

        if self.raw_buffer.is_empty() {
            return;
        }
        if flush_tail {
            let tail = std::mem::take(&mut self.raw_buffer);
            self.on_line(&tail, rd);
            return;
        }
        self.on_tail(rd);
    }

    /// No terminator yet. Prompts and spinners often never get one.
    fn on_tail(&mut self, rd: &mut Reader<'_>) {
        let cleaned = strip_controls(&self.raw_buffer);
        if cleaned.trim().is_empty() {
            return;
        }
        let prompt = rd.detector.detect(&cleaned);

        if !self.init_state.is_ready() {
            if self.init_state == InitState::AwaitingFirstPrompt {
                if let Some(m) = prompt {
                    self.consume_tail();
                    self.become_ready(m, rd);
                }
            }
            return;
        }

        let prompt = match prompt {
            Some(m) if m.tagged => {
                self.consume_tail();
                self.on_prompt(m, rd);
                return;
            }
            other => other,
        };

        let in_flight = self.current_executing_command.is_some()
            && !self.may_be_command_echo(&cleaned, rd.detector);

        if in_flight && looks_like_progress(&cleaned) {
            trace!(session = %self.id, tail = %cleaned, "progress tail");
            let raw = self.consume_tail();
            if !raw.ends_with('\r') {
                self.tail_row = Some(raw);
            }
            self.on_progress_row(&cleaned, rd);
            return;
        }

        if let Some(m) = prompt {
            self.consume_tail();
            self.on_prompt(m, rd);
            return;
        }

        if !in_flight {
            return;
        }

        // "text\r" with nothing after it yet: a progress update.
        if self.raw_buffer.ends_with('\r') {
            self.consume_tail();
            self.on_progress_row(&cleaned, rd);
            return;
        }

        if is_waiting_for_input(self.probe.as_ref()) {
            self.consume_tail();
            self.on_interactive_prompt(&cleaned, rd);
        }
    }

    /// Take the tail for classification. An escape sequence still open at
    /// its end stays buffered for the bytes that complete it.
    fn consume_tail(&mut self) -> String {
        let keep = incomplete_escape_start(&self.raw_buffer).unwrap_or(self.raw_buffer.len());
        let rest = self.raw_buffer.split_off(keep);
        std::mem::replace(&mut self.raw_buffer, rest)
    }

    /// Data that continues a tail already shown as a progress row puts the
    /// tail back in front, so the row is rebuilt from the whole line. A
    /// leading line break means the row as shown is final.
    fn resume_tail_row(&mut self, chunk: &str) {
        let Some(tail) = self.tail_row.take() else {
            return;
        };
        match self.raw_buffer.chars().chain(chunk.chars()).next() {
            None => self.tail_row = Some(tail),
            Some('\r' | '\n') => {}
            Some(_) => self.raw_buffer.insert_str(0, &tail),
        }
    }

    fn on_carriage_return(&mut self, raw: &str, rd: &mut Reader<'_>) {
        let cleaned = strip_controls(raw);
        if cleaned.trim().is_empty() || !self.init_state.is_ready() {
            return;
        }

        if let Some(m) = rd.detector.detect(&cleaned) {
            self.on_prompt(m, rd);
            return;
        }
        self.on_progress_row(&cleaned, rd);
    }

    fn on_line(&mut self, raw: &str, rd: &mut Reader<'_>) {
        let cleaned = strip_controls(raw);

        match self.init_state {
            InitState::Initializing | InitState::LoggedIn => {
                if let Some(next) = self.init_state.on_marker_line(&cleaned, rd.config) {
                    debug!(session = %self.id, from = ?self.init_state, to = ?next, "init marker");
                    self.init_state = next;
                } else {
                    trace!(session = %self.id, line = %cleaned, "discarding pre-login output");
                }
            }
            InitState::AwaitingFirstPrompt => {
                if let Some(m) = rd.detector.detect(&cleaned) {
                    self.become_ready(m, rd);
                }
            }
            InitState::Ready => self.on_ready_line(&cleaned, rd),
        }
    }

    fn on_ready_line(&mut self, cleaned: &str, rd: &mut Reader<'_>) {
        if let Some(m) = rd.detector.detect(cleaned) {
            self.on_prompt(m, rd);
            return;
        }

        if self.current_executing_command.is_none() {
            trace!(session = %self.id, line = %cleaned, "output with no command in flight");
            rd.state.just_handled_carriage_return = false;
            return;
        }

        if rd.state.just_handled_carriage_return {
            rd.state.just_handled_carriage_return = false;
            // "abc\r" then "\n": the row is already settled.
            if !cleaned.trim().is_empty() {
                self.replace_output_row(cleaned, rd);
            }
            return;
        }

        if self.answering_prompt {
            self.answering_prompt = false;
            self.on_prompt_answer(cleaned, rd);
            return;
        }

        if std::mem::take(&mut self.echo_pending) && self.is_command_echo(cleaned, rd.detector) {
            trace!(session = %self.id, "dropping command echo");
            return;
        }

        self.append_output(cleaned, rd);
    }

    // ────────────────────────────────────────────────────────────────
    // Classification outcomes
    // ────────────────────────────────────────────────────────────────

    fn become_ready(&mut self, m: PromptMatch, rd: &mut Reader<'_>) {
        let Some(next) = self.init_state.on_prompt() else {
            return;
        };
        debug!(session = %self.id, "first prompt seen, session ready");
        self.init_state = next;

        rd.out.push(EngineEvent::RendererWrite {
            session_id: self.id.clone(),
            data: format!("{CLEAR_SCREEN}{}", rd.config.welcome_banner),
        });
        self.record_directory(m.directory, rd);
    }

    fn on_prompt(&mut self, m: PromptMatch, rd: &mut Reader<'_>) {
        trace!(session = %self.id, ?m, "prompt");
        let PromptMatch {
            directory,
            exit_code,
            preceding,
            ..
        } = m;

        self.record_directory(directory, rd);

        if self.current_executing_command.is_some() {
            let preceding = preceding.trim_end();
            if !preceding.trim().is_empty() {
                if rd.state.just_handled_carriage_return {
                    self.replace_output_row(preceding, rd);
                } else {
                    self.append_output(preceding, rd);
                }
            }
            self.finalize_command(exit_code, rd);
        }

        rd.state.just_handled_carriage_return = false;
    }

    fn on_progress_row(&mut self, cleaned: &str, rd: &mut Reader<'_>) {
        if self.current_executing_command.is_none() {
            return;
        }

        if rd.state.just_handled_carriage_return {
            self.replace_output_row(cleaned, rd);
        } else {
            // First update of a new row opens it below the existing output.
            self.append_output(cleaned, rd);
        }
        rd.state.just_handled_carriage_return = true;
    }

    fn on_interactive_prompt(&mut self, cleaned: &str, rd: &mut Reader<'_>) {
        let Some(command_id) = self.current_executing_command.as_ref().map(|c| c.id) else {
            return;
        };
        let prompt = cleaned.trim_end().to_string();
        debug!(session = %self.id, %prompt, "program waiting for input");

        self.is_interactive_mode = true;
        self.answering_prompt = true;
        self.interactive_prompt = Some(prompt.clone());
        rd.state.just_handled_carriage_return = false;

        rd.out.push(EngineEvent::InteractivePrompt {
            session_id: self.id.clone(),
            command_id,
            prompt: prompt.clone(),
        });
        self.append_output(&prompt, rd);
    }

    /// Typed answers are echoed onto the prompt row; hidden ones (passwords)
    /// leave it as is.
    fn on_prompt_answer(&mut self, cleaned: &str, rd: &mut Reader<'_>) {
        let answer = cleaned.trim();
        if answer.is_empty() {
            return;
        }
        let row = match self.interactive_prompt.as_deref() {
            Some(prompt) => format!("{prompt} {answer}"),
            None => answer.to_string(),
        };
        self.replace_output_row(&row, rd);
    }

    fn record_directory(&mut self, directory: Option<String>, rd: &mut Reader<'_>) {
        let Some(dir) = directory else {
            return;
        };
        if dir != self.current_directory {
            debug!(session = %self.id, cwd = %dir, "directory changed");
        }
        self.current_directory = dir.clone();
        rd.out.push(EngineEvent::DirectoryChanged(SessionDirectoryEvent {
            session_id: self.id.clone(),
            current_directory: dir,
        }));
    }

    /// A tail that could still grow into the echo line.
    fn may_be_command_echo(&self, cleaned: &str, detector: &dyn PromptDetector) -> bool {
        if !self.echo_pending {
            return false;
        }
        let Some(cmd) = self.current_executing_command.as_ref() else {
            return false;
        };

        let command = cmd.command.trim();
        let line = cleaned.trim();
        if command.starts_with(line) {
            return true;
        }
        line.char_indices().any(|(i, _)| {
            let typed = line[i..].trim_start();
            !typed.is_empty() && command.starts_with(typed) && detector.detect(&line[..i]).is_some()
        })
    }

    /// The shell echoes the typed command back as the first output line,
    /// sometimes still glued to the prompt it was typed at.
    fn is_command_echo(&self, cleaned: &str, detector: &dyn PromptDetector) -> bool {
        let Some(cmd) = self.current_executing_command.as_ref() else {
            return false;
        };
        if self.current_command_output.line_count() > 0 || !cmd.output_pages.is_empty() {
            return false;
        }

        let line = cleaned.trim();
        let command = cmd.command.trim();
        if line == command {
            return true;
        }
        match line.strip_suffix(command) {
            Some(prefix) if !command.is_empty() => detector.detect(prefix).is_some(),
            _ => false,
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Accumulator
    // ────────────────────────────────────────────────────────────────

    fn append_output(&mut self, line: &str, rd: &mut Reader<'_>) {
        let Some(record) = self.current_executing_command.as_mut() else {
            return;
        };
        let chunk = match self
            .current_command_output
            .push_line(line, rd.config.page_line_threshold)
        {
            Some(page) => {
                trace!(session = %self.id, pages = record.output_pages.len() + 1, "output page archived");
                record.archive_page(page.clone(), rd.config.max_output_pages);
                page
            }
            None => self.current_command_output.as_str().to_string(),
        };
        let command_id = record.id;
        self.emit_output(command_id, chunk, false, rd);
    }

    fn replace_output_row(&mut self, line: &str, rd: &mut Reader<'_>) {
        let Some(record) = self.current_executing_command.as_mut() else {
            return;
        };
        // An empty live page means the row was the last line of a page
        // that has just been archived.
        let archived = if self.current_command_output.is_empty() {
            record.replace_last_archived_line(line)
        } else {
            None
        };
        let chunk = match archived {
            Some(page) => page,
            None => match self
                .current_command_output
                .replace_last_line(line, rd.config.page_line_threshold)
            {
                Some(page) => {
                    record.archive_page(page.clone(), rd.config.max_output_pages);
                    page
                }
                None => self.current_command_output.as_str().to_string(),
            },
        };
        let command_id = record.id;
        self.emit_output(command_id, chunk, false, rd);
    }

    fn emit_output(
        &self,
        command_id: crate::blocks::CommandId,
        output_chunk: String,
        is_completed: bool,
        rd: &mut Reader<'_>,
    ) {
        rd.out.push(EngineEvent::CommandOutput(CommandExecutionEvent {
            command_id,
            session_id: self.id.clone(),
            output_chunk,
            is_completed,
        }));
    }

    fn finalize_command(&mut self, exit_code: Option<i32>, rd: &mut Reader<'_>) {
        let Some(mut record) = self.current_executing_command.take() else {
            return;
        };

        self.is_interactive_mode = false;
        self.answering_prompt = false;
        self.echo_pending = false;
        self.tail_row = None;
        self.interactive_prompt = None;
        rd.state.just_handled_carriage_return = false;

        let output = self.current_command_output.take().trim().to_string();
        record.complete(output.clone(), exit_code);
        debug!(
            session = %self.id,
            command = %record.command,
            exit = ?record.exit_code,
            pages = record.output_pages.len(),
            "command finished"
        );

        self.emit_output(record.id, output, true, rd);
        rd.out.push(EngineEvent::CommandCompleted {
            session_id: self.id.clone(),
            record,
        });
    }

    // ────────────────────────────────────────────────────────────────
    // Full-screen
    // ────────────────────────────────────────────────────────────────

    fn enter_fullscreen(&mut self, m: AltScreenMatch, rd: &mut Reader<'_>) {
        debug!(session = %self.id, mode = m.mode, "entering full-screen");
        self.is_fullscreen = true;
        rd.state.just_handled_carriage_return = false;
        rd.out.push(EngineEvent::FullscreenChanged {
            session_id: self.id.clone(),
            active: true,
        });
    }

    fn leave_fullscreen(&mut self, m: AltScreenMatch, rd: &mut Reader<'_>) {
        debug!(session = %self.id, mode = m.mode, "leaving full-screen");
        let before = &self.raw_buffer[..m.start];
        let trailing = before
            .rfind(['\r', '\n'])
            .map(|i| &before[i + 1..])
            .unwrap_or(before);
        let trailing = strip_controls(trailing);
        self.raw_buffer.drain(..m.end);

        self.is_fullscreen = false;
        rd.out.push(EngineEvent::FullscreenChanged {
            session_id: self.id.clone(),
            active: false,
        });

        if self.init_state.is_ready() && !trailing.trim().is_empty() {
            self.append_output(trailing.trim_end(), rd);
        }
        // The prompt that follows may not be recognisable after a full-screen app.
        self.finalize_command(None, rd);
    }

    /// While full-screen only the partial last row can matter (an exit
    /// sequence never spans a line break).
    fn trim_fullscreen_buffer(&mut self) {
        if let Some(i) = self.raw_buffer.rfind(['\r', '\n']) {
            self.raw_buffer.drain(..=i);
        }
    }
}
