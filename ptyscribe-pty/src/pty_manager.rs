use anyhow::{Context, Result};
use portable_pty::{Child, CommandBuilder, MasterPty, NativePtySystem, PtySize, PtySystem};
use ptyscribe_core::EngineConfig;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::probe::PtyInputProbe;

pub(crate) type SharedMaster = Arc<Mutex<Box<dyn MasterPty + Send>>>;

pub struct PtyManager {
    master: SharedMaster,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send>,
    shell_pid: Option<u32>,
}

impl std::fmt::Debug for PtyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyManager")
            .field("master", &"Box<dyn MasterPty + Send>")
            .field("writer", &"Box<dyn Write + Send>")
            .field("child", &"Box<dyn Child + Send>")
            .field("shell_pid", &self.shell_pid)
            .finish()
    }
}

impl PtyManager {
    /// Spawn `shell` (or the user's default shell) on a fresh PTY with a
    /// prompt that carries the engine's cwd/exit tags.
    pub fn new(cols: u16, rows: u16, shell: Option<&str>, config: &EngineConfig) -> Result<Self> {
        let pty_system = NativePtySystem::default();
        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system.openpty(size).context("Failed to open PTY")?;

        let mut cmd = shell_command(shell);
        cmd.env("PS1", tagged_prompt(config));
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .context("Failed to spawn shell process")?;
        // Only the child keeps the slave side open, so EOF reaches the reader.
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .context("Failed to take PTY writer")?;

        let shell_pid = child.process_id();
        tracing::info!(?shell_pid, "shell spawned");

        Ok(Self {
            master: Arc::new(Mutex::new(pair.master)),
            writer,
            child,
            shell_pid,
        })
    }

    pub fn shell_pid(&self) -> Option<u32> {
        self.shell_pid
    }

    /// The waiting-for-input query the engine consults for this PTY.
    pub fn input_probe(&self) -> PtyInputProbe {
        PtyInputProbe::new(Arc::clone(&self.master), self.shell_pid)
    }

    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        let master = self
            .master
            .lock()
            .map_err(|_| anyhow::anyhow!("PTY master lock poisoned"))?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to resize PTY")
    }

    /// Raw write (no newline).
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.writer
            .write_all(data)
            .context("Failed to write to PTY")?;
        self.writer.flush().context("Failed to flush PTY writer")
    }

    /// Write a line and press Enter.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        // Prevent double-newlines if callers already include CR/LF.
        let s = line.trim_end_matches(&['\r', '\n'][..]);
        self.write_raw(s.as_bytes())?;
        self.write_raw(b"\r")
    }

    /// Re-assert the tagged prompt (rc files tend to overwrite `PS1`), then
    /// make the shell print the login and ready markers so the engine's init
    /// gate opens. Markers are printed in two halves so the echoed command
    /// line never contains the marker itself.
    pub fn bootstrap(&mut self, config: &EngineConfig) -> Result<()> {
        self.write_line(&prompt_assignment(config))?;
        if !config.gate_on_markers {
            return Ok(());
        }
        for marker in [&config.login_marker, &config.ready_marker] {
            self.write_line(&split_printf(marker))?;
        }
        Ok(())
    }

    pub fn child_is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) => false,
            Err(_) => true,
        }
    }

    pub fn start_reader(&mut self) -> Result<mpsc::Receiver<Vec<u8>>> {
        let mut reader = self
            .master
            .lock()
            .map_err(|_| anyhow::anyhow!("PTY master lock poisoned"))?
            .try_clone_reader()
            .context("Failed to clone PTY reader")?;

        let (tx, rx) = mpsc::channel(256);

        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        // Blocks while the engine side is backed up.
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!("PTY read ended: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }
}

fn shell_command(shell: Option<&str>) -> CommandBuilder {
    let shell = shell
        .map(str::to_string)
        .or_else(|| std::env::var("SHELL").ok())
        .unwrap_or_else(|| "/bin/bash".to_string());
    CommandBuilder::new(shell)
}

/// `PS1` that the tagged prompt detector understands. `$PWD` and `$?` are
/// expanded by the shell each time the prompt is drawn.
pub fn tagged_prompt(config: &EngineConfig) -> String {
    format!(
        "{}$PWD{}{}$?{}$ ",
        config.cwd_open_tag, config.cwd_close_tag, config.exit_open_tag, config.exit_close_tag
    )
}

/// `PS1='<first half>''<second half>'`, so the echoed line never matches a prompt.
fn prompt_assignment(config: &EngineConfig) -> String {
    let prompt = tagged_prompt(config);
    let (a, b) = split_half(&prompt);
    format!("PS1='{}''{}'", shell_quote(a), shell_quote(b))
}

fn split_printf(marker: &str) -> String {
    let (a, b) = split_half(marker);
    format!("printf '%s%s\\n' '{}' '{}'", shell_quote(a), shell_quote(b))
}

fn split_half(s: &str) -> (&str, &str) {
    let mid = s
        .char_indices()
        .map(|(i, _)| i)
        .nth(s.chars().count() / 2)
        .unwrap_or(0);
    s.split_at(mid)
}

/// Escape for use inside single quotes.
fn shell_quote(s: &str) -> String {
    s.replace('\'', r#"'"'"'"#)
}
