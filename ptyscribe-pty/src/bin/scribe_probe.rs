// ptyscribe-pty/src/bin/scribe_probe.rs

use anyhow::{Context, Result};
use clap::Parser;
use ptyscribe_core::{
    pump_session, EngineConfig, EngineError, EngineEvent, InputProbe, SessionId, TerminalEngine,
};
use ptyscribe_pty::util::{init_tracing, install_panic_hook};
use ptyscribe_pty::PtyManager;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Drive a real shell through the session output engine. Each stdin line is
/// dispatched as a command; every engine event is reported.
#[derive(Debug, Parser)]
#[command(name = "scribe_probe", version)]
struct Args {
    /// JSON engine config. Defaults apply to anything missing.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Program to run instead of $SHELL.
    #[arg(long)]
    shell: Option<String>,

    #[arg(long, default_value_t = 120)]
    cols: u16,

    #[arg(long, default_value_t = 30)]
    rows: u16,

    /// Print events as JSON lines on stdout.
    #[arg(long)]
    json: bool,

    /// More log detail from the engine (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    install_panic_hook();

    let config = match &args.config {
        Some(path) => EngineConfig::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let engine = Arc::new(TerminalEngine::new(config.clone()).context("engine setup failed")?);

    let mut pty = PtyManager::new(args.cols, args.rows, args.shell.as_deref(), &config)
        .context("PtyManager::new failed")?;
    let bytes_rx = pty
        .start_reader()
        .context("PtyManager::start_reader failed")?;

    let session_id = SessionId::random();
    let probe: Arc<dyn InputProbe> = Arc::new(pty.input_probe());
    engine.open_session(session_id.clone(), probe)?;

    let (events_tx, mut events_rx) = mpsc::channel(256);
    let pump = tokio::spawn(pump_session(
        Arc::clone(&engine),
        session_id.clone(),
        bytes_rx,
        events_tx,
    ));

    pty.bootstrap(&config).context("shell bootstrap failed")?;
    tracing::info!(session = %session_id, "waiting for the shell (Ctrl+C to exit)");

    let mut queue: VecDeque<String> = VecDeque::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, exiting");
                break;
            }

            ev = events_rx.recv() => {
                let Some(ev) = ev else {
                    tracing::info!("shell output ended");
                    break;
                };
                report(&ev, args.json).await?;

                // Ready or idle again: the next queued command may go.
                if matches!(ev, EngineEvent::RendererWrite { .. } | EngineEvent::CommandCompleted { .. }) {
                    dispatch_next(&engine, &session_id, &mut pty, &mut queue)?;
                }
            }

            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("stdin read failed")? else {
                    tracing::info!("stdin closed");
                    stdin_open = false;
                    continue;
                };

                if line.trim().eq_ignore_ascii_case("exit") && queue.is_empty() {
                    tracing::info!("exit requested");
                    break;
                }

                // A running program asked for input: answer it directly.
                let answering = engine
                    .inspect(&session_id, |s| s.is_interactive_mode() || s.is_fullscreen())
                    .unwrap_or(false);
                if answering {
                    pty.write_line(&line).context("PTY write_line failed")?;
                    continue;
                }

                queue.push_back(line);
                dispatch_next(&engine, &session_id, &mut pty, &mut queue)?;
            }
        }

        if !pty.child_is_alive() {
            tracing::info!("shell exited");
            break;
        }
    }

    engine.close_session(&session_id);
    pump.abort();
    Ok(())
}

/// Hand the oldest queued line to the shell if the session can take it.
fn dispatch_next(
    engine: &TerminalEngine,
    session_id: &SessionId,
    pty: &mut PtyManager,
    queue: &mut VecDeque<String>,
) -> Result<()> {
    let Some(command) = queue.front().cloned() else {
        return Ok(());
    };

    match engine.begin_command(session_id, command.as_str()) {
        Ok(command_id) => {
            queue.pop_front();
            tracing::debug!(%command_id, %command, "dispatching");
            pty.write_line(&command).context("PTY write_line failed")
        }
        Err(EngineError::CommandInFlight { .. }) | Err(EngineError::SessionNotReady(_)) => {
            tracing::debug!(queued = queue.len(), "session busy, command queued");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn report(ev: &EngineEvent, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(ev).context("event serialization failed")?;
        let mut out = tokio::io::stdout();
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        return Ok(());
    }

    match ev {
        EngineEvent::CommandOutput(e) if !e.is_completed => {
            tracing::debug!(command_id = %e.command_id, chunk = %e.output_chunk, "output");
        }
        EngineEvent::CommandOutput(_) => {}
        EngineEvent::CommandCompleted { record, .. } => {
            tracing::info!(
                command = %record.command,
                exit_code = ?record.exit_code,
                duration_ms = ?record.duration_ms,
                pages = record.output_pages.len(),
                "command completed"
            );
            let mut out = tokio::io::stdout();
            out.write_all(record.full_output().as_bytes()).await?;
            out.write_all(b"\n").await?;
            out.flush().await?;
        }
        EngineEvent::DirectoryChanged(e) => {
            tracing::info!(cwd = %e.current_directory, "directory changed");
        }
        EngineEvent::RendererWrite { data, .. } => {
            let mut out = tokio::io::stdout();
            out.write_all(data.as_bytes()).await?;
            out.flush().await?;
        }
        EngineEvent::FullscreenChanged { active, .. } => {
            tracing::info!(active, "full-screen mode");
        }
        EngineEvent::InteractivePrompt { prompt, .. } => {
            tracing::info!(%prompt, "program is waiting for input");
        }
    }
    Ok(())
}
