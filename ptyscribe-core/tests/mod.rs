use proptest::prelude::*;
use ptyscribe_core::{
    pump_session, CommandExecutionEvent, CommandRecord, EngineConfig, EngineError, EngineEvent,
    InitState, ManualProbe, NeverWaiting, SessionId, TerminalEngine,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

fn prompt(dir: &str, rc: i32) -> String {
    format!("<cwd>{dir}</cwd><rc>{rc}</rc>$ ")
}

fn ungated() -> EngineConfig {
    EngineConfig {
        gate_on_markers: false,
        ..EngineConfig::default()
    }
}

/// Open `id` and walk it to `Ready` with a first prompt in `/home/dev`.
fn open_ready(engine: &TerminalEngine, id: &str) -> SessionId {
    let id = SessionId::new(id);
    engine
        .open_session(id.clone(), Arc::new(NeverWaiting))
        .unwrap();
    engine.process_output(&id, &prompt("/home/dev", 0)).unwrap();
    id
}

fn ready_engine() -> (TerminalEngine, SessionId) {
    let engine = TerminalEngine::new(ungated()).unwrap();
    let id = open_ready(&engine, "s1");
    (engine, id)
}

fn feed(engine: &TerminalEngine, id: &SessionId, chunks: &[&str]) -> Vec<EngineEvent> {
    chunks
        .iter()
        .flat_map(|c| engine.process_output(id, c).unwrap())
        .collect()
}

fn completed(events: &[EngineEvent]) -> Vec<CommandRecord> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::CommandCompleted { record, .. } => Some(record.clone()),
            _ => None,
        })
        .collect()
}

fn outputs(events: &[EngineEvent]) -> Vec<CommandExecutionEvent> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::CommandOutput(o) => Some(o.clone()),
            _ => None,
        })
        .collect()
}

/// Run one command through the engine and return its finished record.
fn run(engine: &TerminalEngine, id: &SessionId, command: &str, chunks: &[&str]) -> CommandRecord {
    engine.begin_command(id, command).unwrap();
    let events = feed(engine, id, chunks);
    let mut done = completed(&events);
    assert_eq!(done.len(), 1, "expected exactly one completion");
    done.remove(0)
}

// ============================================================================
// Init Gate Tests
// ============================================================================

#[test]
fn test_markers_gate_session_until_first_prompt() {
    let engine = TerminalEngine::new(EngineConfig::default()).unwrap();
    let id = SessionId::new("gated");
    engine
        .open_session(id.clone(), Arc::new(NeverWaiting))
        .unwrap();
    let state = || engine.inspect(&id, |s| s.init_state()).unwrap();

    let events = feed(&engine, &id, &["Welcome to box\r\nLast login: today\r\n"]);
    assert!(events.is_empty());
    assert_eq!(state(), InitState::Initializing);

    feed(&engine, &id, &["__PTYSCRIBE_LOGIN__\r\n"]);
    assert_eq!(state(), InitState::LoggedIn);

    feed(&engine, &id, &["motd line\r\n__PTYSCRIBE_READY__\r\n"]);
    assert_eq!(state(), InitState::AwaitingFirstPrompt);

    let events = feed(&engine, &id, &[&prompt("/home/dev", 0)]);
    assert_eq!(state(), InitState::Ready);
    match &events[0] {
        EngineEvent::RendererWrite { data, .. } => {
            assert!(data.starts_with("\x1b[2J\x1b[H"));
            assert!(data.ends_with(&engine.config().welcome_banner));
        }
        other => panic!("Expected RendererWrite, got {other:?}"),
    }
    assert!(matches!(
        &events[1],
        EngineEvent::DirectoryChanged(d) if d.current_directory == "/home/dev"
    ));
}

#[test]
fn test_markers_only_count_in_order() {
    let engine = TerminalEngine::new(EngineConfig::default()).unwrap();
    let id = SessionId::new("gated");
    engine
        .open_session(id.clone(), Arc::new(NeverWaiting))
        .unwrap();

    feed(&engine, &id, &["__PTYSCRIBE_READY__\r\n", &prompt("/x", 0)]);
    assert_eq!(
        engine.inspect(&id, |s| s.init_state()),
        Some(InitState::Initializing)
    );
}

#[test]
fn test_echoed_bootstrap_line_does_not_open_gate() {
    let engine = TerminalEngine::new(EngineConfig::default()).unwrap();
    let id = SessionId::new("gated");
    engine
        .open_session(id.clone(), Arc::new(NeverWaiting))
        .unwrap();

    feed(&engine, &id, &["$ printf '%s%s\\n' '__PTYSCRI' 'BE_LOGIN__'\r\n"]);
    assert_eq!(
        engine.inspect(&id, |s| s.init_state()),
        Some(InitState::Initializing)
    );

    // Output glued to an unterminated prompt still counts.
    feed(&engine, &id, &["$ __PTYSCRIBE_LOGIN__\r\n"]);
    assert_eq!(
        engine.inspect(&id, |s| s.init_state()),
        Some(InitState::LoggedIn)
    );
}

#[test]
fn test_begin_command_before_ready_is_rejected() {
    let engine = TerminalEngine::new(EngineConfig::default()).unwrap();
    let id = SessionId::new("gated");
    engine
        .open_session(id.clone(), Arc::new(NeverWaiting))
        .unwrap();

    let err = engine.begin_command(&id, "ls").unwrap_err();
    assert!(matches!(err, EngineError::SessionNotReady(_)));
}

#[test]
fn test_ungated_session_waits_only_for_prompt() {
    let engine = TerminalEngine::new(ungated()).unwrap();
    let id = SessionId::new("s");
    engine
        .open_session(id.clone(), Arc::new(NeverWaiting))
        .unwrap();
    assert_eq!(
        engine.inspect(&id, |s| s.init_state()),
        Some(InitState::AwaitingFirstPrompt)
    );

    let events = feed(&engine, &id, &["banner text\r\n", "dev@box:~$ "]);
    assert!(matches!(events[0], EngineEvent::RendererWrite { .. }));
    assert_eq!(
        engine.inspect(&id, |s| s.init_state()),
        Some(InitState::Ready)
    );
}

// ============================================================================
// Command Lifecycle Tests
// ============================================================================

#[test]
fn test_command_output_and_completion() {
    let calls = Arc::new(AtomicUsize::new(0));
    let hook_calls = Arc::clone(&calls);
    let engine = TerminalEngine::new(ungated())
        .unwrap()
        .with_completion_hook(move |_| {
            hook_calls.fetch_add(1, Ordering::SeqCst);
        });
    let id = open_ready(&engine, "s1");

    let command_id = engine.begin_command(&id, "ls").unwrap();
    let events = feed(
        &engine,
        &id,
        &["ls\r\nfile1\r\nfile2\r\n", &prompt("/home/dev", 0)],
    );

    let out = outputs(&events);
    assert_eq!(out[0].output_chunk, "file1");
    assert_eq!(out[1].output_chunk, "file1\nfile2");
    assert!(!out[1].is_completed);
    let last = out.last().unwrap();
    assert!(last.is_completed);
    assert_eq!(last.command_id, command_id);
    assert_eq!(last.output_chunk, "file1\nfile2");

    let done = completed(&events);
    assert_eq!(done.len(), 1);
    let record = &done[0];
    assert_eq!(record.id, command_id);
    assert_eq!(record.command, "ls");
    assert_eq!(record.output, "file1\nfile2");
    assert_eq!(record.exit_code, Some(0));
    assert_eq!(record.cwd.as_deref(), Some("/home/dev"));
    assert!(!record.is_executing);
    assert!(record.ended_at.is_some());
    assert!(record.duration_ms.is_some());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    engine
        .inspect(&id, |s| {
            assert!(s.current_command().is_none());
            assert!(s.current_command_output().is_empty());
            assert_eq!(s.current_output_line_count(), 0);
        })
        .unwrap();
}

#[test]
fn test_repeated_prompts_complete_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let hook_calls = Arc::clone(&calls);
    let engine = TerminalEngine::new(ungated())
        .unwrap()
        .with_completion_hook(move |_| {
            hook_calls.fetch_add(1, Ordering::SeqCst);
        });
    let id = open_ready(&engine, "s1");

    engine.begin_command(&id, "true").unwrap();
    let p = prompt("/home/dev", 0);
    let events = feed(&engine, &id, &["true\r\n", &p, "\r\n", &p, "\r\n", &p]);

    assert_eq!(completed(&events).len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_next_command_after_completion() {
    let (engine, id) = ready_engine();
    let p = prompt("/home/dev", 0);

    let first = run(&engine, &id, "echo a", &["echo a\r\na\r\n", &p]);
    let second = run(&engine, &id, "echo b", &["echo b\r\nb\r\n", &p]);

    assert_eq!(first.output, "a");
    assert_eq!(second.output, "b");
    assert_ne!(first.id, second.id);
}

#[test]
fn test_crlf_and_lf_give_same_record() {
    let (engine, id) = ready_engine();
    let p = prompt("/home/dev", 0);

    let lf = run(&engine, &id, "cat f", &["cat f\nalpha\nbeta\n", &p]);
    let crlf = run(&engine, &id, "cat f", &["cat f\r\nalpha\r\nbeta\r\n", &p]);

    assert_eq!(lf.output, "alpha\nbeta");
    assert_eq!(lf.output, crlf.output);
}

#[test]
fn test_exit_code_from_tagged_prompt() {
    let (engine, id) = ready_engine();
    let record = run(&engine, &id, "false", &["false\r\n", &prompt("/home/dev", 1)]);
    assert_eq!(record.exit_code, Some(1));
    assert_eq!(record.output, "");
}

#[test]
fn test_heuristic_prompt_completes_without_exit_code() {
    let (engine, id) = ready_engine();
    engine.begin_command(&id, "make").unwrap();
    let events = feed(&engine, &id, &["make\r\nok\r\ndev@box:~/src$ "]);

    let done = completed(&events);
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].exit_code, None);
    assert_eq!(done[0].output, "ok");
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::DirectoryChanged(d) if d.current_directory == "~/src"
    )));
}

#[test]
fn test_prompt_glued_to_last_output_line() {
    let (engine, id) = ready_engine();
    let record = run(
        &engine,
        &id,
        "printf abc",
        &["printf abc\r\nabc", &prompt("/home/dev", 0)],
    );
    assert_eq!(record.output, "abc");
}

#[test]
fn test_output_without_command_is_dropped() {
    let (engine, id) = ready_engine();
    let events = feed(&engine, &id, &["background job done\r\n"]);
    assert!(events.is_empty());
}

// ============================================================================
// Echo Tests
// ============================================================================

#[test]
fn test_command_echo_is_dropped_once() {
    let (engine, id) = ready_engine();
    let record = run(&engine, &id, "x", &["x\r\nx\r\n", &prompt("/home/dev", 0)]);
    assert_eq!(record.output, "x");
}

#[test]
fn test_echo_glued_to_prompt_is_dropped() {
    let (engine, id) = ready_engine();
    let p = prompt("/home/dev", 0);
    let echo = format!("{p}echo hi\r\nhi\r\n");
    let record = run(&engine, &id, "echo hi", &[&echo, &p]);
    assert_eq!(record.output, "hi");
}

#[test]
fn test_echo_split_before_line_feed() {
    let (engine, id) = ready_engine();
    let record = run(
        &engine,
        &id,
        "ls",
        &["ls\r", "\nabc\r", "\n", &prompt("/home/dev", 0)],
    );
    assert_eq!(record.output, "abc");
}

// ============================================================================
// Progress Row Tests
// ============================================================================

#[test]
fn test_progress_rows_collapse_to_last_update() {
    let (engine, id) = ready_engine();
    let record = run(
        &engine,
        &id,
        "make",
        &[
            "make\r\nbuilding\r\n[1/10]\r[2/10]\r[3/10]\n",
            &prompt("/home/dev", 0),
        ],
    );
    assert_eq!(record.output, "building\n[3/10]");
}

#[test]
fn test_progress_tail_updates_in_place_across_chunks() {
    let (engine, id) = ready_engine();
    let record = run(
        &engine,
        &id,
        "wget x",
        &[
            "wget x\r\n",
            "Downloading 10%",
            "\rDownloading 55%",
            "\rDownloading 100%\r\n",
            "saved\r\n",
            &prompt("/home/dev", 0),
        ],
    );
    assert_eq!(record.output, "Downloading 100%\nsaved");
}

#[test]
fn test_progress_tail_is_live_before_terminator() {
    let (engine, id) = ready_engine();
    engine.begin_command(&id, "pull").unwrap();
    feed(&engine, &id, &["pull\r\n", "layer 1 ##########"]);

    engine
        .inspect(&id, |s| {
            assert_eq!(s.current_command_output(), "layer 1 ##########");
            assert!(s.raw_buffer().is_empty());
        })
        .unwrap();
}

#[test]
fn test_lone_trailing_cr_is_progress_update() {
    let (engine, id) = ready_engine();
    engine.begin_command(&id, "x").unwrap();
    feed(&engine, &id, &["x\r\n", "abc\r"]);

    engine
        .inspect(&id, |s| {
            assert_eq!(s.current_command_output(), "abc");
            assert!(s.raw_buffer().is_empty());
        })
        .unwrap();

    feed(&engine, &id, &["def\n"]);
    assert_eq!(
        engine.inspect(&id, |s| s.current_command_output().to_string()),
        Some("def".to_string())
    );
}

#[test]
fn test_progress_tail_continued_by_next_chunk() {
    let (engine, id) = ready_engine();
    let p = prompt("/home/dev", 0);

    let split = run(
        &engine,
        &id,
        "cmd",
        &["cmd\r\n", "- item", " one\r\ndone 50%", " ok\r\n", &p],
    );
    let whole = run(
        &engine,
        &id,
        "cmd",
        &["cmd\r\n- item one\r\ndone 50% ok\r\n", &p],
    );

    assert_eq!(whole.output, "- item one\ndone 50% ok");
    assert_eq!(split.output, whole.output);
}

#[test]
fn test_bar_tail_grows_across_chunks() {
    let (engine, id) = ready_engine();
    engine.begin_command(&id, "pull").unwrap();
    feed(&engine, &id, &["pull\r\n", "#### Step", " 1", " done"]);

    engine
        .inspect(&id, |s| {
            assert_eq!(s.current_command_output(), "#### Step 1 done");
            assert_eq!(s.current_output_line_count(), 1);
        })
        .unwrap();

    let done = completed(&feed(&engine, &id, &["\r\n", &prompt("/home/dev", 0)]));
    assert_eq!(done[0].output, "#### Step 1 done");
}

#[test]
fn test_cr_split_from_lf_matches_crlf() {
    let (engine, id) = ready_engine();
    let p = prompt("/home/dev", 0);

    let split = run(&engine, &id, "a", &["a\r\n", "abc\r", "\n", &p]);
    let whole = run(&engine, &id, "a", &["a\r\n", "abc\r\n", &p]);

    assert_eq!(split.output, "abc");
    assert_eq!(split.output, whole.output);
}

// ============================================================================
// Pagination Tests
// ============================================================================

#[test]
fn test_pages_archive_every_ten_lines() {
    let (engine, id) = ready_engine();
    engine.begin_command(&id, "seq 25").unwrap();

    let body: String = (1..=25).map(|n| format!("{n}\r\n")).collect();
    let events = feed(&engine, &id, &["seq 25\r\n", &body]);

    let out = outputs(&events);
    let first_page: Vec<String> = (1..=10).map(|n| n.to_string()).collect();
    assert_eq!(out[9].output_chunk, first_page.join("\n"));

    engine
        .inspect(&id, |s| {
            assert_eq!(s.current_command().unwrap().output_pages.len(), 2);
            assert_eq!(s.current_output_line_count(), 5);
            assert_eq!(s.current_command_output(), "21\n22\n23\n24\n25");
        })
        .unwrap();

    let done = completed(&feed(&engine, &id, &[&prompt("/home/dev", 0)]));
    let record = &done[0];
    assert_eq!(record.output_pages.len(), 2);
    assert_eq!(record.output, "21\n22\n23\n24\n25");
    assert_eq!(record.evicted_pages, 0);

    let all: Vec<String> = (1..=25).map(|n| n.to_string()).collect();
    assert_eq!(record.full_output(), all.join("\n"));
}

#[test]
fn test_page_cap_evicts_oldest_pages() {
    let engine = TerminalEngine::new(EngineConfig {
        page_line_threshold: 2,
        max_output_pages: 3,
        ..ungated()
    })
    .unwrap();
    let id = open_ready(&engine, "s1");

    let body: String = (1..=10).map(|n| format!("{n}\r\n")).collect();
    let record = run(
        &engine,
        &id,
        "seq 10",
        &["seq 10\r\n", &body, &prompt("/home/dev", 0)],
    );

    assert_eq!(record.evicted_pages, 2);
    assert_eq!(
        record.output_pages.iter().cloned().collect::<Vec<_>>(),
        vec!["5\n6", "7\n8", "9\n10"]
    );
    assert_eq!(record.output, "");
    assert_eq!(record.full_output(), "5\n6\n7\n8\n9\n10");
}

#[test]
fn test_progress_row_on_page_boundary_collapses() {
    let (engine, id) = ready_engine();
    let body: String = (1..=9).map(|n| format!("l{n}\r\n")).collect();

    let record = run(
        &engine,
        &id,
        "make",
        &[
            "make\r\n",
            &body,
            "[1/10]\r[2/10]\r[3/10]\n",
            &prompt("/home/dev", 0),
        ],
    );

    let full = record.full_output();
    assert_eq!(full.matches("/10]").count(), 1);
    assert!(full.ends_with("l9\n[3/10]"));
    assert_eq!(record.output_pages.len(), 1);
    assert_eq!(record.output, "");
}

// ============================================================================
// Directory Tests
// ============================================================================

#[test]
fn test_directory_change_is_reported_and_recorded() {
    let (engine, id) = ready_engine();
    engine.begin_command(&id, "cd /tmp").unwrap();
    let events = feed(&engine, &id, &["cd /tmp\r\n", &prompt("/tmp", 0)]);

    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::DirectoryChanged(d) if d.current_directory == "/tmp" && d.session_id == id
    )));
    assert_eq!(
        engine.inspect(&id, |s| s.current_directory().to_string()),
        Some("/tmp".to_string())
    );

    let next = run(&engine, &id, "pwd", &["pwd\r\n/tmp\r\n", &prompt("/tmp", 0)]);
    assert_eq!(next.cwd.as_deref(), Some("/tmp"));
}

// ============================================================================
// Full-screen Tests
// ============================================================================

#[test]
fn test_fullscreen_suspends_lines_and_exit_finalizes() {
    let (engine, id) = ready_engine();
    engine.begin_command(&id, "vim").unwrap();

    let events = feed(
        &engine,
        &id,
        &["vim\r\n\x1b[?1049h\x1b[Hsome screen\r\nmore\r\n"],
    );
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        EngineEvent::FullscreenChanged { active: true, .. }
    ));
    assert_eq!(engine.inspect(&id, |s| s.is_fullscreen()), Some(true));

    let events = feed(&engine, &id, &["~\r\n~\r\n"]);
    assert!(events.is_empty());

    let events = feed(
        &engine,
        &id,
        &[&format!("\x1b[?1049l{}", prompt("/home/dev", 0))],
    );
    assert!(matches!(
        events[0],
        EngineEvent::FullscreenChanged { active: false, .. }
    ));
    let done = completed(&events);
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].command, "vim");
    assert_eq!(done[0].exit_code, None);
    assert_eq!(done[0].output, "");

    engine
        .inspect(&id, |s| {
            assert!(!s.is_fullscreen());
            assert!(s.current_command().is_none());
        })
        .unwrap();
}

#[test]
fn test_fullscreen_enter_split_across_chunks() {
    let (engine, id) = ready_engine();
    engine.begin_command(&id, "top").unwrap();

    let events = feed(&engine, &id, &["top\r\n\x1b[?10"]);
    assert!(events.is_empty());

    let events = feed(&engine, &id, &["49h\x1b[Hload average"]);
    assert!(matches!(
        events[0],
        EngineEvent::FullscreenChanged { active: true, .. }
    ));
}

#[test]
fn test_output_before_fullscreen_enter_is_kept() {
    let (engine, id) = ready_engine();
    engine.begin_command(&id, "less f").unwrap();
    feed(&engine, &id, &["less f\r\nwarning: x\x1b[?1049h\x1b[H"]);

    engine
        .inspect(&id, |s| {
            assert!(s.is_fullscreen());
            assert_eq!(s.current_command_output(), "warning: x");
        })
        .unwrap();
}

#[test]
fn test_legacy_alt_screen_modes() {
    let (engine, id) = ready_engine();
    engine.begin_command(&id, "old").unwrap();

    let events = feed(&engine, &id, &["old\r\n\x1b[?47h"]);
    assert!(matches!(
        events[0],
        EngineEvent::FullscreenChanged { active: true, .. }
    ));
    let events = feed(&engine, &id, &["\x1b[?47l"]);
    assert_eq!(completed(&events).len(), 1);
}

// ============================================================================
// Interactive Prompt Tests
// ============================================================================

#[test]
fn test_waiting_probe_turns_tail_into_interactive_prompt() {
    let engine = TerminalEngine::new(ungated()).unwrap();
    let probe = Arc::new(ManualProbe::new());
    let id = SessionId::new("s1");
    engine.open_session(id.clone(), probe.clone()).unwrap();
    feed(&engine, &id, &[&prompt("/home/dev", 0)]);

    let command_id = engine.begin_command(&id, "sudo ls").unwrap();
    feed(&engine, &id, &["sudo ls\r\n"]);

    probe.set_waiting(true, true);
    let events = feed(&engine, &id, &["[sudo] password for dev: "]);
    match &events[0] {
        EngineEvent::InteractivePrompt {
            command_id: cid,
            prompt,
            ..
        } => {
            assert_eq!(*cid, command_id);
            assert_eq!(prompt, "[sudo] password for dev:");
        }
        other => panic!("Expected InteractivePrompt, got {other:?}"),
    }
    engine
        .inspect(&id, |s| {
            assert!(s.is_interactive_mode());
            assert_eq!(s.interactive_prompt(), Some("[sudo] password for dev:"));
        })
        .unwrap();

    probe.set_waiting(false, true);
    let events = feed(&engine, &id, &["\r\nfile\r\n", &prompt("/home/dev", 0)]);
    let done = completed(&events);
    assert_eq!(done[0].output, "[sudo] password for dev:\nfile");

    engine
        .inspect(&id, |s| {
            assert!(!s.is_interactive_mode());
            assert_eq!(s.interactive_prompt(), None);
        })
        .unwrap();
}

#[test]
fn test_typed_answer_lands_on_prompt_row() {
    let engine = TerminalEngine::new(ungated()).unwrap();
    let probe = Arc::new(ManualProbe::new());
    let id = SessionId::new("s1");
    engine.open_session(id.clone(), probe.clone()).unwrap();
    feed(&engine, &id, &[&prompt("/home/dev", 0)]);

    engine.begin_command(&id, "apt upgrade").unwrap();
    feed(&engine, &id, &["apt upgrade\r\n3 packages\r\n"]);

    probe.set_waiting(true, false);
    feed(&engine, &id, &["Continue? [Y/n] "]);
    probe.set_waiting(false, true);

    let events = feed(&engine, &id, &["y\r\ndone\r\n", &prompt("/home/dev", 0)]);
    assert_eq!(
        completed(&events)[0].output,
        "3 packages\nContinue? [Y/n] y\ndone"
    );
}

#[test]
fn test_fullscreen_enter_split_after_interactive_tail() {
    let engine = TerminalEngine::new(ungated()).unwrap();
    let probe = Arc::new(ManualProbe::new());
    let id = SessionId::new("s1");
    engine.open_session(id.clone(), probe.clone()).unwrap();
    feed(&engine, &id, &[&prompt("/home/dev", 0)]);

    engine.begin_command(&id, "vi").unwrap();
    feed(&engine, &id, &["vi\r\n"]);

    probe.set_waiting(true, false);
    feed(&engine, &id, &["x\x1b[?10"]);
    assert_eq!(
        engine.inspect(&id, |s| s.raw_buffer().to_string()),
        Some("\x1b[?10".to_string())
    );
    probe.set_waiting(false, false);

    let events = feed(&engine, &id, &["49h\x1b[H~\r\n"]);
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::FullscreenChanged { active: true, .. })));
    assert_eq!(engine.inspect(&id, |s| s.is_fullscreen()), Some(true));

    let done = completed(&feed(&engine, &id, &["\x1b[?1049l"]));
    assert_eq!(done[0].output, "x");
}

#[test]
fn test_idle_probe_leaves_tail_buffered() {
    let (engine, id) = ready_engine();
    engine.begin_command(&id, "read x").unwrap();
    let events = feed(&engine, &id, &["read x\r\n", "Name: "]);

    assert!(events.is_empty());
    assert_eq!(
        engine.inspect(&id, |s| s.raw_buffer().to_string()),
        Some("Name: ".to_string())
    );
}

// ============================================================================
// Buffer Bound Tests
// ============================================================================

#[test]
fn test_raw_buffer_never_exceeds_cap() {
    let engine = TerminalEngine::new(EngineConfig {
        buffer_cap_bytes: 64,
        ..ungated()
    })
    .unwrap();
    let id = open_ready(&engine, "s1");

    feed(&engine, &id, &[&"x".repeat(1000)]);
    let len = engine.inspect(&id, |s| s.raw_buffer().len()).unwrap();
    assert!(len <= 64);
    assert!(len > 0);
}

#[test]
fn test_cap_cuts_on_char_boundary() {
    let engine = TerminalEngine::new(EngineConfig {
        buffer_cap_bytes: 63,
        ..ungated()
    })
    .unwrap();
    let id = open_ready(&engine, "s1");

    feed(&engine, &id, &[&"é".repeat(100)]);
    engine
        .inspect(&id, |s| {
            assert!(s.raw_buffer().len() <= 63);
            assert!(s.raw_buffer().chars().all(|c| c == 'é'));
        })
        .unwrap();
}

// ============================================================================
// Registry + Error Tests
// ============================================================================

#[test]
fn test_unknown_session_errors() {
    let engine = TerminalEngine::new(ungated()).unwrap();
    let ghost = SessionId::new("ghost");

    assert!(matches!(
        engine.process_output(&ghost, "x"),
        Err(EngineError::UnknownSession(_))
    ));
    assert!(matches!(
        engine.begin_command(&ghost, "ls"),
        Err(EngineError::UnknownSession(_))
    ));
    assert!(engine.inspect(&ghost, |_| ()).is_none());
}

#[test]
fn test_duplicate_session_rejected() {
    let (engine, id) = ready_engine();
    let err = engine
        .open_session(id.clone(), Arc::new(NeverWaiting))
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionExists(_)));
}

#[test]
fn test_second_command_while_in_flight_rejected() {
    let (engine, id) = ready_engine();
    engine.begin_command(&id, "sleep 5").unwrap();

    match engine.begin_command(&id, "ls").unwrap_err() {
        EngineError::CommandInFlight { command, .. } => assert_eq!(command, "sleep 5"),
        other => panic!("Expected CommandInFlight, got {other:?}"),
    }
}

#[test]
fn test_invalid_config_rejected_by_engine() {
    let err = TerminalEngine::new(EngineConfig {
        page_line_threshold: 0,
        ..EngineConfig::default()
    })
    .unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn test_close_session_forgets_everything() {
    let (engine, id) = ready_engine();
    assert_eq!(engine.session_ids(), vec![id.clone()]);

    assert!(engine.close_session(&id));
    assert!(!engine.close_session(&id));
    assert!(engine.session_ids().is_empty());
    assert!(matches!(
        engine.process_output(&id, "x"),
        Err(EngineError::UnknownSession(_))
    ));
}

#[test]
fn test_clear_session_state_resets_progress_row() {
    let (engine, id) = ready_engine();
    engine.begin_command(&id, "dl").unwrap();
    feed(&engine, &id, &["dl\r\n", "50%"]);

    engine.clear_session_state(&id);
    feed(&engine, &id, &["\r60%"]);

    assert_eq!(
        engine.inspect(&id, |s| s.current_command_output().to_string()),
        Some("50%\n60%".to_string())
    );
}

#[test]
fn test_sessions_are_independent() {
    let engine = TerminalEngine::new(ungated()).unwrap();
    let a = open_ready(&engine, "a");
    let b = open_ready(&engine, "b");

    engine.begin_command(&a, "echo a").unwrap();
    engine.begin_command(&b, "echo b").unwrap();

    feed(&engine, &a, &["echo a\r\nfrom a\r\n"]);
    let done_b = completed(&feed(
        &engine,
        &b,
        &["echo b\r\nfrom b\r\n", &prompt("/b", 0)],
    ));

    assert_eq!(done_b[0].output, "from b");
    assert_eq!(
        engine.inspect(&a, |s| s.current_command_output().to_string()),
        Some("from a".to_string())
    );
    assert_eq!(
        engine.inspect(&a, |s| s.current_directory().to_string()),
        Some("/home/dev".to_string())
    );
}

#[test]
fn test_events_serialize_with_type_tag() {
    let (engine, id) = ready_engine();
    engine.begin_command(&id, "cd /srv").unwrap();
    let events = feed(&engine, &id, &["cd /srv\r\n", &prompt("/srv", 0)]);

    let dir = events
        .iter()
        .find(|e| matches!(e, EngineEvent::DirectoryChanged(_)))
        .unwrap();
    let json = serde_json::to_value(dir).unwrap();
    assert_eq!(json["type"], "directory_changed");
    assert_eq!(json["current_directory"], "/srv");
    assert_eq!(json["session_id"], "s1");
}

// ============================================================================
// Pump Tests
// ============================================================================

#[tokio::test]
async fn test_pump_reassembles_split_utf8_and_forwards_events() {
    let engine = Arc::new(TerminalEngine::new(ungated()).unwrap());
    let id = open_ready(&engine, "s1");
    engine.begin_command(&id, "echo é").unwrap();

    let (bytes_tx, bytes_rx) = mpsc::channel(16);
    let (events_tx, mut events_rx) = mpsc::channel(16);
    let pump = tokio::spawn(pump_session(
        Arc::clone(&engine),
        id.clone(),
        bytes_rx,
        events_tx,
    ));

    let stream = format!("echo é\r\né\r\n{}", prompt("/home/dev", 0));
    let bytes = stream.into_bytes();
    // Cut inside the second 'é'.
    let cut = "echo é\r\n".len() + 1;
    bytes_tx.send(bytes[..cut].to_vec()).await.unwrap();
    bytes_tx.send(bytes[cut..].to_vec()).await.unwrap();
    drop(bytes_tx);

    let mut events = Vec::new();
    while let Some(ev) = events_rx.recv().await {
        events.push(ev);
    }
    pump.await.unwrap().unwrap();

    let done = completed(&events);
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].output, "é");
}

#[tokio::test]
async fn test_pump_errors_for_unknown_session() {
    let engine = Arc::new(TerminalEngine::new(ungated()).unwrap());
    let (bytes_tx, bytes_rx) = mpsc::channel(4);
    let (events_tx, _events_rx) = mpsc::channel(4);

    bytes_tx.send(b"hello\r\n".to_vec()).await.unwrap();
    drop(bytes_tx);

    let result = pump_session(engine, SessionId::new("ghost"), bytes_rx, events_tx).await;
    assert!(matches!(result, Err(EngineError::UnknownSession(_))));
}

// ============================================================================
// Chunk Boundary Properties
// ============================================================================

/// Untagged prompts are judged on whatever tail has arrived, so only the
/// tagged shape is in play here.
fn run_chunked(chunks: &[&str]) -> (String, Option<i32>) {
    let engine = TerminalEngine::new(EngineConfig {
        heuristic_prompts: false,
        ..ungated()
    })
    .unwrap();
    let id = open_ready(&engine, "s1");
    engine.begin_command(&id, "RUN-1").unwrap();
    let events = feed(&engine, &id, chunks);
    let done = completed(&events);
    assert_eq!(done.len(), 1);
    (done[0].output.clone(), done[0].exit_code)
}

proptest! {
    #[test]
    fn prop_chunk_boundaries_do_not_change_the_record(
        lines in proptest::collection::vec("[a-z0-9 %#=/-]{0,12}", 1..20),
        cuts in proptest::collection::vec(0usize..1000, 0..8),
    ) {
        let mut stream = String::from("RUN-1\r\n");
        stream.extend(lines.iter().map(|l| format!("{l}\r\n")));
        stream.push_str(&prompt("/home/dev", 3));

        let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c % (stream.len() + 1)).collect();
        cuts.sort_unstable();
        cuts.dedup();

        let mut chunks = Vec::new();
        let mut prev = 0;
        for c in cuts {
            chunks.push(&stream[prev..c]);
            prev = c;
        }
        chunks.push(&stream[prev..]);

        let whole = run_chunked(&[stream.as_str()]);
        let split = run_chunked(&chunks);
        prop_assert_eq!(&whole, &split);
        prop_assert_eq!(whole.1, Some(3));
    }
}
