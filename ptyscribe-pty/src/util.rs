use tracing_subscriber::EnvFilter;

const CRATES: [&str; 3] = ["ptyscribe_core", "ptyscribe_pty", "scribe_probe"];

/// `RUST_LOG` wins when set. Otherwise our crates log at a level picked by
/// `verbosity` (0 = info, 1 = debug, 2+ = trace) and everything else at warn.
pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));

    // stdout carries the event stream
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .compact()
        .try_init();
}

fn default_directives(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    CRATES
        .iter()
        .fold(String::from("warn"), |acc, krate| format!("{acc},{krate}={level}"))
}

/// Log panics through tracing, then hand over to the previously installed
/// hook.
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("<non-string panic payload>");
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "<unknown>".to_string());
        let thread = std::thread::current();

        tracing::error!(
            thread = thread.name().unwrap_or("<unnamed>"),
            %location,
            %payload,
            "panic"
        );
        previous(info);
    }));
}
