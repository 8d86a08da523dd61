use regex::Regex;
use std::sync::OnceLock;

/// Shapes that mark an unterminated tail as a progress row: a percentage,
/// an `[n/m]` step counter, a bar of 3+ fill characters, or a leading spinner
/// glyph.
pub fn looks_like_progress(cleaned: &str) -> bool {
    let s = cleaned.trim();
    if s.is_empty() {
        return false;
    }
    progress_re().is_match(s)
}

fn progress_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"\d{1,3}(?:\.\d+)?\s?%",
            r"|[\[(]\s*\d+\s*/\s*\d+\s*[\])]",
            r"|[#=█▓▒░]{3,}",
            r"|^[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏|/\\]\s",
        ))
        .expect("Invalid progress Regex")
    })
}
