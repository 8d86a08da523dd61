/// Strip escape sequences and C0 controls from one logical line.
///
/// Handles CSI (`ESC [ ... final`), OSC (`ESC ] ... BEL|ST`), two-byte and
/// charset escapes (`ESC ( B`). Backspace erases the previous char, tab is
/// kept. An unterminated sequence at the end of the line is dropped.
pub fn strip_controls(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut state = State::Ground;

    for c in line.chars() {
        if state == State::Ground {
            match c {
                '\x08' => {
                    out.pop();
                }
                '\t' => out.push(c),
                c if !c.is_control() => out.push(c),
                _ => {}
            }
        }
        state = state.next(c);
    }

    out
}

/// Byte offset where an escape sequence still open at the end of `buf`
/// begins, e.g. the `ESC [ ? 10` half of a mode switch.
pub fn incomplete_escape_start(buf: &str) -> Option<usize> {
    let mut state = State::Ground;
    let mut start = 0;

    for (i, c) in buf.char_indices() {
        if state == State::Ground {
            start = i;
        }
        state = state.next(c);
    }

    (state != State::Ground).then_some(start)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ground,
    Esc,
    EscIntermediate,
    Csi,
    Osc,
    OscEsc,
}

impl State {
    fn next(self, c: char) -> Self {
        match self {
            State::Ground => match c {
                '\x1b' => State::Esc,
                '\u{9b}' => State::Csi,
                '\u{9d}' => State::Osc,
                _ => State::Ground,
            },
            State::Esc => match c {
                '[' => State::Csi,
                ']' => State::Osc,
                // intermediates: ESC ( B, ESC # 8 ...
                '\x20'..='\x2f' => State::EscIntermediate,
                _ => State::Ground,
            },
            State::EscIntermediate => match c {
                '\x20'..='\x2f' => State::EscIntermediate,
                _ => State::Ground,
            },
            State::Csi => match c {
                '\x40'..='\x7e' => State::Ground,
                _ => State::Csi,
            },
            State::Osc => match c {
                '\x07' => State::Ground,
                '\x1b' => State::OscEsc,
                _ => State::Osc,
            },
            State::OscEsc => match c {
                '\\' => State::Ground,
                _ => State::Osc,
            },
        }
    }
}
