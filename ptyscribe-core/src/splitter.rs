//! Line extraction from the per-session raw buffer.

/// How a line ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Lf,
    CrLf,
    /// Bare carriage return: a progress row update.
    Cr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub terminator: Terminator,
}

/// Remove the next complete line from the front of `buf`.
///
/// A `\r` that ends the buffer stays put until the next byte tells CR from
/// CRLF. The caller still sees it as part of the unterminated tail.
pub fn split_line(buf: &mut String) -> Option<Segment> {
    let cr = buf.find('\r');
    let lf = buf.find('\n');

    let (end, consumed, terminator) = match (cr, lf) {
        (Some(c), Some(l)) if c < l => {
            if l == c + 1 {
                (c, c + 2, Terminator::CrLf)
            } else {
                (c, c + 1, Terminator::Cr)
            }
        }
        (Some(c), None) if c + 1 == buf.len() => return None,
        (Some(c), None) => (c, c + 1, Terminator::Cr),
        (_, Some(l)) => (l, l + 1, Terminator::Lf),
        (None, None) => return None,
    };

    let text = buf[..end].to_string();
    buf.drain(..consumed);
    Some(Segment { text, terminator })
}

/// Drop the oldest data so that `buf.len() <= cap`. Cuts on a char
/// boundary. Returns the number of bytes dropped.
pub fn enforce_cap(buf: &mut String, cap: usize) -> usize {
    if buf.len() <= cap {
        return 0;
    }

    let mut cut = buf.len() - cap;
    while !buf.is_char_boundary(cut) {
        cut += 1;
    }
    buf.drain(..cut);
    cut
}
