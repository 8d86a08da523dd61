//! Alternate-screen detection over buffered text.
//!
//! We only care about the DEC private modes that swap screens:
//! `?47`, `?1047`, `?1049`, set (`h`) or reset (`l`). A sequence may carry
//! other modes alongside (`ESC[?1049;2004h`); any alt-screen mode in the list
//! counts.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltScreenEdge {
    Enter,
    Exit,
}

/// Byte span of a matching sequence: `buf[start..end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AltScreenMatch {
    pub start: usize,
    pub end: usize,
    pub mode: u16,
}

const ALT_SCREEN_MODES: [u16; 3] = [47, 1047, 1049];

/// First sequence in `buf` that performs `edge`.
pub fn find_alt_screen(buf: &str, edge: AltScreenEdge) -> Option<AltScreenMatch> {
    let bytes = buf.as_bytes();
    let want = match edge {
        AltScreenEdge::Enter => b'h',
        AltScreenEdge::Exit => b'l',
    };

    let mut i = 0;
    while i + 2 < bytes.len() {
        if bytes[i] != 0x1b || bytes[i + 1] != b'[' || bytes[i + 2] != b'?' {
            i += 1;
            continue;
        }

        match parse_private_csi(&bytes[i + 3..]) {
            Some((nums, final_byte, len)) => {
                let end = i + 3 + len;
                if final_byte == want {
                    if let Some(&mode) = nums.iter().find(|m| ALT_SCREEN_MODES.contains(m)) {
                        return Some(AltScreenMatch {
                            start: i,
                            end,
                            mode,
                        });
                    }
                }
                i = end;
            }
            None => i += 1,
        }
    }

    None
}

/// Parses `N;N;...F` after `ESC[?`. Returns params, final byte and consumed
/// length, or None when the sequence is malformed or incomplete.
fn parse_private_csi(bytes: &[u8]) -> Option<(Vec<u16>, u8, usize)> {
    let mut nums = Vec::new();
    let mut cur: Option<u16> = None;

    for (idx, &b) in bytes.iter().enumerate() {
        match b {
            b'0'..=b'9' => {
                let d = (b - b'0') as u16;
                cur = Some(cur.unwrap_or(0).saturating_mul(10).saturating_add(d));
            }
            b';' => nums.push(cur.take().unwrap_or(0)),
            0x40..=0x7e => {
                if let Some(n) = cur.take() {
                    nums.push(n);
                }
                return Some((nums, b, idx + 1));
            }
            _ => return None,
        }
    }

    None
}
