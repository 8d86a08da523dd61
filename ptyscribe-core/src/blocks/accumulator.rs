/// The in-flight command's visible page and its line count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputAccumulator {
    text: String,
    lines: usize,
}

impl OutputAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.lines == 0
    }

    pub fn line_count(&self) -> usize {
        self.lines
    }

    /// Append a line. Returns the finished page once `threshold` lines have
    /// been written to it; the accumulator is empty afterwards.
    pub fn push_line(&mut self, line: &str, threshold: usize) -> Option<String> {
        if self.lines > 0 {
            self.text.push('\n');
        }
        self.text.push_str(line);
        self.lines += 1;

        if self.lines >= threshold {
            return Some(self.take());
        }
        None
    }

    /// Overwrite the last line in place. On an empty page this is a push.
    pub fn replace_last_line(&mut self, line: &str, threshold: usize) -> Option<String> {
        if self.lines == 0 {
            return self.push_line(line, threshold);
        }

        let keep = self.text.rfind('\n').map(|i| i + 1).unwrap_or(0);
        self.text.truncate(keep);
        self.text.push_str(line);
        None
    }

    /// Drain the page and reset the count.
    pub fn take(&mut self) -> String {
        self.lines = 0;
        std::mem::take(&mut self.text)
    }
}
