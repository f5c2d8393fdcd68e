//! Balanced JSON scanning over partial input.
//!
//! The scanner consumes a JSON value (object, array, or string) character by
//! character, tracking nesting depth, string boundaries, and backslash-escape
//! state. It never parses: it only finds where the value ends, and it reports
//! [`ScanStep::Incomplete`] instead of failing when the value is still
//! arriving, so the caller can resume on the next chunk without rescanning.

/// Resumable scan state. [`Default`] is the state before the first character
/// of the value.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct JsonScanner {
    depth: u32,
    in_string: bool,
    escape_pending: bool,
}

/// Outcome of one [`JsonScanner::step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanStep {
    /// The value ended; the given number of bytes of this slice belong to it.
    Complete(usize),
    /// The whole slice belongs to the value and it is still open.
    Incomplete,
}

impl JsonScanner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Consumes characters from `text`, which continues a value whose first
    /// character was `{`, `[`, or `"`.
    pub(crate) fn step(&mut self, text: &str) -> ScanStep {
        for (i, c) in text.char_indices() {
            if self.in_string {
                if self.escape_pending {
                    self.escape_pending = false;
                } else if c == '\\' {
                    self.escape_pending = true;
                } else if c == '"' {
                    self.in_string = false;
                    if self.depth == 0 {
                        // Top-level string value.
                        return ScanStep::Complete(i + 1);
                    }
                }
            } else {
                match c {
                    '"' => self.in_string = true,
                    '{' | '[' => self.depth += 1,
                    '}' | ']' => {
                        self.depth = self.depth.saturating_sub(1);
                        if self.depth == 0 {
                            return ScanStep::Complete(i + 1);
                        }
                    }
                    _ => {}
                }
            }
        }
        ScanStep::Incomplete
    }
}
