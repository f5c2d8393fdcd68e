//! Triple-backtick fence detection.
//!
//! A fence opens with three backticks at the start of a line, optionally
//! followed by a language tag, and closes at the next three-backtick
//! sequence. Fenced spans pass through the filter byte-for-byte.

/// Length in bytes of the backtick run starting at `pos`.
pub(crate) fn backtick_run(text: &str, pos: usize) -> usize {
    text.as_bytes()[pos..]
        .iter()
        .take_while(|&&b| b == b'`')
        .count()
}

/// Finds the end (exclusive, including the closing backticks) of a fence
/// whose opening triple backtick sits at the start of `text`.
pub(crate) fn find_close(text: &str) -> Option<usize> {
    let from = 3;
    text.get(from..)?.find("```").map(|i| from + i + 3)
}
