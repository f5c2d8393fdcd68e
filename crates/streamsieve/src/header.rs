//! Channel header classification and mention extraction.
//!
//! The free text between `<|channel|>` and `<|message|>` declares how the
//! channel's payload is rendered. There is no grammar for it; classification
//! is by case-insensitive substring, which is what real model output calls
//! for. Classification is total: every header maps to exactly one mode.

/// How a channel payload is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMode {
    /// Plain text, shown up to the next newline or `<|channel|>`.
    FinalPlain,
    /// JSON carrying user-facing text in a well-known field.
    FinalJson,
    /// Machine-directed JSON, typically a `stdout` field or an `echo` command.
    CommentaryJson,
    /// Commentary routed to a tool invocation; dropped entirely.
    ToolformerDrop,
    /// Unclassifiable; dropped up to the next newline.
    Unknown,
}

/// Classifies a raw header into a [`PayloadMode`].
pub(crate) fn classify(header: &str) -> PayloadMode {
    let lower = header.to_ascii_lowercase();
    if lower.contains("commentary") {
        if lower.contains("to=functions") {
            return PayloadMode::ToolformerDrop;
        }
        return PayloadMode::CommentaryJson;
    }
    if lower.contains("final") {
        if lower.contains("json") {
            return PayloadMode::FinalJson;
        }
        return PayloadMode::FinalPlain;
    }
    PayloadMode::Unknown
}

/// Extracts the first `@@name` mention from a header, falling back to a
/// `##path` file reference. The token is kept verbatim, marker included.
pub(crate) fn extract_mention(header: &str) -> Option<String> {
    find_marked(header, "@@", |c: char| {
        c.is_ascii_alphanumeric() || c == '_' || c == '-'
    })
    .or_else(|| {
        find_marked(header, "##", |c: char| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '-')
        })
    })
}

fn find_marked(header: &str, marker: &str, allowed: impl Fn(char) -> bool) -> Option<String> {
    let mut from = 0;
    while let Some(i) = header[from..].find(marker) {
        let start = from + i;
        let body = start + marker.len();
        let end = header[body..]
            .char_indices()
            .find(|&(_, c)| !allowed(c))
            .map_or(header.len(), |(j, _)| body + j);
        if end > body {
            return Some(header[start..end].to_string());
        }
        from = body;
    }
    None
}
