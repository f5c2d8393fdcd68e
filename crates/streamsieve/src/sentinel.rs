//! Sentinel vocabulary and the incremental tag lexer.
//!
//! Sentinels are fixed control tokens of the form `<|name|>` emitted by the
//! model to demarcate structure. Matching is ASCII-case-insensitive on the
//! name and exact on the punctuation. The matcher is safe to run against a
//! truncated buffer: when the tail of the input is a strict, non-empty prefix
//! of a recognized token it reports [`TagMatch::NeedMore`] so the caller can
//! hold that tail back until the next chunk arrives.

/// Block kinds delimited by `<|{kind}_start|>` / `<|{kind}_end|>` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// `<|memory_start|>` .. `<|memory_end|>` — internal memory dump.
    Memory,
    /// `<|analysis_start|>` .. `<|analysis_end|>` — internal reasoning.
    Analysis,
    /// `<|tool_call_start|>` .. `<|tool_call_end|>` — tool-call envelope.
    ToolCall,
    /// `<|tool_result_start|>` .. `<|tool_result_end|>` — tool output.
    ToolResult,
    /// `<|final_start|>` .. `<|final_end|>` — the user-facing answer.
    Final,
}

impl BlockKind {
    /// Whether the block's contents are discarded rather than unwrapped into
    /// the output.
    #[must_use]
    pub fn is_drop(self) -> bool {
        matches!(self, Self::Memory | Self::Analysis | Self::ToolCall)
    }
}

/// A recognized control token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sentinel {
    Channel,
    Message,
    Start(BlockKind),
    End(BlockKind),
}

/// The full vocabulary, canonical spelling first.
const VOCABULARY: &[(&str, Sentinel)] = &[
    ("<|channel|>", Sentinel::Channel),
    ("<|message|>", Sentinel::Message),
    ("<|memory_start|>", Sentinel::Start(BlockKind::Memory)),
    ("<|memory_end|>", Sentinel::End(BlockKind::Memory)),
    ("<|analysis_start|>", Sentinel::Start(BlockKind::Analysis)),
    ("<|analysis_end|>", Sentinel::End(BlockKind::Analysis)),
    ("<|tool_call_start|>", Sentinel::Start(BlockKind::ToolCall)),
    ("<|tool_call_end|>", Sentinel::End(BlockKind::ToolCall)),
    ("<|tool_result_start|>", Sentinel::Start(BlockKind::ToolResult)),
    ("<|tool_result_end|>", Sentinel::End(BlockKind::ToolResult)),
    ("<|final_start|>", Sentinel::Start(BlockKind::Final)),
    ("<|final_end|>", Sentinel::End(BlockKind::Final)),
];

/// Result of probing the input at a candidate token position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagMatch {
    /// A complete token of the given byte length.
    Token(Sentinel, usize),
    /// The remaining input is a strict prefix of at least one token; it
    /// cannot be classified until more input arrives.
    NeedMore,
    /// Not a recognized token.
    None,
}

/// Matches `rest` against the vocabulary.
///
/// With `end_of_input` set, a dangling prefix can no longer be completed and
/// is reported as [`TagMatch::None`] (it falls through as literal text).
pub(crate) fn match_tag(rest: &str, end_of_input: bool) -> TagMatch {
    let bytes = rest.as_bytes();
    let mut saw_prefix = false;
    for (literal, token) in VOCABULARY {
        let lit = literal.as_bytes();
        if bytes.len() >= lit.len() {
            if bytes[..lit.len()].eq_ignore_ascii_case(lit) {
                return TagMatch::Token(*token, lit.len());
            }
        } else if !bytes.is_empty() && lit[..bytes.len()].eq_ignore_ascii_case(bytes) {
            saw_prefix = true;
        }
    }
    if saw_prefix && !end_of_input {
        TagMatch::NeedMore
    } else {
        TagMatch::None
    }
}
