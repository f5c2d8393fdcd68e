//! The streaming display filter.
//!
//! [`StreamFilter`] ingests an arbitrarily-chunked model output stream and
//! recovers the portion meant for display: machine scaffolding (memory dumps,
//! reasoning, tool-call envelopes) is dropped, unwrap blocks and channel
//! payloads are unwrapped, and fenced code passes through untouched. The
//! engine is a single incremental automaton with one scan position; it is
//! chunk-size invariant and never raises an error to its caller.
//!
//! # Examples
//!
//! ```rust
//! use streamsieve::{FilterOptions, StreamFilter};
//!
//! let mut filter = StreamFilter::new(FilterOptions::default());
//! let mut shown = filter.feed("<|channel|>final @@user<|message|>Hello!");
//! shown.push_str(&filter.flush());
//! assert_eq!(shown, "@@user Hello!");
//! ```

use std::mem;

use tracing::{debug, trace};

use crate::{
    fence,
    header::{self, PayloadMode},
    options::FilterOptions,
    render,
    scan::{JsonScanner, ScanStep},
    sentinel::{BlockKind, Sentinel, TagMatch, match_tag},
};

/// Iterations the driver tolerates without consuming or emitting a byte
/// before forcing an advance. Larger than the number of states, so any
/// legitimate chain of zero-length transitions fits.
const STALL_LIMIT: u32 = 16;

/// Result of one [`StreamFilter::feed_with_stats`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedOutput {
    /// Text that is safe to display immediately.
    pub text: String,
    /// Bytes dropped as machine scaffolding. Diagnostic only: a drop may be
    /// reported a chunk later than it happened, and the count is approximate
    /// at payload boundaries where text is transformed rather than copied.
    /// Summed over a stream, the shown bytes plus `removed` never exceed the
    /// bytes fed.
    pub removed: usize,
}

/// The active parser state. Exactly one is active at a time; nested regions
/// of the same block kind use a depth counter.
#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    /// No open construct.
    Text,
    /// Inside a fence; `buf` starts at the opening backticks.
    Fence,
    /// Inside a sentinel-delimited block.
    Block { kind: BlockKind, depth: u32 },
    /// Between `<|channel|>` and `<|message|>`.
    Header,
    /// Just past `<|message|>`, payload shape not yet known.
    PayloadStart {
        mode: PayloadMode,
        mention: Option<String>,
    },
    /// Capturing (or dropping) a balanced JSON payload.
    JsonBody {
        mode: PayloadMode,
        mention: Option<String>,
    },
    /// JSON-mode payload that was not JSON-shaped; captured to the newline.
    LineBody {
        mode: PayloadMode,
        mention: Option<String>,
    },
    /// Plain payload streamed through to the next newline or channel.
    PlainBody {
        mention: Option<String>,
        prefixed: bool,
    },
    /// Discarding through the next newline.
    DropLine,
}

/// Outcome of one state handler invocation.
enum Step {
    /// The state machine can run again immediately.
    Continue,
    /// Nothing further can happen without more input.
    NeedMore,
}

/// A per-stream display filter with `feed`/`flush` semantics.
///
/// Each concurrent model response owns its own instance; there is no shared
/// state. `feed` returns all text that is unambiguously final, holding back
/// the longest suffix that could still be the prefix of a sentinel, fence,
/// or payload. `flush` resolves every pending construct and must be called
/// once when the stream ends.
#[derive(Debug)]
pub struct StreamFilter {
    /// Unconsumed input, always beginning at the earliest unresolved point.
    buf: String,
    state: State,
    /// Whether `buf[0]` sits at the start of a line in the stream.
    bol: bool,
    /// Accumulated channel header text.
    header: String,
    /// Captured payload body.
    payload: String,
    scanner: JsonScanner,
    removed: usize,
    /// Header bytes drained but not yet counted as removed; whether the
    /// mention inside them reappears is only known once the payload resolves.
    pending: usize,
    finished: bool,
    absorb_orphan_ends: bool,
    #[cfg(any(test, feature = "fuzzing"))]
    panic_on_stall: bool,
}

impl Default for StreamFilter {
    fn default() -> Self {
        Self::new(FilterOptions::default())
    }
}

impl StreamFilter {
    /// Creates a new filter with the given options.
    #[must_use]
    pub fn new(options: FilterOptions) -> Self {
        Self {
            buf: String::new(),
            state: State::Text,
            bol: true,
            header: String::new(),
            payload: String::new(),
            scanner: JsonScanner::new(),
            removed: 0,
            pending: 0,
            finished: false,
            absorb_orphan_ends: options.absorb_orphan_end_markers,
            #[cfg(any(test, feature = "fuzzing"))]
            panic_on_stall: options.panic_on_stall,
        }
    }

    /// Processes one chunk and returns all text safe to display immediately.
    pub fn feed(&mut self, chunk: &str) -> String {
        self.feed_with_stats(chunk).text
    }

    /// Like [`feed`](Self::feed), additionally reporting how many bytes were
    /// dropped as noise.
    pub fn feed_with_stats(&mut self, chunk: &str) -> FeedOutput {
        debug_assert!(!self.finished, "feed after flush");
        if self.finished {
            return FeedOutput::default();
        }
        self.buf.push_str(chunk);
        let mut text = String::new();
        self.run(&mut text, false);
        trace!(
            chunk = chunk.len(),
            emitted = text.len(),
            carry = self.buf.len(),
            "feed"
        );
        FeedOutput {
            text,
            removed: mem::take(&mut self.removed),
        }
    }

    /// Finalizes the stream, resolving every pending construct: unterminated
    /// fences and unwrap blocks are emitted verbatim, unterminated drop
    /// regions are discarded. A second call returns the empty string.
    pub fn flush(&mut self) -> String {
        if self.finished {
            return String::new();
        }
        self.finished = true;
        let mut text = String::new();
        self.run(&mut text, true);
        trace!(emitted = text.len(), "flush");
        self.buf.clear();
        self.header.clear();
        self.payload.clear();
        self.state = State::Text;
        self.removed = 0;
        self.pending = 0;
        text
    }

    fn run(&mut self, out: &mut String, end: bool) {
        let mut stalled = 0u32;
        loop {
            let buffered = self.buf.len();
            let emitted = out.len();
            let state = mem::replace(&mut self.state, State::Text);
            let step = match state {
                State::Text => self.step_text(out, end),
                State::Fence => self.step_fence(out, end),
                State::Block { kind, depth } => self.step_block(kind, depth, out, end),
                State::Header => self.step_header(end),
                State::PayloadStart { mode, mention } => {
                    self.step_payload_start(mode, mention, end)
                }
                State::JsonBody { mode, mention } => self.step_json_body(mode, mention, out, end),
                State::LineBody { mode, mention } => self.step_line_body(mode, mention, out, end),
                State::PlainBody { mention, prefixed } => {
                    self.step_plain_body(mention, prefixed, out, end)
                }
                State::DropLine => self.step_drop_line(end),
            };
            match step {
                Step::NeedMore => break,
                Step::Continue => {
                    if self.buf.len() == buffered && out.len() == emitted {
                        stalled += 1;
                        if stalled > STALL_LIMIT {
                            self.force_advance(out);
                            stalled = 0;
                        }
                    } else {
                        stalled = 0;
                    }
                }
            }
        }
    }

    // ----------------------------------------------------------------------
    // State handlers. Each scans without mutating, then applies one action,
    // so the scan position moves monotonically.
    // ----------------------------------------------------------------------

    fn step_text(&mut self, out: &mut String, end: bool) -> Step {
        enum Action {
            /// The whole buffer is literal text.
            All,
            /// Emit the prefix and wait for more input.
            Hold(usize),
            /// A fence opens here.
            Fence(usize),
            /// A state-changing token at `pos` of byte length `len`.
            Tag(usize, Sentinel, usize),
        }

        let mut pos = 0;
        let action = loop {
            if pos >= self.buf.len() {
                break Action::All;
            }
            let b = self.buf.as_bytes()[pos];
            if b == b'<' {
                match match_tag(&self.buf[pos..], end) {
                    TagMatch::Token(tok @ (Sentinel::Channel | Sentinel::Start(_)), len) => {
                        break Action::Tag(pos, tok, len);
                    }
                    TagMatch::Token(tok @ Sentinel::End(_), len) => {
                        if self.absorb_orphan_ends {
                            break Action::Tag(pos, tok, len);
                        }
                        // Fail open: an end with no matching start is text.
                        pos += len;
                    }
                    TagMatch::Token(Sentinel::Message, len) => pos += len,
                    TagMatch::NeedMore => break Action::Hold(pos),
                    TagMatch::None => pos += 1,
                }
            } else if b == b'`' && self.line_start(pos) {
                let run = fence::backtick_run(&self.buf, pos);
                if run >= 3 {
                    break Action::Fence(pos);
                }
                if pos + run == self.buf.len() && !end {
                    // A fence may still be arriving.
                    break Action::Hold(pos);
                }
                pos += run;
            } else {
                pos += 1;
            }
        };

        match action {
            Action::All => {
                let n = self.buf.len();
                self.emit(out, n);
                self.state = State::Text;
                Step::NeedMore
            }
            Action::Hold(pos) => {
                self.emit(out, pos);
                self.state = State::Text;
                Step::NeedMore
            }
            Action::Fence(pos) => {
                self.emit(out, pos);
                self.state = State::Fence;
                Step::Continue
            }
            Action::Tag(pos, token, len) => {
                self.emit(out, pos);
                self.discard(len);
                self.state = match token {
                    Sentinel::Channel => {
                        self.header.clear();
                        State::Header
                    }
                    Sentinel::Start(kind) => State::Block { kind, depth: 1 },
                    // Absorbed orphan end marker.
                    _ => State::Text,
                };
                Step::Continue
            }
        }
    }

    fn step_fence(&mut self, out: &mut String, end: bool) -> Step {
        match fence::find_close(&self.buf) {
            Some(close) => {
                self.emit(out, close);
                self.state = State::Text;
                Step::Continue
            }
            None if end => {
                // An unterminated fence is truncated output, not noise.
                debug!(len = self.buf.len(), "unterminated fence emitted verbatim");
                let n = self.buf.len();
                self.emit(out, n);
                self.state = State::Text;
                Step::Continue
            }
            None => {
                self.state = State::Fence;
                Step::NeedMore
            }
        }
    }

    fn step_block(&mut self, kind: BlockKind, depth: u32, out: &mut String, end: bool) -> Step {
        enum Action {
            All,
            Hold(usize),
            Open(usize, usize),
            Close(usize, usize),
        }

        let unwrap = !kind.is_drop();
        let mut pos = 0;
        let action = loop {
            if pos >= self.buf.len() {
                break Action::All;
            }
            if self.buf.as_bytes()[pos] == b'<' {
                match match_tag(&self.buf[pos..], end) {
                    TagMatch::Token(Sentinel::Start(k), len) if k == kind => {
                        break Action::Open(pos, len);
                    }
                    TagMatch::Token(Sentinel::End(k), len) if k == kind => {
                        break Action::Close(pos, len);
                    }
                    // Any other token inside a block is content.
                    TagMatch::Token(_, len) => pos += len,
                    TagMatch::NeedMore => break Action::Hold(pos),
                    TagMatch::None => pos += 1,
                }
            } else {
                pos += 1;
            }
        };

        match action {
            Action::All => {
                let n = self.buf.len();
                self.block_content(unwrap, n, out);
                if end {
                    // Unterminated: drop kinds vanish silently, unwrap kinds
                    // were already emitted as truncated content.
                    self.state = State::Text;
                    Step::Continue
                } else {
                    self.state = State::Block { kind, depth };
                    Step::NeedMore
                }
            }
            Action::Hold(pos) => {
                self.block_content(unwrap, pos, out);
                self.state = State::Block { kind, depth };
                Step::NeedMore
            }
            Action::Open(pos, len) => {
                self.block_content(unwrap, pos, out);
                self.discard(len);
                self.state = State::Block {
                    kind,
                    depth: depth + 1,
                };
                Step::Continue
            }
            Action::Close(pos, len) => {
                self.block_content(unwrap, pos, out);
                self.discard(len);
                self.state = if depth > 1 {
                    State::Block {
                        kind,
                        depth: depth - 1,
                    }
                } else {
                    State::Text
                };
                Step::Continue
            }
        }
    }

    fn block_content(&mut self, unwrap: bool, n: usize, out: &mut String) {
        if unwrap {
            self.emit(out, n);
        } else {
            self.discard(n);
        }
    }

    fn step_header(&mut self, end: bool) -> Step {
        enum Action {
            All,
            Hold(usize),
            Message(usize, usize),
        }

        let mut pos = 0;
        let action = loop {
            if pos >= self.buf.len() {
                break Action::All;
            }
            if self.buf.as_bytes()[pos] == b'<' {
                match match_tag(&self.buf[pos..], end) {
                    TagMatch::Token(Sentinel::Message, len) => break Action::Message(pos, len),
                    // Embedded tokens (e.g. `<|constrain|>`) are header text.
                    TagMatch::Token(_, len) => pos += len,
                    TagMatch::NeedMore => break Action::Hold(pos),
                    TagMatch::None => pos += 1,
                }
            } else {
                pos += 1;
            }
        };

        let (take, message) = match action {
            Action::Message(pos, len) => (pos, Some(len)),
            Action::Hold(pos) => (pos, None),
            Action::All => (self.buf.len(), None),
        };
        self.header.push_str(&self.buf[..take]);
        self.defer(take);

        if let Some(len) = message {
            self.defer(len);
            let mode = header::classify(&self.header);
            let mention = match mode {
                PayloadMode::FinalPlain | PayloadMode::FinalJson => {
                    header::extract_mention(&self.header)
                }
                _ => None,
            };
            if mention.is_none() {
                self.settle();
            }
            trace!(?mode, mention = mention.as_deref().unwrap_or(""), "channel classified");
            self.header.clear();
            self.state = State::PayloadStart { mode, mention };
            return Step::Continue;
        }
        if end {
            // Routing scaffolding that never completed; nothing to show.
            debug!(len = self.header.len(), "unterminated channel header dropped");
            self.settle();
            self.header.clear();
            self.state = State::Text;
            return Step::Continue;
        }
        self.state = State::Header;
        Step::NeedMore
    }

    fn step_payload_start(
        &mut self,
        mode: PayloadMode,
        mention: Option<String>,
        end: bool,
    ) -> Step {
        match mode {
            PayloadMode::FinalPlain => {
                self.state = State::PlainBody {
                    mention,
                    prefixed: false,
                };
                Step::Continue
            }
            PayloadMode::Unknown => {
                self.state = State::DropLine;
                Step::Continue
            }
            PayloadMode::FinalJson | PayloadMode::CommentaryJson | PayloadMode::ToolformerDrop => {
                let skip = self
                    .buf
                    .bytes()
                    .take_while(|&b| b == b' ' || b == b'\t')
                    .count();
                let exhausted = skip == self.buf.len();
                self.discard(skip);
                if exhausted && !end {
                    self.state = State::PayloadStart { mode, mention };
                    return Step::NeedMore;
                }
                match self.buf.as_bytes().first() {
                    Some(b'{' | b'[' | b'"') => {
                        self.scanner = JsonScanner::new();
                        self.payload.clear();
                        self.state = State::JsonBody { mode, mention };
                    }
                    Some(_) if mode == PayloadMode::ToolformerDrop => {
                        self.state = State::DropLine;
                    }
                    Some(_) => {
                        self.payload.clear();
                        self.state = State::LineBody { mode, mention };
                    }
                    // Stream ended right after `<|message|>`.
                    None => {
                        self.settle();
                        self.state = State::Text;
                    }
                }
                Step::Continue
            }
        }
    }

    fn step_json_body(
        &mut self,
        mode: PayloadMode,
        mention: Option<String>,
        out: &mut String,
        end: bool,
    ) -> Step {
        match self.scanner.step(&self.buf) {
            ScanStep::Complete(n) => {
                if mode == PayloadMode::ToolformerDrop {
                    self.discard(n);
                } else {
                    self.payload.push_str(&self.buf[..n]);
                    self.drain(n);
                    let body = mem::take(&mut self.payload);
                    let rendered = render::render_json(&body);
                    self.emit_rendered(out, mention.as_deref(), &body, rendered.as_deref());
                }
                self.state = State::Text;
                Step::Continue
            }
            ScanStep::Incomplete => {
                let n = self.buf.len();
                if mode == PayloadMode::ToolformerDrop {
                    self.discard(n);
                } else {
                    self.payload.push_str(&self.buf[..n]);
                    self.drain(n);
                }
                if end {
                    if mode != PayloadMode::ToolformerDrop {
                        // Truncated JSON cannot parse; fall back to echo
                        // extraction, then the raw body.
                        let body = mem::take(&mut self.payload);
                        let rendered = render::render_opaque(&body);
                        self.emit_rendered(out, mention.as_deref(), &body, Some(&rendered));
                    }
                    self.state = State::Text;
                    Step::Continue
                } else {
                    self.state = State::JsonBody { mode, mention };
                    Step::NeedMore
                }
            }
        }
    }

    fn step_line_body(
        &mut self,
        mode: PayloadMode,
        mention: Option<String>,
        out: &mut String,
        end: bool,
    ) -> Step {
        if let Some(i) = self.buf.find('\n') {
            self.payload.push_str(&self.buf[..i]);
            // The newline is not part of the payload; Text emits it.
            self.drain(i);
            let body = mem::take(&mut self.payload);
            let rendered = render::render_opaque(&body);
            self.emit_rendered(out, mention.as_deref(), &body, Some(&rendered));
            self.state = State::Text;
            Step::Continue
        } else {
            let n = self.buf.len();
            self.payload.push_str(&self.buf[..n]);
            self.drain(n);
            if end {
                let body = mem::take(&mut self.payload);
                let rendered = render::render_opaque(&body);
                self.emit_rendered(out, mention.as_deref(), &body, Some(&rendered));
                self.state = State::Text;
                Step::Continue
            } else {
                self.state = State::LineBody { mode, mention };
                Step::NeedMore
            }
        }
    }

    fn step_plain_body(
        &mut self,
        mention: Option<String>,
        prefixed: bool,
        out: &mut String,
        end: bool,
    ) -> Step {
        enum Action {
            All,
            Hold(usize),
            Newline(usize),
            Channel(usize),
        }

        let mut pos = 0;
        let action = loop {
            if pos >= self.buf.len() {
                break Action::All;
            }
            let b = self.buf.as_bytes()[pos];
            if b == b'\n' {
                break Action::Newline(pos);
            }
            if b == b'<' {
                match match_tag(&self.buf[pos..], end) {
                    TagMatch::Token(Sentinel::Channel, _) => break Action::Channel(pos),
                    // Other tokens inside a plain payload are body text.
                    TagMatch::Token(_, len) => pos += len,
                    TagMatch::NeedMore => break Action::Hold(pos),
                    TagMatch::None => pos += 1,
                }
            } else {
                pos += 1;
            }
        };

        match action {
            Action::All => {
                let n = self.buf.len();
                let prefixed = self.plain_emit(out, n, mention.as_deref(), prefixed);
                if end {
                    // The remainder was valid truncated content, now emitted.
                    self.settle();
                    self.state = State::Text;
                    Step::Continue
                } else {
                    self.state = State::PlainBody { mention, prefixed };
                    Step::NeedMore
                }
            }
            Action::Hold(pos) => {
                let prefixed = self.plain_emit(out, pos, mention.as_deref(), prefixed);
                self.state = State::PlainBody { mention, prefixed };
                Step::NeedMore
            }
            Action::Newline(pos) => {
                self.plain_emit(out, pos + 1, mention.as_deref(), prefixed);
                self.state = State::Text;
                Step::Continue
            }
            Action::Channel(pos) => {
                // Leave the token for the text state to re-match.
                self.plain_emit(out, pos, mention.as_deref(), prefixed);
                self.settle();
                self.state = State::Text;
                Step::Continue
            }
        }
    }

    fn step_drop_line(&mut self, end: bool) -> Step {
        if let Some(i) = self.buf.find('\n') {
            self.discard(i + 1);
            self.state = State::Text;
            Step::Continue
        } else {
            let n = self.buf.len();
            self.discard(n);
            if end {
                self.state = State::Text;
                Step::Continue
            } else {
                self.state = State::DropLine;
                Step::NeedMore
            }
        }
    }

    // ----------------------------------------------------------------------
    // Buffer primitives. Every consumption goes through `drain` so the
    // beginning-of-line flag stays true to the stream.
    // ----------------------------------------------------------------------

    fn line_start(&self, pos: usize) -> bool {
        if pos == 0 {
            self.bol
        } else {
            self.buf.as_bytes()[pos - 1] == b'\n'
        }
    }

    fn drain(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.bol = self.buf.as_bytes()[n - 1] == b'\n';
        self.buf.drain(..n);
    }

    fn emit(&mut self, out: &mut String, n: usize) {
        if n == 0 {
            return;
        }
        out.push_str(&self.buf[..n]);
        self.drain(n);
    }

    fn discard(&mut self, n: usize) {
        self.removed += n;
        self.drain(n);
    }

    /// Drains bytes whose removed count is settled later.
    fn defer(&mut self, n: usize) {
        self.pending += n;
        self.drain(n);
    }

    /// Counts all deferred bytes as removed.
    fn settle(&mut self) {
        self.removed += mem::take(&mut self.pending);
    }

    /// Emits a rendered payload, prefixing the mention when the payload
    /// produced visible text.
    fn emit_rendered(
        &mut self,
        out: &mut String,
        mention: Option<&str>,
        body: &str,
        text: Option<&str>,
    ) {
        let text = text.unwrap_or("");
        let pending = mem::take(&mut self.pending);
        if text.is_empty() {
            self.removed += pending + body.len();
            return;
        }
        let mut restored = 0usize;
        if let Some(m) = mention {
            out.push_str(m);
            restored += m.len();
            if !text.starts_with(char::is_whitespace) {
                out.push(' ');
                restored += 1;
            }
        }
        out.push_str(text);
        // The mention bytes arrived inside the deferred header; count the
        // header net of what reappeared.
        self.removed += pending.saturating_sub(restored);
        self.removed += body.len().saturating_sub(text.len());
    }

    /// Emits `n` bytes of plain payload, putting the mention ahead of the
    /// first non-empty emission. Returns the updated prefix flag.
    fn plain_emit(&mut self, out: &mut String, n: usize, mention: Option<&str>, prefixed: bool) -> bool {
        if n == 0 {
            return prefixed;
        }
        if !prefixed {
            let pending = mem::take(&mut self.pending);
            if let Some(m) = mention {
                out.push_str(m);
                let mut restored = m.len();
                if !self.buf.starts_with(char::is_whitespace) {
                    out.push(' ');
                    restored += 1;
                }
                self.removed += pending.saturating_sub(restored);
            } else {
                self.removed += pending;
            }
        }
        self.emit(out, n);
        true
    }

    /// Last-resort advance when no handler makes progress on a byte.
    fn force_advance(&mut self, out: &mut String) {
        #[cfg(any(test, feature = "fuzzing"))]
        assert!(
            !self.panic_on_stall,
            "filter stalled in state {:?} with {} buffered bytes",
            self.state,
            self.buf.len()
        );
        debug!(state = ?self.state, "forcing one-character advance to break a stall");
        if let Some(c) = self.buf.chars().next() {
            out.push(c);
            self.drain(c.len_utf8());
        }
    }
}
