//! A streaming, incremental display filter for language-model output.
//!
//! Model responses arrive as an arbitrarily-chunked text stream that mixes
//! user-facing prose with machine scaffolding: `<|analysis_start|>` reasoning
//! dumps, tool-call envelopes, and `<|channel|>` sections whose payloads bury
//! the visible text inside JSON or shell-echo strings. [`StreamFilter`]
//! recovers exactly the displayable portion, incrementally: output is
//! identical whether the stream is fed one character or all at once, and no
//! text is duplicated, lost, or reordered across chunk boundaries.
//!
//! ```rust
//! use streamsieve::{FilterOptions, StreamFilter};
//!
//! let mut filter = StreamFilter::new(FilterOptions::default());
//! let mut shown = String::new();
//! for chunk in ["A<|memory_st", "art|>DUMP<|memory_end|>B"] {
//!     shown.push_str(&filter.feed(chunk));
//! }
//! shown.push_str(&filter.flush());
//! assert_eq!(shown, "AB");
//! ```
//!
//! The filter never returns an error: every irregularity degrades to a
//! documented fallback (unknown sentinels pass through as text, truncated
//! fences and unwrap blocks are emitted verbatim, malformed JSON payloads
//! fall back to echo extraction and then to the raw body).

mod fence;
mod filter;
mod header;
mod options;
mod pipeline;
mod render;
mod scan;
mod sentinel;

#[cfg(test)]
mod tests;

pub use filter::{FeedOutput, StreamFilter};
pub use header::PayloadMode;
pub use options::FilterOptions;
pub use pipeline::{Pipeline, StreamPass};
pub use sentinel::BlockKind;
