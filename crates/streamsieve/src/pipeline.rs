//! Composable `feed`/`flush` passes.
//!
//! A [`StreamPass`] is any chunked text transform that may hold carry between
//! calls. [`Pipeline`] chains several passes so the caller does not have to
//! get the flush ordering right: at end of stream each pass's held output
//! must travel through every later pass's `feed` before that pass is itself
//! flushed, or carried text silently disappears.

use crate::filter::StreamFilter;

/// A chunked text transform with carry.
pub trait StreamPass {
    /// Processes one chunk, returning the text that is final.
    fn feed(&mut self, chunk: &str) -> String;
    /// Finalizes the stream, returning any held text. Called once, after the
    /// last `feed`.
    fn flush(&mut self) -> String;
}

impl StreamPass for StreamFilter {
    fn feed(&mut self, chunk: &str) -> String {
        StreamFilter::feed(self, chunk)
    }

    fn flush(&mut self) -> String {
        StreamFilter::flush(self)
    }
}

/// Runs passes in sequence, each consuming the previous pass's output.
///
/// # Examples
///
/// ```rust
/// use streamsieve::{Pipeline, StreamFilter, StreamPass};
///
/// let mut pipeline = Pipeline::new(vec![
///     Box::new(StreamFilter::default()) as Box<dyn StreamPass>,
///     Box::new(StreamFilter::default()),
/// ]);
/// let mut shown = pipeline.feed("a<|memory_start|>x<|memory_end|>b");
/// shown.push_str(&pipeline.flush());
/// assert_eq!(shown, "ab");
/// ```
pub struct Pipeline {
    passes: Vec<Box<dyn StreamPass>>,
}

impl Pipeline {
    /// Creates a pipeline over the given passes, first pass first.
    #[must_use]
    pub fn new(passes: Vec<Box<dyn StreamPass>>) -> Self {
        Self { passes }
    }

    /// Feeds a chunk through every pass in order.
    pub fn feed(&mut self, chunk: &str) -> String {
        let mut text = chunk.to_string();
        for pass in &mut self.passes {
            text = pass.feed(&text);
        }
        text
    }

    /// Flushes the passes in order. Each pass's flush output is fed to the
    /// passes after it before they are flushed themselves.
    pub fn flush(&mut self) -> String {
        let mut carried = String::new();
        for i in 0..self.passes.len() {
            let mut text = if carried.is_empty() {
                String::new()
            } else {
                self.passes[i].feed(&carried)
            };
            text.push_str(&self.passes[i].flush());
            carried = text;
        }
        carried
    }
}

impl StreamPass for Pipeline {
    fn feed(&mut self, chunk: &str) -> String {
        Pipeline::feed(self, chunk)
    }

    fn flush(&mut self) -> String {
        Pipeline::flush(self)
    }
}
