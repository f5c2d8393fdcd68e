//! Configuration options for the stream filter.

/// Configuration options for [`StreamFilter`](crate::StreamFilter).
///
/// # Examples
///
/// ```rust
/// use streamsieve::{FilterOptions, StreamFilter};
///
/// let mut filter = StreamFilter::new(FilterOptions {
///     absorb_orphan_end_markers: true,
///     ..Default::default()
/// });
/// assert_eq!(filter.feed("a<|memory_end|>b"), "ab");
/// ```
///
/// # Default
///
/// All options default to `false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterOptions {
    /// How to treat a block `_end` marker with no corresponding open block.
    ///
    /// When `false`, the marker is emitted as literal text: the filter fails
    /// open and never invents structure that was not announced. When `true`,
    /// the marker is silently absorbed and counted as removed.
    ///
    /// # Default
    ///
    /// `false`
    pub absorb_orphan_end_markers: bool,

    #[cfg(any(test, feature = "fuzzing"))]
    /// Panic when the engine fails to make progress instead of forcing a
    /// one-character advance.
    ///
    /// Enabled only in test and fuzzing builds to turn a stall into a
    /// backtrace rather than a silently degraded output.
    pub panic_on_stall: bool,
}
