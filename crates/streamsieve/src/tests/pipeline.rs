//! Pipeline driver tests. The flush ordering (feed each pass's held output
//! through the later passes before flushing them) is the part that is easy
//! to get wrong, so these chain passes around one that holds everything
//! until flush.

use crate::{Pipeline, StreamFilter, StreamPass};

use super::chunk_utils::run_one_shot;

/// A pass that emits nothing until flushed. Any driver that flushes passes
/// without re-feeding their output downstream loses the whole stream here.
struct HoldAll {
    held: String,
}

impl HoldAll {
    fn new() -> Self {
        Self {
            held: String::new(),
        }
    }
}

impl StreamPass for HoldAll {
    fn feed(&mut self, chunk: &str) -> String {
        self.held.push_str(chunk);
        String::new()
    }

    fn flush(&mut self) -> String {
        std::mem::take(&mut self.held)
    }
}

const INPUT: &str =
    "head<|analysis_start|>x<|analysis_end|><|channel|>final @@a<|message|>body\ntail";

#[test]
fn three_pass_chain_matches_single_filter() {
    let mut pipeline = Pipeline::new(vec![
        Box::new(HoldAll::new()) as Box<dyn StreamPass>,
        Box::new(StreamFilter::default()),
        Box::new(HoldAll::new()),
    ]);
    let mut shown = pipeline.feed(INPUT);
    shown.push_str(&pipeline.flush());
    assert_eq!(shown, run_one_shot(INPUT));
}

#[test]
fn holding_pass_in_the_middle_still_drains() {
    let mut pipeline = Pipeline::new(vec![
        Box::new(StreamFilter::default()) as Box<dyn StreamPass>,
        Box::new(HoldAll::new()),
        Box::new(StreamFilter::default()),
    ]);
    let mut shown = String::new();
    for chunk in INPUT.as_bytes().chunks(3) {
        shown.push_str(&pipeline.feed(std::str::from_utf8(chunk).unwrap()));
    }
    shown.push_str(&pipeline.flush());
    assert_eq!(shown, run_one_shot(INPUT));
}

#[test]
fn chained_filters_are_transparent_to_clean_text() {
    // A second filter sees only display text, which it must pass through.
    let mut pipeline = Pipeline::new(vec![
        Box::new(StreamFilter::default()) as Box<dyn StreamPass>,
        Box::new(StreamFilter::default()),
        Box::new(StreamFilter::default()),
    ]);
    let mut shown = pipeline.feed(INPUT);
    shown.push_str(&pipeline.flush());
    assert_eq!(shown, run_one_shot(INPUT));
}

#[test]
fn pipelines_nest_as_passes() {
    let inner = Pipeline::new(vec![
        Box::new(HoldAll::new()) as Box<dyn StreamPass>,
        Box::new(StreamFilter::default()),
    ]);
    let mut outer = Pipeline::new(vec![
        Box::new(inner) as Box<dyn StreamPass>,
        Box::new(HoldAll::new()),
    ]);
    let mut shown = outer.feed(INPUT);
    shown.push_str(&outer.flush());
    assert_eq!(shown, run_one_shot(INPUT));
}
