#![no_main]
use libfuzzer_sys::fuzz_target;
use streamsieve::{FilterOptions, StreamFilter};

fn options(flags: u8) -> FilterOptions {
    FilterOptions {
        absorb_orphan_end_markers: flags & 1 != 0,
        panic_on_stall: true,
    }
}

fn filter(data: &[u8]) {
    if data.len() < 5 {
        return;
    }

    let flags = data[0];
    let split_seed = u64::from(u32::from_le_bytes([data[1], data[2], data[3], data[4]]));
    let data = &data[5..];

    if data.is_empty() {
        return;
    }

    let text = String::from_utf8_lossy(data).into_owned();

    // One-shot reference run.
    let mut reference = StreamFilter::new(options(flags));
    let mut expected = reference.feed(&text);
    expected.push_str(&reference.flush());

    // Use the random number we chose to split the input into chunks:
    let mut chunked = StreamFilter::new(options(flags));
    let mut shown = String::new();
    let mut removed = 0usize;
    for chunk in split_into_safe_chunks(&text, split_seed) {
        let out = chunked.feed_with_stats(chunk);
        shown.push_str(&out.text);
        removed += out.removed;
    }
    shown.push_str(&chunked.flush());

    assert_eq!(shown, expected);
    assert!(shown.len() + removed <= text.len());
    // Flush is terminal and idempotent.
    assert_eq!(chunked.flush(), "");
}

fuzz_target!(|data: &[u8]| filter(data));

/// Split a UTF-8 `&str` into boundary-safe chunks using a deterministic random
/// value to generate splits.
///
/// * `split_seed` may be any `u64`.
/// * Each chunk is at least one byte.
/// * Every slice ends on a valid UTF-8 boundary, so it can't panic.
fn split_into_safe_chunks(serialized: &str, split_seed: u64) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let len = serialized.len();

    while start < len {
        let remaining = len - start;

        // Derive a candidate size from the fixed seed.
        let mut size = (split_seed as usize % remaining) + 1;

        // Bump `size` forward until it lands on a char boundary
        // (or hits the end of the string, which is always a boundary).
        while start + size < len && !serialized.is_char_boundary(start + size) {
            size += 1;
        }

        chunks.push(&serialized[start..start + size]);
        start += size;
    }

    chunks
}
