use quickcheck::QuickCheck;

use super::chunk_utils::{run_one_shot, strict_filter};

/// Fragments the generator assembles streams from. Skewed towards the
/// constructs with carry states: sentinel markers split mid-token, fences,
/// channel headers, and partial JSON bodies.
const ATOMS: &[&str] = &[
    "plain text ",
    "\n",
    "<",
    "<|",
    "<|memory_start|>",
    "<|memory_end|>",
    "<|analysis_start|>",
    "<|analysis_end|>",
    "<|tool_call_start|>",
    "<|tool_call_end|>",
    "<|tool_result_start|>",
    "<|tool_result_end|>",
    "<|final_start|>",
    "<|final_end|>",
    "<|channel|>",
    "<|message|>",
    "final",
    "commentary",
    " to=functions",
    " @@alice",
    " ##notes/today.md",
    "```",
    "```\ncode\n```",
    "`",
    "``",
    "{\"stdout\":\"ok\"}",
    "{\"cmd\":\"echo \\\"hi\\\"\"}",
    "{\"status\":",
    "\"done\"}",
    "[1,2,",
    "3]",
    "\"bare string\"",
    "hidden scratch",
    "😊 multibyte 🚀",
];

/// Property: the displayed text must not depend on how the stream is
/// partitioned into chunks, and the filter never reports more bytes (shown
/// plus removed) than it was fed.
#[test]
fn partition_invariance_quickcheck() {
    fn prop(atoms: Vec<u8>, splits: Vec<usize>) -> bool {
        let input: String = atoms
            .iter()
            .map(|&a| ATOMS[usize::from(a) % ATOMS.len()])
            .collect();

        let expected = run_one_shot(&input);

        let mut filter = strict_filter();
        let mut shown = String::new();
        let mut removed = 0usize;

        // Feed the stream in arbitrarily sized UTF-8-safe chunks (derived
        // from `splits`).
        let chars: Vec<char> = input.chars().collect();
        let mut idx = 0;
        let mut remaining = chars.len();

        for s in splits {
            if remaining == 0 {
                break;
            }
            let size = 1 + (s % remaining);
            let end = idx + size;
            let chunk: String = chars[idx..end].iter().collect();
            let out = filter.feed_with_stats(&chunk);
            shown.push_str(&out.text);
            removed += out.removed;
            idx = end;
            remaining -= size;
        }
        if remaining > 0 {
            let chunk: String = chars[idx..].iter().collect();
            let out = filter.feed_with_stats(&chunk);
            shown.push_str(&out.text);
            removed += out.removed;
        }

        shown.push_str(&filter.flush());

        shown == expected && shown.len() + removed <= input.len()
    }

    #[cfg(not(miri))]
    let tests = if is_ci::cached() { 10_000 } else { 1_000 };
    #[cfg(miri)]
    let tests = 10;

    QuickCheck::new()
        .tests(tests)
        .quickcheck(prop as fn(Vec<u8>, Vec<usize>) -> bool);
}
