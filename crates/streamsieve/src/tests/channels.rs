//! Channel classification, payload rendering, and mention prefixing.

use rstest::rstest;

use super::chunk_utils::{run_chunked, run_one_shot};

#[rstest]
#[case("<|channel|>final<|message|>Hi there", "Hi there")]
#[case("<|channel|>FINAL<|message|>case folded", "case folded")]
#[case("<|channel|>final @@bob<|message|>Hi", "@@bob Hi")]
#[case("<|channel|>final @@bob<|message|> pre-spaced", "@@bob pre-spaced")]
#[case("<|channel|>final ##src/lib.rs<|message|>see file", "##src/lib.rs see file")]
fn plain_final_payloads(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(run_one_shot(input), expected);
    assert_eq!(run_chunked(input, 1), expected);
    assert_eq!(run_chunked(input, 7), expected);
}

#[test]
fn plain_payload_ends_at_newline() {
    assert_eq!(
        run_one_shot("<|channel|>final<|message|>line\nrest is text"),
        "line\nrest is text"
    );
}

#[test]
fn plain_payload_ends_at_next_channel() {
    assert_eq!(
        run_one_shot("<|channel|>final<|message|>Hi<|channel|>final<|message|>Bye"),
        "HiBye"
    );
}

#[rstest]
#[case("{\"stdout\":\"out!\"}", "out!")]
#[case("{\"output\":\"second\",\"stdout\":\"first\"}", "first")]
#[case("{\"message\":\"msg\"}", "msg")]
#[case("{\"result\":\"res\"}", "res")]
#[case("{\"cmd\":\"echo 'quoted arg'\"}", "quoted arg")]
#[case("{\"cmd\":\"echo bare words\"}", "bare words")]
fn commentary_json_extraction(#[case] payload: &str, #[case] expected: &str) {
    let input = format!("<|channel|>commentary<|message|>{payload}");
    assert_eq!(run_one_shot(&input), expected);
    assert_eq!(run_chunked(&input, 3), expected);
}

#[test]
fn final_json_keeps_the_mention() {
    assert_eq!(
        run_one_shot("<|channel|>final |json @@user<|message|>{\"stdout\":\"Hi!\"}"),
        "@@user Hi!"
    );
}

#[test]
fn commentary_never_takes_a_mention() {
    assert_eq!(
        run_one_shot("<|channel|>commentary @@user<|message|>{\"stdout\":\"plain\"}"),
        "plain"
    );
}

#[test]
fn machine_only_json_renders_nothing() {
    assert_eq!(
        run_one_shot("a<|channel|>commentary<|message|>{\"cmd\":1}b"),
        "ab"
    );
    assert_eq!(
        run_one_shot("a<|channel|>final |json<|message|>[1,2,3]b"),
        "ab"
    );
}

#[test]
fn toolformer_json_is_dropped() {
    let input = "x<|channel|>commentary to=functions sh<|message|>{\"cmd\":\"rm -rf /\"} y";
    assert_eq!(run_one_shot(input), "x y");
    assert_eq!(run_chunked(input, 2), "x y");
}

#[test]
fn toolformer_without_json_drops_to_newline() {
    assert_eq!(
        run_one_shot("x<|channel|>commentary to=functions<|message|>not json here\nY"),
        "xY"
    );
}

#[test]
fn unknown_header_drops_to_newline() {
    assert_eq!(
        run_one_shot("<|channel|>mystery<|message|>gone\nkept"),
        "kept"
    );
    // Without a newline the payload never ends; flush discards it.
    assert_eq!(run_one_shot("<|channel|>mystery<|message|>gone"), "");
}

#[test]
fn non_json_commentary_body_falls_back_to_echo_scan() {
    assert_eq!(
        run_one_shot("<|channel|>commentary<|message|>run echo \"hi\" now\nZ"),
        "hi\nZ"
    );
}

#[test]
fn non_json_commentary_body_without_echo_is_raw() {
    assert_eq!(
        run_one_shot("<|channel|>commentary<|message|>opaque words\nZ"),
        "opaque words\nZ"
    );
}

#[test]
fn unparseable_json_payload_is_raw() {
    assert_eq!(
        run_one_shot("<|channel|>commentary<|message|>{broken}"),
        "{broken}"
    );
}

#[test]
fn truncated_json_payload_falls_back_at_flush() {
    assert_eq!(
        run_one_shot("<|channel|>commentary<|message|>{\"stdout\":\"cut"),
        "{\"stdout\":\"cut"
    );
    assert_eq!(
        run_one_shot("<|channel|>commentary to=functions<|message|>{\"cmd\":\"cut"),
        ""
    );
}

#[test]
fn unterminated_header_is_dropped_at_flush() {
    assert_eq!(run_one_shot("seen<|channel|>final never messaged"), "seen");
}

#[test]
fn header_split_across_chunks() {
    for size in 1..=12 {
        assert_eq!(
            run_chunked("<|channel|>final <|constrain|>@@user<|message|>Hello!", size),
            "@@user Hello!",
            "chunk size {size}"
        );
    }
}

#[test]
fn json_payload_split_across_chunks() {
    for size in 1..=10 {
        assert_eq!(
            run_chunked(
                "<|channel|>commentary<|message|>{\"stdout\":\"chunk proof\"} t",
                size
            ),
            "chunk proof t",
            "chunk size {size}"
        );
    }
}
