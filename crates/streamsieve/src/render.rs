//! Rendering of captured channel payloads.
//!
//! Once the balanced scanner has delimited a complete payload, this module
//! decides what, if anything, the user should see: a well-known text field
//! from a JSON object, the argument of an `echo` command buried in a `cmd`
//! field, or the raw body when the payload never was JSON in the first place.

use serde_json::Value;

/// Fields that carry user-facing text, in priority order.
const TEXT_FIELDS: &[&str] = &["stdout", "output", "message", "result"];

/// Renders a payload that scanned as a balanced JSON value.
///
/// `None` means the payload is machine-only and nothing is shown. A body
/// that fails to parse despite being balanced falls back to
/// [`render_opaque`].
pub(crate) fn render_json(body: &str) -> Option<String> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => {
            if let Value::Object(map) = &value {
                for field in TEXT_FIELDS {
                    if let Some(Value::String(s)) = map.get(*field) {
                        return Some(s.clone());
                    }
                }
                if let Some(Value::String(cmd)) = map.get("cmd") {
                    if let Some(arg) = extract_echo(cmd) {
                        return Some(arg);
                    }
                }
            }
            None
        }
        Err(_) => Some(render_opaque(body)),
    }
}

/// Renders a payload that is not parseable JSON: the argument of an embedded
/// `echo` command if one is found, otherwise the body unchanged.
pub(crate) fn render_opaque(body: &str) -> String {
    scan_echo(body).unwrap_or_else(|| body.to_string())
}

/// Extracts the argument of a shell command of the form `echo "..."`,
/// `echo '...'`, or `echo <bare text>`.
pub(crate) fn extract_echo(cmd: &str) -> Option<String> {
    let rest = cmd.trim_start().strip_prefix("echo")?;
    if !rest.starts_with(|c: char| c.is_ascii_whitespace()) {
        return None;
    }
    let rest = rest.trim_start();
    match rest.chars().next() {
        Some('"') => unquote(rest, '"', true),
        Some('\'') => unquote(rest, '\'', false),
        Some(_) => {
            // Bare argument: the rest of the line.
            let line = rest.lines().next().unwrap_or("").trim_end();
            if line.is_empty() {
                None
            } else {
                Some(line.to_string())
            }
        }
        None => None,
    }
}

/// Looks for an `echo` command anywhere in free text.
fn scan_echo(text: &str) -> Option<String> {
    let mut from = 0;
    while let Some(i) = text[from..].find("echo") {
        let at = from + i;
        let boundary = at == 0
            || !text[..at].ends_with(|c: char| c.is_ascii_alphanumeric() || c == '_');
        if boundary {
            if let Some(arg) = extract_echo(&text[at..]) {
                return Some(arg);
            }
        }
        from = at + 4;
    }
    None
}

fn unquote(quoted: &str, quote: char, escapes: bool) -> Option<String> {
    let mut out = String::new();
    let mut escaped = false;
    for c in quoted.chars().skip(1) {
        if escaped {
            out.push(c);
            escaped = false;
        } else if escapes && c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(out);
        } else {
            out.push(c);
        }
    }
    // Unterminated quote: not a usable echo argument.
    None
}
