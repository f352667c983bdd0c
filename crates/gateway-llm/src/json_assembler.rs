//! C6 — Incremental JSON Assembler (§4.6): SSE frame boundaries are not guaranteed to
//! line up with JSON object boundaries for every provider (notably base64-image
//! payloads over 100 KB), so each streaming provider feeds its raw event data through
//! [`try_assemble`] instead of parsing every SSE event in isolation.
//!
//! No teacher counterpart; built fresh in the teacher's style of small,
//! independently unit-testable pure functions (as in `convert/anthropic.rs`'s helper
//! functions) living alongside the streaming transformer modules that use it.

const LARGE_PAYLOAD_THRESHOLD: usize = 100_000;
const EDGE_SCAN_LEN: usize = 8_000;

/// Fast, necessary-but-not-sufficient check for whether `buf` could be one complete
/// JSON value. The caller still runs a real parse once this returns `true`.
#[must_use]
pub fn might_be_complete_json(buf: &str) -> bool {
    let trimmed = buf.trim();
    if trimmed.is_empty() {
        return false;
    }

    let first = trimmed.as_bytes()[0];
    let last = trimmed.as_bytes()[trimmed.len() - 1];
    let opens = matches!(first, b'{' | b'[');
    let closes = matches!(last, b'}' | b']');
    if !opens || !closes {
        return false;
    }

    if trimmed.len() < LARGE_PAYLOAD_THRESHOLD {
        let (depth, in_string) = scan_depth(trimmed);
        depth == 0 && !in_string
    } else {
        balanced_edge_scan(trimmed)
    }
}

/// Counts `{`/`}`/`[`/`]` outside of string literals, respecting `\`-escaped quotes.
/// Returns the final depth and whether the scan ended inside an open string.
fn scan_depth(s: &str) -> (i64, bool) {
    let mut depth = 0i64;
    let mut in_string = false;
    let mut escaped = false;
    for ch in s.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth -= 1,
            _ => {}
        }
    }
    (depth, in_string)
}

/// Counts closing tokens minus opening tokens seen while scanning `s` back to front,
/// outside of string literals (a quote's escapement is still decided by counting the
/// backslashes immediately preceding it in forward order).
fn reverse_scan_closes(s: &str) -> i64 {
    let chars: Vec<char> = s.chars().collect();
    let mut closes = 0i64;
    let mut in_string = false;
    let mut i = chars.len();
    while i > 0 {
        i -= 1;
        let ch = chars[i];
        if in_string {
            if ch == '"' && !quote_is_escaped(&chars, i) {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '}' | ']' => closes += 1,
            '{' | '[' => closes -= 1,
            _ => {}
        }
    }
    closes
}

fn quote_is_escaped(chars: &[char], quote_idx: usize) -> bool {
    let mut backslashes = 0;
    let mut j = quote_idx;
    while j > 0 && chars[j - 1] == '\\' {
        backslashes += 1;
        j -= 1;
    }
    backslashes % 2 == 1
}

/// Above the large-payload threshold, only the first/last [`EDGE_SCAN_LEN`] characters
/// are scanned: forward-opens (structural depth reached before running into the
/// payload's long string) must equal reverse-closes (closing tokens seen scanning the
/// tail back to the same string) for the buffer to look balanced.
fn balanced_edge_scan(s: &str) -> bool {
    let head: String = s.chars().take(EDGE_SCAN_LEN).collect();
    let total_chars = s.chars().count();
    let tail: String = s.chars().skip(total_chars.saturating_sub(EDGE_SCAN_LEN)).collect();

    let (forward_opens, _) = scan_depth(&head);
    let reverse_closes = reverse_scan_closes(&tail);
    forward_opens == reverse_closes
}

/// Appends `chunk` to `buffer` and returns the accumulated text once it might be a
/// complete JSON value, clearing `buffer` either way so the next call starts fresh.
/// Returns `None` while the buffer still looks like a truncated fragment.
pub fn try_assemble(buffer: &mut String, chunk: &str) -> Option<String> {
    buffer.push_str(chunk);
    if might_be_complete_json(buffer) {
        Some(std::mem::take(buffer))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_is_not_complete() {
        assert!(!might_be_complete_json(""));
        assert!(!might_be_complete_json("   "));
    }

    #[test]
    fn rejects_buffers_not_bracketed() {
        assert!(!might_be_complete_json("\"just a string\""));
        assert!(!might_be_complete_json("{\"a\":1"));
    }

    #[test]
    fn accepts_balanced_object() {
        assert!(might_be_complete_json(r#"{"a":1,"b":[1,2,3]}"#));
    }

    #[test]
    fn accepts_balanced_array() {
        assert!(might_be_complete_json("[1,2,3]"));
    }

    #[test]
    fn ignores_braces_inside_strings() {
        assert!(might_be_complete_json(r#"{"a":"}}} not real [["}"#));
    }

    #[test]
    fn respects_escaped_quotes_inside_strings() {
        assert!(might_be_complete_json(r#"{"a":"he said \"hi\" } still open"}"#));
    }

    #[test]
    fn rejects_truncated_object() {
        assert!(!might_be_complete_json(r#"{"a":"truncated value"#));
    }

    #[test]
    fn large_balanced_payload_passes_edge_scan() {
        let filler = "x".repeat(LARGE_PAYLOAD_THRESHOLD);
        let buf = format!(r#"{{"image":"{filler}"}}"#);
        assert!(buf.len() > LARGE_PAYLOAD_THRESHOLD);
        assert!(might_be_complete_json(&buf));
    }

    #[test]
    fn large_truncated_payload_fails_edge_scan() {
        // The value's string never actually closes, so the trailing braces don't
        // balance the leading `{`: forward-opens (1) won't match reverse-closes (3).
        let filler = "x".repeat(LARGE_PAYLOAD_THRESHOLD);
        let buf = format!(r#"{{"image":"{filler}}}}}}}"#);
        assert!(!might_be_complete_json(&buf));
    }

    #[test]
    fn try_assemble_buffers_split_fragments() {
        let mut buffer = String::new();
        assert!(try_assemble(&mut buffer, r#"{"a":"#).is_none());
        let complete = try_assemble(&mut buffer, "1}").expect("fragments joined into complete JSON");
        assert_eq!(complete, r#"{"a":1}"#);
        assert!(buffer.is_empty());
    }

    #[test]
    fn try_assemble_passes_through_already_complete_chunks() {
        let mut buffer = String::new();
        let complete = try_assemble(&mut buffer, r#"{"a":1}"#).expect("already complete");
        assert_eq!(complete, r#"{"a":1}"#);
    }
}
