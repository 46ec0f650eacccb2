//! Extraction and repair of JSON embedded in model responses.
//!
//! Models are instructed to answer with JSON only, but responses routinely
//! arrive wrapped in prose or code fences, with trailing commas, or cut off
//! mid-structure. The decode pipeline is: brace-span extraction →
//! structural repair → strict parse → raw-slice fallback parse → typed
//! failure carrying the (truncated) raw text.

use parlance_core::error::Error;
use serde::de::DeserializeOwned;

/// How much raw response text a FormatError carries for user display.
const RAW_EXCERPT_CHARS: usize = 300;

/// Slice the response between the first `{` and the last `}`.
///
/// Returns `None` when no non-empty span exists.
pub fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// Structural repair of near-JSON.
///
/// Tolerates trailing commas, unterminated strings, and truncation that
/// dropped closing braces/brackets; mismatched closers are dropped. The
/// output is not guaranteed to parse — callers fall back to the raw slice.
pub fn repair_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in input.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
            } else if c == '\\' {
                escaped = true;
                out.push(c);
            } else if c == '"' {
                in_string = false;
                out.push(c);
            } else {
                out.push(c);
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' => {
                stack.push('}');
                out.push(c);
            }
            '[' => {
                stack.push(']');
                out.push(c);
            }
            '}' | ']' => {
                drop_trailing_comma(&mut out);
                if stack.last() == Some(&c) {
                    stack.pop();
                    out.push(c);
                }
                // A closer that doesn't match the open scope is an
                // artifact; drop it.
            }
            _ => out.push(c),
        }
    }

    if in_string {
        out.push('"');
    }
    drop_trailing_comma(&mut out);
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

/// Remove a dangling comma at the (whitespace-trimmed) end of the buffer.
fn drop_trailing_comma(out: &mut String) {
    let content_len = out.trim_end().len();
    if out[..content_len].ends_with(',') {
        let tail = out[content_len..].to_string();
        out.truncate(content_len - 1);
        out.push_str(&tail);
    }
}

/// Decode a typed structure from an untrusted model response.
///
/// Runs the full extract → repair → parse → fallback chain and maps both
/// terminal failures to [`Error::Format`] with the raw text truncated for
/// user display.
pub fn parse_lenient<T: DeserializeOwned>(raw: &str) -> Result<T, Error> {
    let span = extract_json_span(raw).ok_or_else(|| Error::Format {
        detail: "no JSON object in response".into(),
        raw: truncate_chars(raw, RAW_EXCERPT_CHARS),
    })?;

    let repaired = repair_json(span);
    match serde_json::from_str(&repaired) {
        Ok(value) => Ok(value),
        Err(repair_err) => match serde_json::from_str(span) {
            Ok(value) => Ok(value),
            Err(_) => Err(Error::Format {
                detail: repair_err.to_string(),
                raw: truncate_chars(raw, RAW_EXCERPT_CHARS),
            }),
        },
    }
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when
/// anything was cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[serde(default)]
        expressions: Vec<ProbeEntry>,
    }

    #[derive(Debug, Deserialize)]
    struct ProbeEntry {
        id: i64,
    }

    #[test]
    fn span_from_prose_wrapped_response() {
        let raw = r#"Sure! {"expressions": []} Thanks"#;
        assert_eq!(extract_json_span(raw), Some(r#"{"expressions": []}"#));
    }

    #[test]
    fn span_absent_without_braces() {
        assert!(extract_json_span("no json here").is_none());
        assert!(extract_json_span("}{").is_none());
        assert!(extract_json_span("").is_none());
    }

    #[test]
    fn repair_removes_trailing_commas() {
        let repaired = repair_json(r#"{"expressions": [{"id": 1,},]}"#);
        let parsed: Probe = serde_json::from_str(&repaired).unwrap();
        assert_eq!(parsed.expressions.len(), 1);
        assert_eq!(parsed.expressions[0].id, 1);
    }

    #[test]
    fn repair_closes_truncated_structures() {
        let repaired = repair_json(r#"{"expressions": [{"id": 1"#);
        let parsed: Probe = serde_json::from_str(&repaired).unwrap();
        assert_eq!(parsed.expressions[0].id, 1);
    }

    #[test]
    fn repair_closes_unterminated_string() {
        let repaired = repair_json(r#"{"summary": "cut off"#);
        let value: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value["summary"], "cut off");
    }

    #[test]
    fn repair_drops_mismatched_closers() {
        let repaired = repair_json(r#"{"a": [1, 2}]"#);
        let value: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value["a"][1], 2);
    }

    #[test]
    fn repair_leaves_valid_json_alone() {
        let input = r#"{"a": "b, c", "d": [1, 2]}"#;
        assert_eq!(repair_json(input), input);
    }

    #[test]
    fn repair_ignores_braces_inside_strings() {
        let input = r#"{"text": "a } b { c"}"#;
        assert_eq!(repair_json(input), input);
    }

    #[test]
    fn lenient_parse_of_fenced_response() {
        let raw = "```json\n{\"expressions\": [{\"id\": 3}]}\n```";
        let parsed: Probe = parse_lenient(raw).unwrap();
        assert_eq!(parsed.expressions[0].id, 3);
    }

    #[test]
    fn lenient_parse_no_braces_is_format_error() {
        let err = parse_lenient::<Probe>("I could not produce JSON").unwrap_err();
        match err {
            Error::Format { detail, raw } => {
                assert!(detail.contains("no JSON object"));
                assert!(raw.contains("could not"));
            }
            other => panic!("expected Format error, got {other:?}"),
        }
    }

    #[test]
    fn lenient_parse_unrecoverable_keeps_truncated_raw() {
        let garbage = format!("{{{}", "x".repeat(500));
        let err = parse_lenient::<Probe>(&garbage).unwrap_err();
        match err {
            Error::Format { raw, .. } => {
                assert!(raw.chars().count() <= 303); // 300 + ellipsis
            }
            other => panic!("expected Format error, got {other:?}"),
        }
    }

    #[test]
    fn truncate_is_char_boundary_safe() {
        let s = "表达方式".repeat(100);
        let cut = truncate_chars(&s, 10);
        assert_eq!(cut.chars().count(), 13); // 10 + "..."
    }
}
