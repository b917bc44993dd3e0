//! The individual recovery strategies, most strict first.
//!
//! Each one is a pure `fn(&str) -> Option<Envelope>`; `None` hands the text to
//! the next strategy in the cascade.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::lexical::{
    escape_bare_quotes, floor_char_boundary, is_closeable, last_unescaped_quote, repair_code,
    static_regex, trim_partial_escape, TryCounts,
};
use super::Envelope;

/// Bytes of reply scanned for a closing `}`/`)` when the code value never ends.
pub const SCAN_WINDOW: usize = 7000;

pub const UNTERMINATED_EXPLANATION: &str = "Component code";
pub const TRUNCATED_EXPLANATION: &str = "Component generated (code may be truncated)";
pub const DEFAULT_TITLE: &str = "Generated Component";
pub const DEFAULT_DESCRIPTION: &str = "Generated component";

static FENCE_RE: OnceLock<Regex> = OnceLock::new();
static CODE_START_RE: OnceLock<Regex> = OnceLock::new();
static EXPLANATION_RE: OnceLock<Regex> = OnceLock::new();
static TITLE_RE: OnceLock<Regex> = OnceLock::new();
static DESCRIPTION_RE: OnceLock<Regex> = OnceLock::new();

fn fence_re() -> &'static Regex {
    static_regex(&FENCE_RE, r"```(?:json)?\s*(\[[\s\S]*?\]|\{[\s\S]*?\})\s*```")
}

fn code_start_re() -> &'static Regex {
    static_regex(&CODE_START_RE, r#""code"\s*:\s*""#)
}

fn explanation_re() -> &'static Regex {
    static_regex(&EXPLANATION_RE, r#""explanation"\s*:"#)
}

fn title_re() -> &'static Regex {
    static_regex(&TITLE_RE, r#""title"\s*:\s*"((?:[^"\\]|\\.)*)""#)
}

fn description_re() -> &'static Regex {
    static_regex(&DESCRIPTION_RE, r#""description"\s*:\s*"((?:[^"\\]|\\.)*)""#)
}

/// An object tagged `ui_component`, or the first such object in an array.
fn accept_value(value: Value) -> Option<Envelope> {
    match value {
        Value::Array(items) => items.into_iter().find_map(accept_object),
        other => accept_object(other),
    }
}

fn accept_object(value: Value) -> Option<Envelope> {
    if value.get("type").and_then(Value::as_str) != Some(super::UI_COMPONENT) {
        return None;
    }
    let envelope: Envelope = serde_json::from_value(value).ok()?;
    if envelope.code.trim().is_empty() {
        return None;
    }
    Some(envelope)
}

/// Parse as-is; the code has to be closeable already.
fn accept_parsed(text: &str) -> Option<Envelope> {
    let envelope = accept_value(serde_json::from_str(text).ok()?)?;
    is_closeable(&envelope.code).then_some(envelope)
}

/// Parse, then repair whatever is structurally wrong with the code.
fn accept_repaired(text: &str) -> Option<Envelope> {
    let mut envelope = accept_value(serde_json::from_str(text).ok()?)?;
    if !is_closeable(&envelope.code) {
        envelope.code = repair_code(&envelope.code)?;
    }
    Some(envelope)
}

/// Decode a JSON string body; raw text when it isn't valid JSON. Raw line
/// breaks are tolerated and an escape cut off at the end is dropped.
fn decode_fragment(fragment: &str) -> String {
    let fragment = trim_partial_escape(fragment);
    let mut quoted = String::with_capacity(fragment.len() + 8);
    quoted.push('"');
    for c in fragment.chars() {
        match c {
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    serde_json::from_str::<String>(&quoted).unwrap_or_else(|_| fragment.to_string())
}

/// 1. The whole reply is the JSON.
pub fn direct_parse(text: &str) -> Option<Envelope> {
    accept_parsed(text.trim())
}

/// 2. JSON inside a ```json fence (or a bare ``` fence).
pub fn fenced_block(text: &str) -> Option<Envelope> {
    fence_re()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| accept_parsed(m.as_str()))
}

/// End offset (inclusive) of the JSON value opening at `start`, counting
/// brackets outside of JSON strings.
fn json_slice_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// 3. The first bracketed value, cut where its depth returns to zero.
pub fn balanced_slice(text: &str) -> Option<Envelope> {
    let start = text.find(['{', '['])?;
    let end = json_slice_end(text, start)?;
    accept_parsed(&text[start..=end])
}

/// 4. Drop the prose around the outermost brackets and close what is missing.
pub fn boundary_trim(text: &str) -> Option<Envelope> {
    let trimmed = text.trim();
    let start = trimmed.find(['{', '['])?;
    let end = trimmed.rfind(['}', ']'])?;
    if end < start {
        return None;
    }

    let mut cleaned = trimmed[start..=end].to_string();
    if cleaned.starts_with('[') && !cleaned.ends_with(']') {
        cleaned.push(']');
    } else if cleaned.starts_with('{') && !cleaned.ends_with('}') {
        cleaned.push('}');
    }
    accept_parsed(&cleaned)
}

/// 5. The `code` string was never terminated, or carries raw quotes.
pub fn unterminated_code(text: &str) -> Option<Envelope> {
    let text = text.trim();
    let text = &text[text.find(['{', '['])?..];
    let code_start = code_start_re().find(text)?.end();
    let (head, rest) = text.split_at(code_start);

    let fixed = match explanation_re().find(rest) {
        Some(explanation) => {
            let between = &rest[..explanation.start()];
            match last_unescaped_quote(between) {
                Some(quote) => format!(
                    "{}{}{}",
                    head,
                    escape_bare_quotes(&between[..quote]),
                    &rest[quote..]
                ),
                None => {
                    let body = between.trim_end().trim_end_matches(',').trim_end();
                    let body = trim_partial_escape(body);
                    format!(
                        "{}{}\", {}",
                        head,
                        escape_bare_quotes(body),
                        &rest[explanation.start()..]
                    )
                }
            }
        }
        None => {
            let window_end = floor_char_boundary(text, SCAN_WINDOW);
            let min_end = code_start + 100;
            let end = text[..window_end]
                .char_indices()
                .rev()
                .take_while(|(i, _)| *i >= min_end)
                .find(|(_, c)| matches!(c, '}' | ')'))
                .map(|(i, _)| i + 1)
                .unwrap_or(window_end);
            if end <= code_start {
                return None;
            }

            let mut fixed = format!(
                "{}{}\", \"explanation\": \"{}\"}}",
                head,
                escape_bare_quotes(trim_partial_escape(&text[code_start..end])),
                UNTERMINATED_EXPLANATION
            );
            if text.starts_with('[') {
                fixed.push(']');
            }
            fixed
        }
    };

    accept_repaired(&fixed)
}

/// Offset of the quote that plausibly ends the code value: unescaped and
/// followed (after whitespace) by `,` or `}`.
fn code_value_end(text: &str, from: usize, until: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut escaped = false;
    for i in from..until {
        match bytes[i] {
            b'\\' if !escaped => {
                escaped = true;
                continue;
            }
            b'"' if !escaped => {
                let next = text[i + 1..].trim_start().chars().next();
                if matches!(next, Some(',') | Some('}')) {
                    return Some(i);
                }
            }
            _ => {}
        }
        escaped = false;
    }
    None
}

/// Trim the decoded code of a field-extracted envelope before closing it.
fn trim_extracted_code(code: &str) -> &str {
    let code = code.trim_end();
    if TryCounts::of(code).has_unpaired_try() {
        return code;
    }
    // A `}` within the final few characters ends the component; whatever
    // follows it is leftover envelope text.
    match code.rfind('}') {
        Some(i) if code.len() - i <= 10 => &code[..=i],
        _ => code,
    }
}

/// 6. Pull the fields out one by one and build the envelope ourselves.
pub fn field_extraction(text: &str) -> Option<Envelope> {
    let code_start = code_start_re().find(text)?.end();

    let title = title_re()
        .captures(text)
        .map(|caps| decode_fragment(&caps[1]))
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let description = description_re()
        .captures(text)
        .map(|caps| decode_fragment(&caps[1]))
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

    let search_end = explanation_re()
        .find_at(text, code_start)
        .map(|m| m.start())
        .unwrap_or(text.len());
    let code_end = code_value_end(text, code_start, search_end).unwrap_or(search_end);

    let decoded = decode_fragment(&escape_bare_quotes(&text[code_start..code_end]));
    let code = repair_code(trim_extracted_code(&decoded))?;

    Some(Envelope {
        kind: super::UI_COMPONENT.to_string(),
        title: Some(title),
        description: Some(description),
        code,
        explanation: Some(TRUNCATED_EXPLANATION.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CODE: &str = "fn Widget() { ui::text(`ok`) }";

    fn envelope_json() -> String {
        json!({
            "type": "ui_component",
            "title": "Widget",
            "description": "Shows ok",
            "code": CODE,
            "explanation": "Done"
        })
        .to_string()
    }

    #[test]
    fn test_direct_parse_object_and_array() {
        assert_eq!(direct_parse(&envelope_json()).unwrap().code, CODE);

        let wrapped = format!("[{{\"type\":\"other\"}}, {}]", envelope_json());
        assert_eq!(direct_parse(&wrapped).unwrap().title.as_deref(), Some("Widget"));
    }

    #[test]
    fn test_direct_parse_rejects_wrong_type_and_empty_code() {
        assert!(direct_parse(r#"{"type":"text","code":"x"}"#).is_none());
        assert!(direct_parse(r#"{"type":"ui_component","code":"  "}"#).is_none());
        assert!(direct_parse("not json").is_none());
    }

    #[test]
    fn test_direct_parse_rejects_unclosed_code() {
        let text = json!({ "type": "ui_component", "code": "fn A() { try { x(); }" }).to_string();
        assert!(direct_parse(&text).is_none());
    }

    #[test]
    fn test_direct_parse_accepts_try_in_text_and_comments() {
        let code = "fn Retry() {\n  // try { again\n  ui::text(\"Please try { again\")\n}";
        let text = json!({ "type": "ui_component", "code": code }).to_string();
        assert_eq!(direct_parse(&text).unwrap().code, code);
    }

    #[test]
    fn test_fenced_block_skips_bad_blocks() {
        let text = format!(
            "Here:\n```json\n{{\"nope\": 1}}\n```\nand\n```\n{}\n```",
            envelope_json()
        );
        assert_eq!(fenced_block(&text).unwrap().code, CODE);
    }

    #[test]
    fn test_balanced_slice_ignores_braces_in_strings() {
        let text = format!("Sure! {} Hope that helps {{", envelope_json());
        assert!(direct_parse(&text).is_none());
        assert_eq!(balanced_slice(&text).unwrap().code, CODE);
    }

    #[test]
    fn test_boundary_trim_appends_missing_bracket() {
        let truncated = format!("Result:\n[{}\n", envelope_json());
        // the array never closes, so there is no balanced slice
        assert!(balanced_slice(&truncated).is_none());
        assert_eq!(boundary_trim(&truncated).unwrap().code, CODE);
    }

    #[test]
    fn test_unterminated_code_with_explanation() {
        let text = r#"{"type":"ui_component","title":"T","code":"fn A() { alert("hi"); }", "explanation": "E"}"#;
        let envelope = unterminated_code(text).unwrap();
        assert_eq!(envelope.code, r#"fn A() { alert("hi"); }"#);
        assert_eq!(envelope.explanation.as_deref(), Some("E"));
    }

    #[test]
    fn test_unterminated_code_without_explanation() {
        let body = format!("fn A() {{ let rows = [{}]; ui::text(`done`) }}", "1, ".repeat(40));
        let text = format!(
            r#"{{"type":"ui_component","title":"T","code":"{} trailing garbage"#,
            body
        );
        let envelope = unterminated_code(&text).unwrap();
        assert_eq!(envelope.code, body);
        assert_eq!(envelope.explanation.as_deref(), Some(UNTERMINATED_EXPLANATION));
    }

    #[test]
    fn test_field_extraction_truncated_mid_try() {
        let text = r#"{"type": "ui_component", "title": "Stock", "code": "fn Stock() {\n  let h = || {\n    try { save(); } catch (e) { alert(`x`); }\n  };\n  try {\n    load("#;
        let envelope = field_extraction(text).unwrap();
        assert_eq!(envelope.title.as_deref(), Some("Stock"));
        assert_eq!(envelope.explanation.as_deref(), Some(TRUNCATED_EXPLANATION));
        assert!(is_closeable(&envelope.code));
        assert!(!envelope.code.contains("load("));
    }

    #[test]
    fn test_code_cut_right_after_a_backslash() {
        let text = r#"{"type":"ui_component","title":"T","code":"fn A() {\n  let x = 1;\n  alert(\"hi\"#;
        let expected = "fn A() {\n  let x = 1;\n  alert(\"hi\")}";

        let envelope = unterminated_code(text).unwrap();
        assert_eq!(envelope.code, expected);

        let envelope = field_extraction(text).unwrap();
        assert_eq!(envelope.title.as_deref(), Some("T"));
        assert_eq!(envelope.code, expected);
        assert!(!envelope.code.contains('\\'));
    }

    #[test]
    fn test_field_extraction_drops_unfinished_unicode_escape() {
        let text = r#"{"title": "Caf\u00e9", "code": "fn A() {\n  ui::text(\"caf\u00"#;
        let envelope = field_extraction(text).unwrap();
        assert_eq!(envelope.title.as_deref(), Some("Café"));
        assert_eq!(envelope.code, "fn A() {\n  ui::text(\"caf\")}");
    }

    #[test]
    fn test_field_extraction_defaults_title() {
        let text = r#"{"code": "fn A() { ui::text(`a`) }"}"#;
        let envelope = field_extraction(text).unwrap();
        assert_eq!(envelope.title.as_deref(), Some(DEFAULT_TITLE));
        assert_eq!(envelope.code, "fn A() { ui::text(`a`) }");
    }

    #[test]
    fn test_json_slice_end_nested() {
        let text = r#"x {"a": [1, {"b": "}"}]} y"#;
        let start = text.find('{').unwrap();
        assert_eq!(json_slice_end(text, start), Some(text.len() - 3));
    }
}
