//! Tolerant extraction of a section list from free-form model output.
//!
//! Models are asked for `{"sections": [...]}` but answer in many shapes:
//! bare JSON, JSON inside a ```` ```json ```` fence, JSON after a sentence of
//! preamble, or JSON with trailing commas and comments. The extractor tries
//! four stages in order and schema-validates every candidate before
//! accepting it; the first valid candidate wins.
//!
//! 1. Direct parse of the whole text
//! 2. Code fences: tagged ```` ```json ```` blocks, untagged blocks, inline
//!    backtick spans
//! 3. Balanced-brace scan from the first `{`
//! 4. Textual repair, then stages 1 and 3 again
//!
//! Nothing here fails hard: the result is [`ParseOutcome::Invalid`] when no
//! stage yields a valid list, and callers fold that into their control flow.

use crate::output::Section;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Which extraction stage produced an accepted candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Direct,
    CodeFence,
    BalancedBraces,
    Repaired,
}

/// Outcome of running the extraction cascade over one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Valid { sections: Vec<Section>, stage: Stage },
    Invalid,
}

impl ParseOutcome {
    pub fn into_sections(self) -> Option<Vec<Section>> {
        match self {
            ParseOutcome::Valid { sections, .. } => Some(sections),
            ParseOutcome::Invalid => None,
        }
    }
}

/// Parse and validate `text`, returning the surviving sections.
pub fn parse_and_validate(text: &str) -> Option<Vec<Section>> {
    parse_response(text).into_sections()
}

/// Run the full cascade and report which stage succeeded.
pub fn parse_response(text: &str) -> ParseOutcome {
    if text.trim().is_empty() {
        warn!("Empty response received");
        return ParseOutcome::Invalid;
    }

    let accept = |stage: Stage, candidate: Option<Value>| {
        candidate
            .and_then(|v| validate_schema(&v))
            .map(|sections| ParseOutcome::Valid { sections, stage })
    };

    if let Some(outcome) = accept(Stage::Direct, parse_direct(text)) {
        return outcome;
    }

    for candidate in fenced_candidates(text) {
        if let Some(outcome) = accept(Stage::CodeFence, Some(candidate)) {
            return outcome;
        }
    }

    if let Some(outcome) = accept(Stage::BalancedBraces, parse_balanced(text)) {
        return outcome;
    }

    let repaired = repair(text);
    let repaired_candidate = parse_direct(&repaired).or_else(|| parse_balanced(&repaired));
    if let Some(outcome) = accept(Stage::Repaired, repaired_candidate) {
        info!("Response JSON recovered after repair");
        return outcome;
    }

    warn!("No extraction stage produced a valid section list");
    ParseOutcome::Invalid
}

// ── Stage 1: direct parse ────────────────────────────────────────────────

fn parse_direct(text: &str) -> Option<Value> {
    serde_json::from_str(text.trim()).ok()
}

// ── Stage 2: code fences ─────────────────────────────────────────────────

static RE_FENCE_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```json\s*(\{.*?\})\s*```").unwrap());
static RE_FENCE_PLAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```\s*(\{.*?\})\s*```").unwrap());
static RE_INLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)`(\{.*?\})`").unwrap());

/// Every parsable object span inside fences, tagged blocks first.
fn fenced_candidates(text: &str) -> Vec<Value> {
    [&*RE_FENCE_JSON, &*RE_FENCE_PLAIN, &*RE_INLINE]
        .into_iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| serde_json::from_str(&caps[1]).ok())
        .collect()
}

// ── Stage 3: balanced-brace scan ─────────────────────────────────────────

/// The span from the first `{` to its matching `}`, ignoring braces inside
/// string literals. `None` when the braces never balance.
pub fn balanced_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_balanced(text: &str) -> Option<Value> {
    balanced_object_span(text).and_then(|span| serde_json::from_str(span).ok())
}

// ── Stage 4: repair ──────────────────────────────────────────────────────

static RE_TRAILING_COMMA_OBJ: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\}").unwrap());
static RE_TRAILING_COMMA_ARR: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\]").unwrap());
static RE_SINGLE_QUOTED_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"'([^']*)':").unwrap());
static RE_LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)//.*?\n").unwrap());
static RE_BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

/// Apply the fixed sequence of textual fixups.
pub fn repair(text: &str) -> String {
    let s = RE_TRAILING_COMMA_OBJ.replace_all(text, "}");
    let s = RE_TRAILING_COMMA_ARR.replace_all(&s, "]");
    let s = RE_SINGLE_QUOTED_KEY.replace_all(&s, "\"${1}\":");
    let s = RE_LINE_COMMENT.replace_all(&s, "\n");
    RE_BLOCK_COMMENT.replace_all(&s, "").into_owned()
}

// ── Schema validation ────────────────────────────────────────────────────

/// Validate `{"sections": [...]}`, keeping every element that coerces.
///
/// Returns `None` when the shape is wrong or no element survives.
pub fn validate_schema(value: &Value) -> Option<Vec<Section>> {
    let Some(object) = value.as_object() else {
        warn!("Schema validation failed: not an object");
        return None;
    };
    let Some(sections) = object.get("sections") else {
        warn!("Schema validation failed: missing 'sections' key");
        return None;
    };
    let Some(elements) = sections.as_array() else {
        warn!("Schema validation failed: 'sections' is not a list");
        return None;
    };

    let valid: Vec<Section> = elements
        .iter()
        .enumerate()
        .filter_map(|(idx, element)| match coerce_section(element) {
            Ok(section) => Some(section),
            Err(reason) => {
                warn!("Section {} dropped: {}", idx, reason);
                None
            }
        })
        .collect();

    if valid.is_empty() {
        warn!("No valid section left after validation");
        return None;
    }
    debug!("{}/{} sections passed validation", valid.len(), elements.len());
    Some(valid)
}

fn coerce_section(element: &Value) -> Result<Section, String> {
    let object = element.as_object().ok_or("not an object")?;
    let (Some(name), Some(start), Some(end)) = (
        object.get("name"),
        object.get("startPage"),
        object.get("endPage"),
    ) else {
        return Err("missing required fields".to_string());
    };

    let name = coerce_text(name);
    let start = coerce_int(start).ok_or_else(|| format!("'{name}' has a non-integer startPage"))?;
    let end = coerce_int(end).ok_or_else(|| format!("'{name}' has a non-integer endPage"))?;

    if start < 1 {
        return Err(format!("'{name}' has invalid startPage {start}"));
    }
    if end < start {
        return Err(format!("'{name}' has endPage {end} < startPage {start}"));
    }
    let start_page = u32::try_from(start).map_err(|_| format!("'{name}' startPage out of range"))?;
    let end_page = u32::try_from(end).map_err(|_| format!("'{name}' endPage out of range"))?;

    Ok(Section {
        name,
        start_page,
        end_page,
    })
}

/// Any JSON value becomes a name; non-strings use their JSON text.
fn coerce_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"sections": [{"name": "By Laws", "startPage": 1, "endPage": 12}]}"#;

    fn stage_of(text: &str) -> Option<Stage> {
        match parse_response(text) {
            ParseOutcome::Valid { stage, .. } => Some(stage),
            ParseOutcome::Invalid => None,
        }
    }

    #[test]
    fn direct_parse_wins_first() {
        assert_eq!(stage_of(VALID), Some(Stage::Direct));
        let sections = parse_and_validate(VALID).unwrap();
        assert_eq!(sections, vec![Section::new("By Laws", 1, 12)]);
    }

    #[test]
    fn tagged_fence_accepted_when_direct_fails() {
        let text = format!("Here is the structure:\n```json\n{VALID}\n```\nLet me know.");
        assert_eq!(stage_of(&text), Some(Stage::CodeFence));
    }

    #[test]
    fn tagged_fence_is_case_insensitive() {
        let text = format!("```JSON\n{VALID}\n```");
        assert_eq!(stage_of(&text), Some(Stage::CodeFence));
    }

    #[test]
    fn untagged_fence_and_inline_span() {
        assert_eq!(stage_of(&format!("```\n{VALID}\n```")), Some(Stage::CodeFence));
        assert_eq!(stage_of(&format!("Result: `{VALID}` done")), Some(Stage::CodeFence));
    }

    #[test]
    fn invalid_fenced_candidate_falls_through_to_next() {
        let text = format!("```json\n{{\"other\": 1}}\n```\n```\n{VALID}\n```");
        assert_eq!(stage_of(&text), Some(Stage::CodeFence));
        assert_eq!(parse_and_validate(&text).unwrap()[0].name, "By Laws");
    }

    #[test]
    fn balanced_scan_recovers_object_after_preamble() {
        let text = format!("Sure! Based on the pages: {VALID} Hope that helps {{.");
        assert_eq!(stage_of(&text), Some(Stage::BalancedBraces));
    }

    #[test]
    fn balanced_scan_ignores_braces_in_strings() {
        let text = r#"noise {"a": "}{ \" }", "b": {"c": 1}} tail }"#;
        assert_eq!(
            balanced_object_span(text),
            Some(r#"{"a": "}{ \" }", "b": {"c": 1}}"#)
        );
    }

    #[test]
    fn unbalanced_braces_yield_no_span() {
        assert_eq!(balanced_object_span(r#"{"a": {"b": 1}"#), None);
        assert_eq!(balanced_object_span("no braces"), None);
    }

    #[test]
    fn trailing_comma_only_recovered_by_repair() {
        let text = r#"{"sections": [{"name": "By Laws", "startPage": 1, "endPage": 12},]}"#;
        assert!(parse_direct(text).is_none());
        assert!(fenced_candidates(text).is_empty());
        assert!(parse_balanced(text).is_none());
        assert_eq!(stage_of(text), Some(Stage::Repaired));
    }

    #[test]
    fn repair_fixes_quotes_and_comments() {
        let text = "{'sections': [ // sections found\n {'name': \"A\", 'startPage': 1, 'endPage': 2} /* end */ ]}";
        let repaired = repair(text);
        assert!(!repaired.contains("//"));
        assert!(!repaired.contains("/*"));
        let sections = parse_and_validate(text).unwrap();
        assert_eq!(sections, vec![Section::new("A", 1, 2)]);
    }

    #[test]
    fn empty_and_garbage_are_invalid() {
        assert_eq!(parse_response(""), ParseOutcome::Invalid);
        assert_eq!(parse_response("   \n"), ParseOutcome::Invalid);
        assert_eq!(parse_response("I could not find any sections."), ParseOutcome::Invalid);
    }

    #[test]
    fn invalid_elements_dropped_individually() {
        let text = r#"{"sections": [
            {"name": "A", "startPage": 1, "endPage": 5},
            {"name": "B", "startPage": 0, "endPage": 5},
            {"name": "C", "startPage": 9, "endPage": 3},
            {"name": "D", "startPage": "x", "endPage": 3},
            {"name": "E", "startPage": 6},
            "not an object",
            {"name": "F", "startPage": "10", "endPage": 12.7}
        ]}"#;
        let sections = parse_and_validate(text).unwrap();
        assert_eq!(
            sections,
            vec![Section::new("A", 1, 5), Section::new("F", 10, 12)]
        );
    }

    #[test]
    fn zero_survivors_fail_whole_object() {
        let text = r#"{"sections": [{"name": "B", "startPage": 0, "endPage": 5}]}"#;
        assert!(parse_and_validate(text).is_none());
        assert!(parse_and_validate(r#"{"sections": []}"#).is_none());
        assert!(parse_and_validate(r#"{"sections": "all"}"#).is_none());
        assert!(parse_and_validate(r#"[{"name": "A", "startPage": 1, "endPage": 2}]"#).is_none());
    }

    #[test]
    fn numeric_name_coerced_to_text() {
        let text = r#"{"sections": [{"name": 7, "startPage": 1, "endPage": 2}]}"#;
        assert_eq!(parse_and_validate(text).unwrap()[0].name, "7");
    }

    #[test]
    fn non_scalar_names_are_stringified() {
        let text = r#"{"sections": [
            {"name": null, "startPage": 1, "endPage": 2},
            {"name": ["By", "Laws"], "startPage": 3, "endPage": 4},
            {"name": {"k": 1}, "startPage": 5, "endPage": 6},
            {"name": true, "startPage": 7, "endPage": 8}
        ]}"#;
        let names: Vec<String> = parse_and_validate(text)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["null", r#"["By","Laws"]"#, r#"{"k":1}"#, "true"]);
    }
}
