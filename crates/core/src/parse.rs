use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::types::{AnalysisResult, ControversyTopic, HiddenGem, Sentiment};

/// Shown when the backend produced nothing usable as a summary.
pub const SUMMARY_FALLBACK: &str = "No summary available.";

/// How many times a JSON-encoded string is unwrapped before giving up.
/// Double-encoded summaries are the deepest nesting seen in the wild.
const MAX_UNWRAP_DEPTH: u32 = 2;

static FENCE_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)```").expect("fence pattern"));
static FENCE_JSON_GREEDY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*)```").expect("fence pattern"));
static FENCE_ANY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```\s*(.*?)```").expect("fence pattern"));
static EMPTY_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*,").expect("repair pattern"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("repair pattern"));
static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("newline pattern"));

/// Collapse whatever the backend relayed from the AI (an object, a JSON
/// string, markdown-fenced JSON, or plain prose) into a well-formed
/// [`AnalysisResult`]. Total: parse failures degrade to a plain-text
/// summary instead of erroring.
pub fn parse_analysis(payload: &Value) -> AnalysisResult {
    let mut result = AnalysisResult::default();

    match payload {
        Value::Object(_) => {
            merge_fields(&mut result, payload);
            unwrap_summary(&mut result, 0);
        }
        Value::String(text) => absorb_text(&mut result, text, 0),
        other => {
            tracing::debug!(kind = value_kind(other), "unexpected payload shape");
        }
    }

    finalize(result)
}

/// Ordered candidate extractors. The first candidate that parses wins; a
/// candidate that fails to parse falls through to the next strategy (the
/// greedy json-fence exists exactly for payloads whose inner text contains
/// backticks and breaks the non-greedy match).
fn extractors() -> [(&'static str, fn(&str) -> Option<String>); 4] {
    [
        ("fence-json", |s| capture(&FENCE_JSON, s)),
        ("fence-json-greedy", |s| capture(&FENCE_JSON_GREEDY, s)),
        ("fence-any", |s| capture(&FENCE_ANY, s)),
        ("bare-json", |s| {
            (s.starts_with('{') || s.starts_with('[')).then(|| s.to_string())
        }),
    ]
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn absorb_text(result: &mut AnalysisResult, text: &str, depth: u32) {
    if depth >= MAX_UNWRAP_DEPTH {
        degrade_to_text(result, text);
        return;
    }

    // Whole string as JSON first; a string value means another layer of
    // encoding to peel off.
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => {
            merge_fields(result, &value);
            unwrap_summary(result, depth);
            return;
        }
        Ok(Value::String(inner)) => {
            absorb_text(result, &inner, depth + 1);
            return;
        }
        _ => {}
    }

    let trimmed = text.trim();
    for (name, extract) in extractors() {
        let Some(candidate) = extract(trimmed) else {
            continue;
        };
        match serde_json::from_str::<Value>(&repair_json(&candidate)) {
            Ok(value @ Value::Object(_)) => {
                merge_fields(result, &value);
                unwrap_summary(result, depth);
                return;
            }
            Ok(Value::String(inner)) => {
                absorb_text(result, &inner, depth + 1);
                return;
            }
            Ok(_) | Err(_) => {
                tracing::debug!(strategy = name, "candidate did not parse as an object");
            }
        }
    }

    degrade_to_text(result, text);
}

/// A summary that is itself JSON-encoded (double-encoded payloads) gets one
/// more pass through the same extraction steps.
fn unwrap_summary(result: &mut AnalysisResult, depth: u32) {
    if depth + 1 >= MAX_UNWRAP_DEPTH {
        return;
    }
    let summary = result.summary.trim();
    if summary.is_empty() {
        return;
    }
    let nested = summary.starts_with('{') || summary.starts_with('[') || summary.contains("```");
    if !nested {
        return;
    }

    let text = result.summary.clone();
    let mut inner = AnalysisResult::default();
    absorb_text(&mut inner, &text, depth + 1);

    // Only adopt the unwrap when it actually found structure; prose that
    // merely starts with a brace stays as-is.
    if inner.summary.trim() != text.trim() {
        merge_result(result, inner);
    }
}

/// Pure text repair applied before every candidate parse: drop trailing
/// commas before a closing bracket and collapse empty-element commas.
fn repair_json(candidate: &str) -> String {
    let mut repaired = candidate.to_string();
    loop {
        let next = EMPTY_ELEMENT.replace_all(&repaired, ",").to_string();
        if next == repaired {
            break;
        }
        repaired = next;
    }
    TRAILING_COMMA.replace_all(&repaired, "$1").to_string()
}

/// Field-by-field merge: a present-and-truthy parsed field wins, anything
/// else keeps the prior value. Arrays count as present even when empty;
/// empty strings do not.
fn merge_fields(result: &mut AnalysisResult, value: &Value) {
    if let Some(s) = non_empty_str(value.get("summary")) {
        result.summary = s;
    }
    if let Some(s) = non_empty_str(value.get("summary_en")) {
        result.summary_en = Some(s);
    }
    if let Some(sentiment) = value.get("sentiment").filter(|v| v.is_object()) {
        if let Ok(parsed) = serde_json::from_value::<Sentiment>(sentiment.clone()) {
            result.sentiment = parsed;
        }
    }
    if let Some(topics) = string_array(value.get("topics")) {
        result.topics = topics;
    }
    if let Some(topics) = string_array(value.get("topics_en")) {
        result.topics_en = Some(topics);
    }
    if let Some(gems) = value
        .get("hiddenGems")
        .or_else(|| value.get("hidden_gems"))
        .and_then(Value::as_array)
    {
        result.hidden_gems = gems
            .iter()
            .filter_map(|g| serde_json::from_value::<HiddenGem>(g.clone()).ok())
            .collect();
    }
    if let Some(entries) = value.get("controversy").and_then(Value::as_array) {
        result.controversy = entries
            .iter()
            .filter_map(|c| serde_json::from_value::<ControversyTopic>(c.clone()).ok())
            .collect();
    }
    if let Some(keywords) = string_array(value.get("keywords")) {
        result.keywords = keywords;
    }
}

/// Merge an already-normalized result into `result` with the same truthy
/// rules, used after unwrapping a nested summary.
fn merge_result(result: &mut AnalysisResult, parsed: AnalysisResult) {
    if !parsed.summary.trim().is_empty() {
        result.summary = parsed.summary;
    }
    if parsed.summary_en.is_some() {
        result.summary_en = parsed.summary_en;
    }
    if parsed.sentiment != Sentiment::default() {
        result.sentiment = parsed.sentiment;
    }
    if !parsed.topics.is_empty() {
        result.topics = parsed.topics;
    }
    if parsed.topics_en.is_some() {
        result.topics_en = parsed.topics_en;
    }
    if !parsed.hidden_gems.is_empty() {
        result.hidden_gems = parsed.hidden_gems;
    }
    if !parsed.controversy.is_empty() {
        result.controversy = parsed.controversy;
    }
    if !parsed.keywords.is_empty() {
        result.keywords = parsed.keywords;
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_array(value: Option<&Value>) -> Option<Vec<String>> {
    value.and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}

fn degrade_to_text(result: &mut AnalysisResult, text: &str) {
    tracing::debug!(len = text.len(), "no structured payload found, using raw text as summary");
    result.summary = normalize_plain_text(text);
}

/// Raw-text strings carry literal `\n`/`\t` escape sequences from the AI;
/// turn them into real whitespace and tidy up runs of blank lines.
fn normalize_plain_text(text: &str) -> String {
    let unescaped = text.replace("\\n", "\n").replace("\\t", "\t");
    EXCESS_NEWLINES
        .replace_all(&unescaped, "\n\n")
        .trim()
        .to_string()
}

fn finalize(mut result: AnalysisResult) -> AnalysisResult {
    if result.summary.trim().is_empty() {
        result.summary = SUMMARY_FALLBACK.to_string();
    }
    result
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
