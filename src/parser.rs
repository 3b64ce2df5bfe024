//! Robust parsing of LLM output that claims to contain JSON.
//!
//! Model output is treated as a bytestring from an adversarial source:
//! locate the JSON, extract a balanced object, repair the common breakages,
//! then walk the structure defensively, skipping anything malformed.

use serde_json::Value;
use tracing::debug;

use crate::types::{clamp_score, Category, Recommendation, ValidationEntry};

/// Confidence assumed when a generation entry omits its score.
const DEFAULT_CONFIDENCE: f64 = 0.7;

// =============================================================================
// PAYLOAD EXTRACTION
// =============================================================================

/// Locate and extract the JSON payload from free-form model output.
///
/// Order of preference:
/// 1. content between ``` fences (optional `json` tag)
/// 2. the latest `"recommendations"` / `"validations"` key, walking back to
///    the nearest `{`
/// 3. the first `{` or `[` in the document
///
/// The chosen start is then scanned for a balanced object/array so trailing
/// prose cannot break parsing. Unterminated input returns what was collected.
pub fn extract_json_payload(raw: &str) -> &str {
    let doc = fenced_content(raw).unwrap_or(raw);

    let start = keyword_anchor(doc)
        .or_else(|| doc.find(['{', '[']))
        .unwrap_or(0);

    balanced_slice(&doc[start..])
}

/// Inner content of the first ``` fence pair, if any.
fn fenced_content(raw: &str) -> Option<&str> {
    let open = raw.find("```")?;
    let mut body = &raw[open + 3..];
    // Optional language tag on the opening fence line.
    if let Some(rest) = body.strip_prefix("json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("JSON") {
        body = rest;
    }
    match body.find("```") {
        Some(close) => Some(&body[..close]),
        None => Some(body),
    }
}

/// Start index derived from the latest payload keyword, if one is present.
fn keyword_anchor(doc: &str) -> Option<usize> {
    let key_pos = ["\"recommendations\"", "\"validations\""]
        .iter()
        .filter_map(|k| doc.rfind(k))
        .max()?;
    doc[..key_pos].rfind('{')
}

/// Slice the longest balanced object/array prefix, tracking string state and
/// backslash escapes so braces inside strings are ignored.
fn balanced_slice(s: &str) -> &str {
    let trimmed = s.trim_start();
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut started = false;

    for (i, c) in trimmed.char_indices() {
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
            '{' | '[' => {
                depth += 1;
                started = true;
            }
            '}' | ']' => {
                depth -= 1;
                if started && depth == 0 {
                    return &trimmed[..i + c.len_utf8()];
                }
            }
            _ => {}
        }
    }

    trimmed
}

// =============================================================================
// SANITIZER
// =============================================================================

/// Repair the two breakages models actually produce:
/// a stray quoted token glued onto a number (`1.0"High"` → `1.0`) and
/// trailing commas before `}` / `]`. Already-clean JSON passes through
/// unchanged.
pub fn sanitize_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                // A quote directly after a number is a stray token; drop it
                // unless it turns out to be a key.
                if ends_with_number(&out) {
                    if let Some(end) = quoted_token_end(&chars, i) {
                        let after = chars[end + 1..].iter().find(|c| !c.is_whitespace());
                        if after != Some(&':') {
                            i = end + 1;
                            continue;
                        }
                    }
                }
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if matches!(next, Some('}') | Some(']')) {
                    // trailing comma
                } else {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

fn ends_with_number(out: &str) -> bool {
    out.trim_end()
        .chars()
        .last()
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false)
}

/// Index of the closing quote of the string starting at `start`, honoring
/// escapes. None when unterminated.
fn quoted_token_end(chars: &[char], start: usize) -> Option<usize> {
    let mut escaped = false;
    for (offset, c) in chars[start + 1..].iter().enumerate() {
        if escaped {
            escaped = false;
        } else if *c == '\\' {
            escaped = true;
        } else if *c == '"' {
            return Some(start + 1 + offset);
        }
    }
    None
}

/// Extract, sanitize, and parse into a JSON value.
fn parse_document(raw: &str) -> Option<Value> {
    let payload = extract_json_payload(raw);
    let cleaned = sanitize_json(payload);
    match serde_json::from_str(&cleaned) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(error = %e, "response payload is not parseable JSON");
            None
        }
    }
}

// =============================================================================
// FIELD COERCION
// =============================================================================

/// Numeric field that may arrive as a JSON number or a string-formatted one.
fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn string_list(value: Option<&Value>, cap: usize) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| non_empty_str(Some(v)))
                .take(cap)
                .collect()
        })
        .unwrap_or_default()
}

// =============================================================================
// GENERATION OUTPUT
// =============================================================================

/// Parse a generation response into recommendations. Malformed entries are
/// skipped; an unusable document yields an empty list.
pub fn parse_generation(raw: &str, category: Category, provider: &str) -> Vec<Recommendation> {
    let Some(doc) = parse_document(raw) else {
        return Vec::new();
    };

    let items = match doc.get("recommendations").and_then(Value::as_array) {
        Some(arr) => arr.clone(),
        None => match doc {
            Value::Array(arr) => arr,
            _ => return Vec::new(),
        },
    };

    let mut out = Vec::with_capacity(items.len());
    for item in &items {
        let Some(obj) = item.as_object() else {
            continue;
        };
        let Some(name) = non_empty_str(obj.get("name")) else {
            continue;
        };

        let score = coerce_f64(obj.get("confidenceScore"))
            .map(clamp_score)
            .unwrap_or(DEFAULT_CONFIDENCE);

        let mut rec = Recommendation::new(
            name,
            non_empty_str(obj.get("description")).unwrap_or_default(),
            category,
            score,
            provider,
        );
        rec.address = non_empty_str(obj.get("address"));
        rec.lat = coerce_f64(obj.get("latitude"));
        rec.lng = coerce_f64(obj.get("longitude"));
        rec.highlights = string_list(obj.get("highlights"), Recommendation::MAX_HIGHLIGHTS);
        rec.why_recommended = non_empty_str(obj.get("whyRecommended"));
        out.push(rec);
    }
    out
}

// =============================================================================
// VALIDATION OUTPUT
// =============================================================================

/// Parse a cross-validation response. Same defensive rules as generation.
pub fn parse_validations(raw: &str) -> Vec<ValidationEntry> {
    let Some(doc) = parse_document(raw) else {
        return Vec::new();
    };

    let Some(items) = doc.get("validations").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(obj) = item.as_object() else {
            continue;
        };
        let Some(original_name) = non_empty_str(obj.get("name")) else {
            continue;
        };

        out.push(ValidationEntry {
            original_name,
            validation_score: coerce_f64(obj.get("validationScore"))
                .map(clamp_score)
                .unwrap_or(DEFAULT_CONFIDENCE),
            flagged_inaccurate: coerce_bool(obj.get("flaggedAsInaccurate")),
            flagged_out_of_range: coerce_bool(obj.get("flaggedAsOutOfRange")),
            comment: non_empty_str(obj.get("comment")),
        });
    }
    out
}

// =============================================================================
// SYNTHESIS OUTPUT
// =============================================================================

/// Polished copy for one ranked candidate, matched back by name.
#[derive(Debug, Clone)]
pub struct SynthesizedEntry {
    pub name: String,
    pub description: Option<String>,
    pub highlights: Vec<String>,
    pub why_recommended: Option<String>,
}

/// Parse a synthesis response into per-candidate rewrites.
pub fn parse_synthesis(raw: &str) -> Vec<SynthesizedEntry> {
    let Some(doc) = parse_document(raw) else {
        return Vec::new();
    };

    let Some(items) = doc.get("recommendations").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(obj) = item.as_object() else {
            continue;
        };
        let Some(name) = non_empty_str(obj.get("name")) else {
            continue;
        };
        out.push(SynthesizedEntry {
            name,
            description: non_empty_str(obj.get("description")),
            highlights: string_list(obj.get("highlights"), Recommendation::MAX_HIGHLIGHTS),
            why_recommended: non_empty_str(obj.get("whyRecommended")),
        });
    }
    out
}

// =============================================================================
// TESTS
// =============================================================================
