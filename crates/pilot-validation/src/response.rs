//! Plausibility checks and deterministic JSON repair for oracle replies
//!
//! The repair pipeline is pure text transformation: strip code fences,
//! normalize capitalized literals, drop trailing commas, then one strict
//! parse. It never loops and never consults anything outside its input.

use pilot_core::ValidationResult;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Shortest reply accepted as a plausible reasoning response (after trimming)
pub const MIN_TEXT_LENGTH: usize = 10;

fn leading_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```[A-Za-z0-9_-]*[ \t]*\r?\n?").expect("valid regex"))
}

fn trailing_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\r?\n?[ \t]*```$").expect("valid regex"))
}

fn native_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(True|False|None)\b").expect("valid regex"))
}

fn trailing_comma() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",(\s*[}\]])").expect("valid regex"))
}

/// Validator for raw oracle text
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    min_text_length: usize,
}

impl ResponseValidator {
    pub fn new(min_text_length: usize) -> Self {
        Self { min_text_length }
    }

    /// Accept any non-blank reply at least `min_text_length` characters long
    pub fn validate_text(&self, raw: &str) -> ValidationResult<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return ValidationResult::invalid("response is empty");
        }

        let length = trimmed.chars().count();
        if length < self.min_text_length {
            return ValidationResult::invalid(format!(
                "response too short ({} chars, need at least {})",
                length, self.min_text_length
            ));
        }

        ValidationResult::valid(raw.to_string())
    }

    /// Repair and parse a JSON-mode reply
    ///
    /// On failure the error message is the parser's own message, unaltered.
    pub fn validate_json(&self, raw: &str) -> ValidationResult<Value> {
        if raw.trim().is_empty() {
            return ValidationResult::invalid("response is empty");
        }

        match serde_json::from_str::<Value>(&repair_json(raw)) {
            Ok(value) => ValidationResult::valid(value),
            Err(e) => ValidationResult::invalid(e.to_string()),
        }
    }
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::new(MIN_TEXT_LENGTH)
    }
}

/// Apply the fixed repair pipeline without parsing
pub fn repair_json(raw: &str) -> String {
    let unfenced = strip_code_fences(raw);
    let normalized = map_outside_strings(&unfenced, |code| {
        native_literal()
            .replace_all(code, |caps: &regex::Captures<'_>| match &caps[1] {
                "True" => "true",
                "False" => "false",
                _ => "null",
            })
            .into_owned()
    });
    map_outside_strings(&normalized, |code| {
        trailing_comma().replace_all(code, "$1").into_owned()
    })
}

fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_leading = leading_fence().replace(trimmed, "");
    trailing_fence()
        .replace(&without_leading, "")
        .trim()
        .to_string()
}

/// Rewrite only the text between JSON string literals
///
/// String contents pass through untouched, so a literal like `"None, }"`
/// survives the repairs.
fn map_outside_strings(text: &str, rewrite: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut code_start = 0;
    let mut chars = text.char_indices();

    while let Some((start, c)) = chars.next() {
        if c != '"' {
            continue;
        }
        out.push_str(&rewrite(&text[code_start..start]));

        // Unterminated strings run to the end of the input
        let mut end = text.len();
        let mut escaped = false;
        for (i, c) in chars.by_ref() {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                end = i + 1;
                break;
            }
        }
        out.push_str(&text[start..end]);
        code_start = end;
    }

    if code_start < text.len() {
        out.push_str(&rewrite(&text[code_start..]));
    }
    out
}
