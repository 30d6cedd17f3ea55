//! Post-processing: turn a model's chat content into a field map.
//!
//! ## Model quirks handled
//!
//! Even well-prompted vision models regularly return output that is
//! *semantically correct* but *structurally sloppy*:
//!
//! - Wrapping the JSON in ` ```json ... ``` ` fences despite the prompt
//!   saying not to
//! - Prefacing the object with "Here is the extracted data:"
//! - Echoing field names with different casing (`Drawing_Number`)
//! - Writing `"N/A"` or `""` instead of `null` for absent values
//! - Leaving out fields they could not find
//!
//! Deterministic rules fix these quirks so
//! every page result has exactly the requested keys. Content that is not a
//! JSON object at all is kept verbatim under [`RAW_CONTENT_KEY`] so nothing
//! the model said is lost.
//!
//! ## Rule Order
//!
//! Line endings and invisible characters are normalised before fence
//! stripping so the fence regex sees clean input; the object is located
//! after fences are gone.

use crate::output::{null_fields, ExtractionField};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Key holding the model's verbatim content when it is not a JSON object.
pub const RAW_CONTENT_KEY: &str = "raw_content";

/// Parse model content into `requested field → value`.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip invisible Unicode (BOM, zero-width spaces)
/// 3. Strip outer markdown fences
/// 4. Locate the outermost `{ … }` if the model added prose around it
/// 5. Parse as a JSON object, otherwise fall back to `raw_content`
/// 6. Match requested fields exactly, then case-insensitively
/// 7. Map placeholder strings (`""`, `"N/A"`, `"null"`) to `null`
pub fn parse_fields(content: &str, fields: &[ExtractionField]) -> Map<String, Value> {
    let s = normalise_line_endings(content);
    let s = remove_invisible_chars(&s);
    let s = strip_code_fences(&s);

    let Some(object) = locate_object(&s) else {
        warn!(
            "Model content is not a JSON object ({} chars); keeping raw content",
            s.len()
        );
        let mut data = null_fields(fields);
        data.insert(RAW_CONTENT_KEY.into(), Value::String(content.to_string()));
        return data;
    };

    let mut data = Map::with_capacity(fields.len());
    let mut missing = 0usize;
    for field in fields {
        let value = lookup(&object, &field.field_name)
            .map(normalise_value)
            .unwrap_or(Value::Null);
        if value.is_null() {
            missing += 1;
        }
        data.insert(field.field_name.clone(), value);
    }
    debug!(
        "Parsed {} fields ({} null)",
        fields.len(),
        missing
    );
    data
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Rule 3: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        caps[1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

// ── Rules 4–5: Locate and parse the object ───────────────────────────────────

fn locate_object(input: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(input) {
        return Some(map);
    }
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&input[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

// ── Rule 6: Field lookup ─────────────────────────────────────────────────────

fn lookup<'a>(object: &'a Map<String, Value>, field_name: &str) -> Option<&'a Value> {
    object.get(field_name).or_else(|| {
        object
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(field_name))
            .map(|(_, v)| v)
    })
}

// ── Rule 7: Placeholder values ───────────────────────────────────────────────

fn normalise_value(value: &Value) -> Value {
    match value {
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty()
                || t.eq_ignore_ascii_case("null")
                || t.eq_ignore_ascii_case("n/a")
                || t.eq_ignore_ascii_case("none")
            {
                Value::Null
            } else {
                Value::String(t.to_string())
            }
        }
        other => other.clone(),
    }
}
