/// Result Comparator
///
/// Decides whether one captured output line matches a test case's expected
/// value. The captured line is untyped text; the expected value is typed
/// JSON. Comparison is tolerant in the way a JavaScript author expects:
///
/// 1. Parse the line as JSON. If that fails and a number is expected, coerce
///    the line with `Number(text)` rules.
/// 2. Two numbers compare numerically (`3` equals `3.0`).
/// 3. Two composites (arrays/objects, and `null`) compare by canonical JSON.
/// 4. Anything else compares by `String(value)` forms.
/// 5. If a canonical form cannot be built, the raw line is compared with the
///    string form of the expected value.
///
/// An absent expected value has the string form `undefined`.
use serde_json::Value;
use verdict_common::config::KeyOrder;
use verdict_common::types::DynamicValue;

/// Nesting past this depth is not canonicalized.
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, Default)]
pub struct Comparator {
    key_order: KeyOrder,
}

/// The captured line after step 1
#[derive(Debug, Clone, PartialEq)]
enum Actual {
    Json(Value),
    /// Produced by numeric coercion; may be NaN or infinite
    Number(f64),
    Text(String),
}

impl Comparator {
    pub fn new(key_order: KeyOrder) -> Self {
        Self { key_order }
    }

    pub fn key_order(&self) -> KeyOrder {
        self.key_order
    }

    pub fn compare(&self, actual: &str, expected: Option<&DynamicValue>) -> bool {
        let Some(expected) = expected else {
            return actual == "undefined";
        };

        match self.try_compare(actual, expected) {
            Some(passed) => passed,
            None => actual == js_string(expected),
        }
    }

    fn try_compare(&self, line: &str, expected: &Value) -> Option<bool> {
        let actual = match serde_json::from_str::<Value>(line) {
            Ok(value) => Actual::Json(value),
            Err(_) if expected.is_number() => Actual::Number(js_number(line)),
            Err(_) => Actual::Text(line.to_string()),
        };

        if let Some(expected_num) = expected.as_f64() {
            let actual_num = match &actual {
                Actual::Json(Value::Number(n)) => n.as_f64(),
                Actual::Number(n) => Some(*n),
                _ => None,
            };
            if let Some(actual_num) = actual_num {
                return Some(actual_num == expected_num);
            }
        }

        if let Actual::Json(actual_value) = &actual {
            if is_object_like(actual_value) && is_object_like(expected) {
                let left = canonical_json(actual_value, self.key_order, 0)?;
                let right = canonical_json(expected, self.key_order, 0)?;
                return Some(left == right);
            }
        }

        let actual_text = match &actual {
            Actual::Json(value) => js_string(value),
            Actual::Number(n) => js_number_text(*n),
            Actual::Text(text) => text.clone(),
        };
        Some(actual_text == js_string(expected))
    }
}

/// `typeof value === "object"`
fn is_object_like(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Array(_) | Value::Object(_))
}

/// `JSON.stringify` form, with numbers printed the way JavaScript prints them.
/// Object keys follow JavaScript property order: array-index keys ascending,
/// then the rest in insertion order. Under [`KeyOrder::Insensitive`] the rest
/// are sorted as well, at every level.
fn canonical_json(value: &Value, key_order: KeyOrder, depth: usize) -> Option<String> {
    if depth > MAX_DEPTH {
        return None;
    }

    Some(match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            let n = n.as_f64()?;
            if n.is_finite() {
                js_number_text(n)
            } else {
                "null".to_string()
            }
        }
        Value::String(s) => serde_json::to_string(s).ok()?,
        Value::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(canonical_json(item, key_order, depth + 1)?);
            }
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let (mut indexed, mut named): (Vec<_>, Vec<_>) = map
                .iter()
                .map(|(key, item)| (array_index(key), key, item))
                .partition(|(index, _, _)| index.is_some());
            indexed.sort_by_key(|(index, _, _)| *index);
            if key_order == KeyOrder::Insensitive {
                named.sort_by(|a, b| a.1.cmp(b.1));
            }
            let entries = indexed
                .into_iter()
                .chain(named)
                .map(|(_, key, item)| (key, item));
            let mut parts = Vec::with_capacity(map.len());
            for (key, item) in entries {
                let key = serde_json::to_string(key).ok()?;
                parts.push(format!("{}:{}", key, canonical_json(item, key_order, depth + 1)?));
            }
            format!("{{{}}}", parts.join(","))
        }
    })
}

/// Canonical `u32` below `2^32 - 1`, the keys JavaScript enumerates first.
fn array_index(key: &str) -> Option<u32> {
    if key.len() > 1 && key.starts_with('0') {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>().ok().filter(|&n| n != u32::MAX)
}

/// `String(value)` for a JSON value.
pub fn js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.as_f64().map(js_number_text).unwrap_or_else(|| n.to_string()),
        Value::String(s) => s.clone(),
        Value::Array(items) => join_array(items),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// `Array.prototype.join` with the default separator: `null` elements become
/// empty strings.
fn join_array(items: &[Value]) -> String {
    items
        .iter()
        .map(|item| match item {
            Value::Null => String::new(),
            other => js_string(other),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Number-to-string conversion as JavaScript does it: no trailing `.0`,
/// exponent form outside `[1e-6, 1e21)`.
pub fn js_number_text(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    let abs = n.abs();
    if (1e-6..1e21).contains(&abs) {
        return format!("{}", n);
    }

    // Rust prints `1e21` / `1.5e-7`; JavaScript signs positive exponents.
    let formatted = format!("{:e}", n);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{}e+{}", mantissa, exponent)
        }
        _ => formatted,
    }
}

/// `Number(text)` coercion.
pub fn js_number(text: &str) -> f64 {
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    if trimmed.is_empty() {
        return 0.0;
    }

    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    let lower = trimmed.to_ascii_lowercase();
    for (prefix, radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
        if let Some(digits) = lower.strip_prefix(prefix) {
            return parse_radix(digits, radix);
        }
    }

    if is_decimal_literal(trimmed) {
        trimmed.parse::<f64>().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

fn parse_radix(digits: &str, radix: u32) -> f64 {
    if digits.is_empty() {
        return f64::NAN;
    }
    let mut value = 0f64;
    for c in digits.chars() {
        match c.to_digit(radix) {
            Some(d) => value = value * radix as f64 + d as f64,
            None => return f64::NAN,
        }
    }
    value
}

/// `[+-] digits [. digits] [e [+-] digits]` with at least one mantissa digit.
/// Rejects the spellings Rust accepts but JavaScript does not (`inf`, `nan`).
fn is_decimal_literal(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }

    let mut mantissa_digits = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        mantissa_digits += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            mantissa_digits += 1;
        }
    }
    if mantissa_digits == 0 {
        return false;
    }

    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if matches!(bytes.get(i), Some(b'+') | Some(b'-')) {
            i += 1;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == start {
            return false;
        }
    }

    i == bytes.len()
}
