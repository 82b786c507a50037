//! Small parsers for values scraped out of page text.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static MONEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$?\s*(\d[\d,]*(?:\.\d+)?|\.\d+)\s*([Kk])?").unwrap());
static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d[\d,]*").unwrap());

/// Parse a monetary amount such as `"$1.5K"`, `"$45"` or `"$45,000.50"`.
///
/// A trailing `K`/`k` multiplies the amount by 1000.
pub fn parse_money(s: &str) -> Option<f64> {
    let caps = MONEY_RE.captures(s)?;
    let amount: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
    if caps.get(2).is_some() {
        Some(amount * 1000.0)
    } else {
        Some(amount)
    }
}

/// First whole number in the text, ignoring thousands separators.
pub fn parse_count(s: &str) -> Option<i64> {
    COUNT_RE
        .find(s)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

pub fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// `null`, `""`, `[]` and `{}` count as "not actually found".
pub fn is_emptyish(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Read a value as a number, accepting numeric strings.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

pub fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Canonical contract-type token for the spellings seen across page formats.
pub fn canonical_contract_type(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "hourly" => Some(super::HOURLY),
        "fixed" | "fixed-price" | "fixed price" => Some(super::FIXED_PRICE),
        _ => None,
    }
}

/// Map experience-level wording onto the canonical tier tokens.
pub fn normalize_level(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.contains("entry") {
        "ENTRY_LEVEL".into()
    } else if lower.contains("intermediate") {
        "INTERMEDIATE".into()
    } else if lower.contains("expert") {
        "EXPERT".into()
    } else {
        raw.to_string()
    }
}
