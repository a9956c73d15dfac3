use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A Scratch scalar. There is no null; absent values resolve to `Number(0)`
/// or `Text("")` depending on the consuming context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Default for Value {
    fn default() -> Self {
        Value::Number(0.0)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl Value {
    /// Numeric cast. Total: unparseable text and NaN both cast to 0.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => {
                if n.is_nan() {
                    0.0
                } else {
                    *n
                }
            }
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Text(s) => parse_number(s).unwrap_or(0.0),
        }
    }

    /// Boolean cast. Text is false only for the empty string, `"0"` and any
    /// casing of `"false"`.
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")),
        }
    }

    /// String cast with Scratch number formatting: shortest round-trip
    /// decimal, `"Infinity"`/`"-Infinity"`, `"NaN"`.
    pub fn to_display(&self) -> String {
        match self {
            Value::Number(n) => number_to_string(*n),
            Value::Bool(b) => {
                if *b {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            Value::Text(s) => s.clone(),
        }
    }

    /// True when the value denotes a whole number. Used by `pick random` to
    /// choose integer vs continuous ranges, and by index casts.
    pub fn is_int_like(&self) -> bool {
        match self {
            Value::Number(n) => n.fract() == 0.0,
            Value::Bool(_) => true,
            Value::Text(s) => !s.contains('.'),
        }
    }
}

/// Strict numeric parse: optional surrounding whitespace, optional sign,
/// decimal or scientific notation, exact-case `Infinity`/`-Infinity`.
/// Whitespace-only input parses as 0 (matching `Number("") == 0`); anything
/// else that fails the grammar is `None`.
pub fn parse_number(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return Some(0.0);
    }
    match t {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }
    if !valid_decimal(t) {
        return None;
    }
    // The grammar is a subset of what `from_str` accepts, so this cannot hit
    // the lenient `inf`/`NaN` spellings.
    t.parse::<f64>().ok().filter(|n| !n.is_nan())
}

/// `[+-]? ( digits [ "." digits? ] | "." digits ) ( [eE] [+-]? digits )?`
fn valid_decimal(t: &str) -> bool {
    let b = t.as_bytes();
    let mut i = 0;
    if matches!(b.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }
    let int_digits = count_digits(b, &mut i);
    let mut frac_digits = 0;
    if b.get(i) == Some(&b'.') {
        i += 1;
        frac_digits = count_digits(b, &mut i);
    }
    if int_digits == 0 && frac_digits == 0 {
        return false;
    }
    if matches!(b.get(i), Some(b'e') | Some(b'E')) {
        i += 1;
        if matches!(b.get(i), Some(b'+') | Some(b'-')) {
            i += 1;
        }
        if count_digits(b, &mut i) == 0 {
            return false;
        }
    }
    i == b.len()
}

fn count_digits(b: &[u8], i: &mut usize) -> usize {
    let start = *i;
    while matches!(b.get(*i), Some(c) if c.is_ascii_digit()) {
        *i += 1;
    }
    *i - start
}

/// Scratch-compatible float formatting: `1.0 → "1"`, `2.50 → "2.5"`,
/// exponential past the 1e21 / 1e-6 thresholds, named specials.
pub fn number_to_string(n: f64) -> String {
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
    if abs >= 1e21 || abs < 1e-6 {
        // Rust `{:e}` prints `1e21` / `1.5e-7`; Scratch writes a `+`
        // on non-negative exponents.
        let exp = format!("{:e}", n);
        if let Some(pos) = exp.find('e') {
            if exp.as_bytes().get(pos + 1) != Some(&b'-') {
                return format!("{}e+{}", &exp[..pos], &exp[pos + 1..]);
            }
        }
        return exp;
    }
    format!("{}", n)
}

/// Numeric interpretation used by `compare`. Unlike `to_number`, parse
/// failure is `None` rather than 0 so mixed operands fall through to the
/// string branch.
fn compare_operand(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => {
            if n.is_nan() {
                None
            } else {
                Some(*n)
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Text(s) => parse_number(s),
    }
}

/// Three-way comparison: numeric when both operands parse, otherwise
/// case-insensitive text. `"Infinity"` vs `"INFINITY"` compares equal via
/// the text branch (only the exact casing parses numerically).
pub fn compare(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (compare_operand(a), compare_operand(b)) {
        // NaN is excluded by compare_operand, so partial_cmp is total here.
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    let sa = a.to_display().to_lowercase();
    let sb = b.to_display().to_lowercase();
    sa.cmp(&sb)
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare(a, b) == Ordering::Equal
}
