/*!
# Value Semantics

Equality, ordering and type classification for [`serde_json::Value`] as used
by the built-in operators.

Two extended-JSON literal forms are recognised on top of plain JSON:

- `{"$date": ...}` carrying epoch milliseconds, an RFC 3339 string, or
  `{"$numberLong": "<millis>"}`. Dates compare by instant.
- `{"$regularExpression": {"pattern": "...", "options": "..."}}`, a
  pre-compiled pattern operand for `$regex`.
*/
use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

/// Key of the extended-JSON date literal.
pub const DATE_KEY: &str = "$date";

/// Key of the extended-JSON regular expression literal.
pub const REGEX_KEY: &str = "$regularExpression";

/// The runtime kind of a value, as seen by `$type` and the comparison
/// operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// JSON `null`
    Null,
    /// JSON boolean
    Bool,
    /// JSON number
    Number,
    /// JSON string
    String,
    /// A `{"$date": ...}` literal
    Date,
    /// JSON array
    Array,
    /// JSON object (other than a literal)
    Object,
}

impl Kind {
    /// Classify a value.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) if as_date(value).is_some() => Self::Date,
            Value::Object(_) => Self::Object,
        }
    }

    /// Parse a `$type` name, e.g. `"string"`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "null" => Some(Self::Null),
            "bool" | "boolean" => Some(Self::Bool),
            "number" => Some(Self::Number),
            "string" => Some(Self::String),
            "date" => Some(Self::Date),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    /// The canonical `$type` name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Date => "date",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Returns the single `(key, value)` entry of a one-key object.
fn single_entry(map: &Map<String, Value>) -> Option<(&String, &Value)> {
    if map.len() == 1 { map.iter().next() } else { None }
}

/// Extract the instant of a `{"$date": ...}` literal as epoch milliseconds.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn as_date(value: &Value) -> Option<i64> {
    let Value::Object(map) = value else {
        return None;
    };
    let (key, inner) = single_entry(map)?;
    if key != DATE_KEY {
        return None;
    }
    match inner {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        Value::Object(long) => match single_entry(long)? {
            (k, Value::String(millis)) if k == "$numberLong" => {
                millis.parse().ok()
            }
            _ => None,
        },
        _ => None,
    }
}

/// Extract `(pattern, options)` from a `{"$regularExpression": ...}`
/// literal.
#[must_use]
pub fn as_regex_literal(value: &Value) -> Option<(&str, &str)> {
    let Value::Object(map) = value else {
        return None;
    };
    let (key, Value::Object(body)) = single_entry(map)? else {
        return None;
    };
    if key != REGEX_KEY {
        return None;
    }
    let pattern = body.get("pattern")?.as_str()?;
    let options = match body.get("options") {
        Some(Value::String(opts)) => opts.as_str(),
        None => "",
        Some(_) => return None,
    };
    Some((pattern, options))
}

/// Whether the value is an extended-JSON literal object rather than a
/// condition or a nested path map.
#[must_use]
pub fn is_literal(value: &Value) -> bool {
    as_date(value).is_some() || as_regex_literal(value).is_some()
}

/// Compare two JSON numbers numerically, exactly when both are integers.
#[must_use]
pub fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_integer(a), as_integer(b)) {
        return Some(x.cmp(&y));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// Widen any integer representation so `i64` and `u64` compare exactly.
fn as_integer(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

/// Order two values of the same comparable kind: numbers numerically,
/// strings lexicographically, dates by instant. Every other pairing,
/// including mixed kinds, is unordered.
#[must_use]
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Object(_), Value::Object(_)) => {
            Some(as_date(a)?.cmp(&as_date(b)?))
        }
        _ => None,
    }
}

/// Strict equality: same kind and same content. Numbers compare by value
/// (`1 == 1.0`), dates by instant, containers structurally.
#[must_use]
pub fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => {
            compare_numbers(x, y) == Some(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len()
                && xs.iter().zip(ys).all(|(x, y)| equals(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            if let (Some(x), Some(y)) = (as_date(a), as_date(b)) {
                return x == y;
            }
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| equals(x, y)))
        }
        _ => false,
    }
}

/// Whether `haystack` holds an element strictly equal to `needle`.
#[must_use]
pub fn contains(haystack: &[Value], needle: &Value) -> bool {
    haystack.iter().any(|item| equals(item, needle))
}

/// Short human-readable description of a value for error messages.
#[must_use]
pub fn describe(value: &Value) -> String {
    match value {
        Value::Array(items) => format!("array of length {}", items.len()),
        Value::Object(_) => Kind::of(value).name().to_string(),
        other => format!("{} {other}", Kind::of(other)),
    }
}
