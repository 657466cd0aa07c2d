//! # Field Paths
//!
//! Resolves dot/bracket field paths such as `instock[0].qty` or `a.b\.c`
//! against JSON values.
//!
//! Two resolution modes exist:
//! - [`resolve`]: strict mode. Keys step into objects, bracketed indices step
//!   into arrays, and any kind mismatch yields `None`.
//! - [`resolve_flat`]: auto-flatten mode, used by the evaluator. A key applied
//!   to an array is applied to every element (recursively through nested
//!   arrays) and the results are flattened into one array.
//!
//! Neither mode ever fails loudly: malformed paths and dead ends resolve to
//! `None`.

pub mod parser;

use std::{borrow::Cow, fmt::Display, str::FromStr};

use serde_json::Value;

pub use parser::{PathParseError, parse_path};

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Object property name, with `\.` escapes already removed.
    Key(String),
    /// Array index from a bracket, e.g. `[3]`.
    Index(usize),
}

impl Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{}", key.replace('.', "\\.")),
            Self::Index(idx) => write!(f, "[{idx}]"),
        }
    }
}

/// A parsed field path. The empty path refers to the root value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// The root path.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub(crate) const fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// The path segments in traversal order.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether this is the empty (root) path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Strict resolution against `value`. See [`resolve`].
    #[must_use]
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => map.get(key),
                (Segment::Index(idx), Value::Array(items)) => items.get(*idx),
                _ => None,
            })
    }

    /// Auto-flatten resolution against `value`. See [`resolve_flat`].
    #[must_use]
    pub fn resolve_flat<'a>(&self, value: &'a Value) -> Option<Cow<'a, Value>> {
        flatten_segments(value, &self.segments)
    }
}

impl FromStr for FieldPath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_path(s)
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 && matches!(segment, Segment::Key(_)) {
                write!(f, ".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// Walk `segments` from `value`, mapping key segments over arrays.
///
/// Stays borrowed as long as no array had to be flattened; the flattened
/// sequence is necessarily owned.
fn flatten_segments<'a>(
    value: &'a Value,
    segments: &[Segment],
) -> Option<Cow<'a, Value>> {
    let Some((segment, rest)) = segments.split_first() else {
        return Some(Cow::Borrowed(value));
    };

    match (segment, value) {
        (Segment::Key(key), Value::Object(map)) => {
            flatten_segments(map.get(key)?, rest)
        }
        (Segment::Index(idx), Value::Array(items)) => {
            flatten_segments(items.get(*idx)?, rest)
        }
        (Segment::Key(_), Value::Array(items)) => {
            let mut flattened = Vec::with_capacity(items.len());
            let mut resolved_any = false;
            for item in items {
                // The same key segment is re-applied to each element, so
                // nested arrays flatten recursively.
                match flatten_segments(item, segments) {
                    Some(Cow::Borrowed(Value::Array(inner))) => {
                        flattened.extend(inner.iter().cloned());
                    }
                    Some(Cow::Owned(Value::Array(inner))) => {
                        flattened.extend(inner);
                    }
                    Some(leaf) => flattened.push(leaf.into_owned()),
                    None => {
                        // Unresolved elements stay visible to null checks.
                        flattened.push(Value::Null);
                        continue;
                    }
                }
                resolved_any = true;
            }
            resolved_any.then_some(Cow::Owned(Value::Array(flattened)))
        }
        _ => None,
    }
}

/// Resolve `path` against `value` in strict mode.
///
/// An empty path returns `value` itself. A malformed path, a missing key, an
/// out-of-range index, or a kind mismatch (key on a non-object, index on a
/// non-array) returns `None`.
///
/// ```rust
/// use docquery::path::resolve;
/// use serde_json::json;
///
/// let doc = json!({"a": {"b.c": 1}, "list": [10, 20]});
/// assert_eq!(resolve(&doc, r"a.b\.c"), Some(&json!(1)));
/// assert_eq!(resolve(&doc, "list[1]"), Some(&json!(20)));
/// assert_eq!(resolve(&doc, "list.x"), None);
/// assert_eq!(resolve(&doc, ""), Some(&doc));
/// ```
#[must_use]
pub fn resolve<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    match parse_path(path) {
        Ok(parsed) => parsed.resolve(value),
        Err(err) => {
            log::debug!("path {path:?} does not resolve: {err}");
            None
        }
    }
}

/// Resolve `path` against `value` in auto-flatten mode.
///
/// Behaves like [`resolve`], except that a key segment meeting an array is
/// applied to every element and the results are gathered into one array.
/// Elements that do not resolve contribute a `null` placeholder, so a
/// condition on `null` sees them the way it sees a missing field; if none
/// resolve, the result is `None`. Resolved values that are themselves arrays
/// are spliced into the result.
///
/// ```rust
/// use docquery::path::resolve_flat;
/// use serde_json::json;
///
/// let doc = json!({"instock": [{"wh": "A", "qty": 5}, {"wh": "C", "qty": 15}]});
/// let qty = resolve_flat(&doc, "instock.qty").unwrap();
/// assert_eq!(qty.as_ref(), &json!([5, 15]));
///
/// let doc = json!({"instock": [{"wh": "A"}, {"wh": "C", "qty": 15}]});
/// let qty = resolve_flat(&doc, "instock.qty").unwrap();
/// assert_eq!(qty.as_ref(), &json!([null, 15]));
/// ```
#[must_use]
pub fn resolve_flat<'a>(value: &'a Value, path: &str) -> Option<Cow<'a, Value>> {
    if path.is_empty() {
        return Some(Cow::Borrowed(value));
    }
    match parse_path(path) {
        Ok(parsed) => parsed.resolve_flat(value),
        Err(err) => {
            log::debug!("path {path:?} does not resolve: {err}");
            None
        }
    }
}
