/*!
# Field Path Parser

Parser for converting field path strings into [`FieldPath`] objects.

```rust
use docquery::path::{Segment, parse_path};

let path = parse_path(r"items[2].a\.b").expect("valid path");
assert_eq!(
    path.segments(),
    &[
        Segment::Key("items".into()),
        Segment::Index(2),
        Segment::Key("a.b".into()),
    ]
);
```

Malformed paths are rejected with a [`PathParseError`]:

```rust
use docquery::path::{PathParseError, parse_path};

assert!(matches!(parse_path("a[-1]"), Err(PathParseError::UnexpectedToken(_))));
assert!(matches!(parse_path("a[0"), Err(PathParseError::UnexpectedToken(_))));
```
*/

use pest::Parser;
use pest_derive::Parser;
use std::error::Error;
use std::fmt;

use crate::path::{FieldPath, Segment};

/// Parser for turning raw path strings into [`FieldPath`] objects.
#[derive(Parser)]
#[grammar = "path/grammar/path.pest"]
pub struct FieldPathParser;

/// Represents errors that can occur while parsing a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathParseError {
    /// Unexpected token encountered during parsing.
    UnexpectedToken(String),
    /// An array index does not fit in `usize`.
    IndexOverflow(String),
}

impl Error for PathParseError {}

impl fmt::Display for PathParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedToken(token) => {
                write!(f, "Unexpected token: {token}")
            }
            Self::IndexOverflow(index) => {
                write!(f, "Array index out of range: {index}")
            }
        }
    }
}

/// Parse an input path string into a [`FieldPath`]. The empty string parses
/// to the root path.
///
/// # Errors
///
/// Returns a [`PathParseError`] if the path has an empty segment, an
/// unterminated or non-numeric bracket, or an index that overflows.
pub fn parse_path(input: &str) -> Result<FieldPath, PathParseError> {
    let path = FieldPathParser::parse(Rule::path, input)
        .map_err(|e| PathParseError::UnexpectedToken(e.to_string()))?
        .next()
        .ok_or_else(|| PathParseError::UnexpectedToken(input.to_string()))?;

    let mut segments = Vec::new();
    for pair in path.into_inner() {
        match pair.as_rule() {
            Rule::key => segments.push(Segment::Key(unescape(pair.as_str()))),
            Rule::index => {
                let digits = pair.into_inner().as_str();
                let idx = digits.parse::<usize>().map_err(|_| {
                    PathParseError::IndexOverflow(digits.to_string())
                })?;
                segments.push(Segment::Index(idx));
            }
            Rule::EOI => {}
            other => {
                return Err(PathParseError::UnexpectedToken(format!(
                    "Unexpected rule in path: {other:?}"
                )));
            }
        }
    }

    Ok(FieldPath::from_segments(segments))
}

/// Replace every `\.` escape in a raw key with a literal dot.
fn unescape(raw: &str) -> String {
    if raw.contains("\\.") {
        raw.replace("\\.", ".")
    } else {
        raw.to_string()
    }
}
