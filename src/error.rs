/*!
# Query Errors

Errors raised for *structural* problems: a malformed query, a bad operand
shape, or a broken operator configuration. Data mismatches found while
walking documents (missing fields, values of the wrong type) are never
errors; they evaluate to `false`.

```rust
use docquery::{QueryEngine, QueryError, QueryOptions};
use serde_json::json;

let engine = QueryEngine::create(vec![json!({"qty": 1})], QueryOptions::new())
    .expect("valid collection");
let err = engine.find(&json!({"qty": {"$unknownOp": 1}})).unwrap_err();
assert_eq!(err, QueryError::UnknownOperator("$unknownOp".to_string()));
```
*/
use std::error::Error;
use std::fmt;

/// Represents errors that can occur while building or evaluating a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// An operator was registered under a name without the `$` prefix.
    InvalidOperatorName(String),
    /// A condition references an operator missing from the registry.
    UnknownOperator(String),
    /// Implicit equality needs the named operator (normally `$eq`), but it
    /// has been removed from the registry.
    MissingOperator(String),
    /// A `$`-prefixed root key that is not a logical operator.
    UnsupportedRootOperator(String),
    /// An operand has the wrong shape for its operator.
    InvalidArgument {
        /// The operator whose operand was rejected.
        operator: String,
        /// What the operator expected.
        reason: String,
    },
    /// The top-level query is not an object.
    InvalidQueryShape(String),
    /// The collection handed to the engine is not a sequence.
    InvalidCollection(String),
}

impl QueryError {
    /// Helper for building [`QueryError::InvalidArgument`].
    pub fn invalid_argument<O, R>(operator: O, reason: R) -> Self
    where
        O: Into<String>,
        R: Into<String>,
    {
        Self::InvalidArgument {
            operator: operator.into(),
            reason: reason.into(),
        }
    }
}

impl Error for QueryError {}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOperatorName(name) => write!(
                f,
                "Invalid operator name {name:?}: operator names must start with '$'"
            ),
            Self::UnknownOperator(name) => {
                write!(f, "Unknown operator: {name}")
            }
            Self::MissingOperator(name) => write!(
                f,
                "Missing operator: implicit equality requires {name}, which is not registered"
            ),
            Self::UnsupportedRootOperator(name) => write!(
                f,
                "Unsupported root operator: {name} (expected one of $and, $or, $nor, $not)"
            ),
            Self::InvalidArgument { operator, reason } => {
                write!(f, "Invalid argument for {operator}: {reason}")
            }
            Self::InvalidQueryShape(found) => {
                write!(f, "Invalid query: expected an object, got {found}")
            }
            Self::InvalidCollection(found) => {
                write!(f, "Invalid collection: expected an array, got {found}")
            }
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T, E = QueryError> = std::result::Result<T, E>;
