/*!
# Query AST

Parsed form of a query object. A raw JSON query is classified once, up front,
into [`Query`] / [`Clause`] / [`Condition`] nodes, so the evaluator never
re-inspects the shape of a condition while scanning documents.

```rust
use docquery::query::{Clause, Condition, Query};
use serde_json::json;

let query = Query::parse(&json!({"qty": {"$gt": 10}, "name": "x"})).unwrap();
assert_eq!(query.clauses().len(), 2);
assert!(query.clauses().iter().any(|clause| matches!(
    clause,
    Clause::Field { condition: Condition::Operators(_), .. }
)));
```

Structural mistakes are rejected while parsing:

```rust
use docquery::{QueryError, query::Query};
use serde_json::json;

let err = Query::parse(&json!({"$where": "1"})).unwrap_err();
assert_eq!(err, QueryError::UnsupportedRootOperator("$where".into()));
assert!(matches!(Query::parse(&json!([1])), Err(QueryError::InvalidQueryShape(_))));
```
*/
use std::fmt::Display;

use serde_json::{Map, Value};

use crate::error::{QueryError, Result};
use crate::path::{FieldPath, parse_path};
use crate::value::{describe, is_literal};

/// A parsed query: clauses that must all hold (implicit AND).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    clauses: Vec<Clause>,
}

/// One `(key, condition)` entry of a query object.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// A root logical operator (`$and`, `$or`, `$nor`, `$not`).
    Logical(Logical),
    /// A field path with the condition its resolved value must satisfy.
    Field {
        /// The raw path, kept for diagnostics.
        raw: String,
        /// The parsed path, `None` when the path is malformed. A malformed
        /// path resolves to nothing.
        path: Option<FieldPath>,
        /// The condition on the resolved value.
        condition: Condition,
    },
}

/// Root logical operator names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    /// `$and`: every branch matches.
    And,
    /// `$or`: at least one branch matches.
    Or,
    /// `$nor`: no branch matches.
    Nor,
    /// `$not`: the branch does not match.
    Not,
}

impl LogicalOperator {
    /// Look up a logical operator by its `$`-prefixed name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "$and" => Some(Self::And),
            "$or" => Some(Self::Or),
            "$nor" => Some(Self::Nor),
            "$not" => Some(Self::Not),
            _ => None,
        }
    }

    /// The `$`-prefixed operator name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::And => "$and",
            Self::Or => "$or",
            Self::Nor => "$nor",
            Self::Not => "$not",
        }
    }
}

impl Display for LogicalOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A logical operator applied to its branches.
///
/// A branch that is not an object (e.g. `null`) is kept as `None` and never
/// matches.
#[derive(Debug, Clone, PartialEq)]
pub struct Logical {
    /// Which combinator.
    pub operator: LogicalOperator,
    /// The sub-queries it combines.
    pub branches: Vec<Option<Query>>,
}

/// The right-hand side of a field clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A bare value, matched with `$eq`.
    Direct(Value),
    /// An operator object such as `{"$gt": 1, "$lt": 5}`; entries are
    /// AND-ed in order.
    Operators(Vec<(String, Value)>),
    /// An object of nested field paths, e.g. `{"b": 1}` under `a`, matched
    /// path-wise against the resolved value.
    Nested(Vec<(String, Option<FieldPath>, Self)>),
}

impl Query {
    /// Parse a top-level query object.
    ///
    /// # Errors
    ///
    /// - [`QueryError::InvalidQueryShape`] if `value` is not an object.
    /// - [`QueryError::UnsupportedRootOperator`] for unknown `$` root keys.
    /// - [`QueryError::InvalidArgument`] for malformed logical operands.
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::parse_object(map),
            other => Err(QueryError::InvalidQueryShape(describe(other))),
        }
    }

    /// Parse a query object whose shape is already known.
    ///
    /// # Errors
    ///
    /// See [`Query::parse`].
    pub fn parse_object(map: &Map<String, Value>) -> Result<Self> {
        let clauses = map
            .iter()
            .map(|(key, value)| Clause::parse(key, value))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { clauses })
    }

    /// The clauses of this query, in the key order of the query object.
    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Whether the query has no clauses (matches everything).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl Clause {
    fn parse(key: &str, value: &Value) -> Result<Self> {
        if let Some(operator) = LogicalOperator::from_name(key) {
            return Ok(Self::Logical(Logical::parse(operator, value)?));
        }
        if key.starts_with('$') {
            return Err(QueryError::UnsupportedRootOperator(key.to_string()));
        }
        Ok(Self::Field {
            raw: key.to_string(),
            path: parse_field_path(key),
            condition: Condition::parse(value),
        })
    }
}

impl Logical {
    fn parse(operator: LogicalOperator, operand: &Value) -> Result<Self> {
        let branches = match (operator, operand) {
            (_, Value::Array(items)) => {
                items.iter().map(parse_branch).collect::<Result<Vec<_>>>()?
            }
            (LogicalOperator::Not, Value::Object(map)) => {
                vec![Some(Query::parse_object(map)?)]
            }
            (LogicalOperator::Not, other) => {
                return Err(QueryError::invalid_argument(
                    operator.name(),
                    format!(
                        "operand must be a query object or an array of queries, got {}",
                        describe(other)
                    ),
                ));
            }
            (_, other) => {
                return Err(QueryError::invalid_argument(
                    operator.name(),
                    format!("operand must be an array, got {}", describe(other)),
                ));
            }
        };
        Ok(Self { operator, branches })
    }
}

/// A branch of a logical operator: objects are sub-queries, anything else
/// fails closed.
fn parse_branch(value: &Value) -> Result<Option<Query>> {
    match value {
        Value::Object(map) => Query::parse_object(map).map(Some),
        _ => Ok(None),
    }
}

fn parse_field_path(raw: &str) -> Option<FieldPath> {
    match parse_path(raw) {
        Ok(path) => Some(path),
        Err(err) => {
            log::debug!("field path {raw:?} never resolves: {err}");
            None
        }
    }
}

impl Condition {
    /// Classify a condition value.
    ///
    /// - A non-empty object with any `$` key is an operator set. Non-`$` keys
    ///   in such an object are reported as unknown operators before any matching.
    /// - A non-empty object without `$` keys is a nested path match.
    /// - Everything else (scalars, arrays, `{}`, date and regex literals) is
    ///   a direct value.
    #[must_use]
    pub fn parse(value: &Value) -> Self {
        match value {
            Value::Object(map) if !map.is_empty() && !is_literal(value) => {
                if map.keys().any(|k| k.starts_with('$')) {
                    Self::Operators(
                        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    )
                } else {
                    Self::Nested(
                        map.iter()
                            .map(|(k, v)| {
                                (k.clone(), parse_field_path(k), Self::parse(v))
                            })
                            .collect(),
                    )
                }
            }
            other => Self::Direct(other.clone()),
        }
    }

    /// Whether the condition object consists solely of operator keys that
    /// are not logical root operators, i.e. it reads naturally as a
    /// condition rather than as a sub-query.
    #[must_use]
    pub fn is_operator_object(value: &Value) -> bool {
        match value {
            Value::Object(map) => {
                !map.is_empty()
                    && !is_literal(value)
                    && map.keys().all(|k| {
                        k.starts_with('$')
                            && LogicalOperator::from_name(k).is_none()
                    })
            }
            _ => false,
        }
    }
}
