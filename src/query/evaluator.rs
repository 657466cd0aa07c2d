/*!
# Evaluator

Recursive matching of documents against parsed [`Query`] trees.

The [`Evaluator`] owns no state beyond a reference to the
[`OperatorRegistry`]; every operator call receives a [`Context`] through
which it can recurse back into the evaluator (`$elemMatch`, field-level
`$not`, ...).

```rust
use docquery::{Evaluator, OperatorRegistry, query::Query};
use serde_json::json;

let registry = OperatorRegistry::new();
let evaluator = Evaluator::new(&registry);
let doc = json!({"instock": [{"wh": "A", "qty": 5}, {"wh": "C", "qty": 15}]});
let query = Query::parse(&json!({"instock.qty": 15})).unwrap();
assert!(evaluator.evaluate_document(&doc, &query).unwrap());
```
*/
use std::borrow::Cow;

use serde_json::Value;

use crate::error::{QueryError, Result};
use crate::operators::{OperatorRegistry, builtin};
use crate::path::FieldPath;
use crate::query::ast::{Clause, Condition, Logical, LogicalOperator, Query};

/// Stand-in document for values evaluated outside of any document.
static DETACHED: Value = Value::Null;

/// Matches documents and values against queries and conditions.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'r> {
    registry: &'r OperatorRegistry,
    /// Identity scope of the documents handed to this evaluator. Set only
    /// when the documents outlive every cache entry keyed on their address.
    scope: Option<u64>,
}

/// What an operator sees besides its value and operand.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    evaluator: &'a Evaluator<'a>,
    document: &'a Value,
    scope: Option<u64>,
}

impl<'a> Context<'a> {
    /// The document currently being matched. For `$elemMatch` sub-queries
    /// this is the array element.
    #[must_use]
    pub const fn document(&self) -> &'a Value {
        self.document
    }

    /// The evaluator driving this match.
    #[must_use]
    pub const fn evaluator(&self) -> &'a Evaluator<'a> {
        self.evaluator
    }

    /// Identity scope of the value under test: `Some` only when the value
    /// borrows from a document pinned for the lifetime of its owner, so its
    /// address can stand in for its content.
    #[must_use]
    pub const fn scope(&self) -> Option<u64> {
        self.scope
    }

    /// Evaluate `condition` against `value`, which should borrow from the
    /// value under test (or be a scalar).
    ///
    /// # Errors
    ///
    /// Propagates structural errors from the operators involved.
    pub fn evaluate(
        &self,
        value: Option<&Value>,
        condition: &Condition,
    ) -> Result<bool> {
        self.evaluator.check_condition(condition)?;
        self.evaluator
            .match_condition(value, condition, self.document, self.scope)
    }

    /// Match `document` against a sub-query, treating it as the root.
    ///
    /// # Errors
    ///
    /// Propagates structural errors from the sub-query.
    pub fn matches(&self, document: &Value, query: &Query) -> Result<bool> {
        self.evaluator.check_query(query)?;
        self.evaluator.match_query(document, query, self.scope)
    }
}

impl<'r> Evaluator<'r> {
    /// Constructs an evaluator over `registry`.
    #[must_use]
    pub const fn new(registry: &'r OperatorRegistry) -> Self {
        Self {
            registry,
            scope: None,
        }
    }

    /// Mark the documents this evaluator will see as pinned under `scope`.
    #[must_use]
    pub(crate) const fn with_scope(mut self, scope: u64) -> Self {
        self.scope = Some(scope);
        self
    }

    /// The registry operators are looked up in.
    #[must_use]
    pub const fn registry(&self) -> &'r OperatorRegistry {
        self.registry
    }

    /// Whether `document` satisfies every clause of `query`.
    ///
    /// # Errors
    ///
    /// - [`QueryError::UnknownOperator`] for operators missing from the
    ///   registry.
    /// - [`QueryError::MissingOperator`] if implicit equality is needed but
    ///   `$eq` is not registered.
    /// - Any structural error raised by an operator.
    pub fn evaluate_document(
        &self,
        document: &Value,
        query: &Query,
    ) -> Result<bool> {
        self.check_query(query)?;
        self.match_query(document, query, self.scope)
    }

    /// [`Evaluator::evaluate_document`] for a query already passed through
    /// [`Evaluator::check_query`].
    pub(crate) fn evaluate_checked(
        &self,
        document: &Value,
        query: &Query,
    ) -> Result<bool> {
        self.match_query(document, query, self.scope)
    }

    /// Verify that every operator `query` names is registered, including
    /// those in branches and conditions that matching may never reach.
    /// Operands are not inspected.
    ///
    /// # Errors
    ///
    /// - [`QueryError::UnknownOperator`] for the first unregistered name.
    /// - [`QueryError::MissingOperator`] if an implicit equality appears
    ///   while `$eq` is not registered.
    pub fn check_query(&self, query: &Query) -> Result<()> {
        for clause in query.clauses() {
            match clause {
                Clause::Logical(logical) => {
                    for branch in logical.branches.iter().flatten() {
                        self.check_query(branch)?;
                    }
                }
                Clause::Field { condition, .. } => {
                    self.check_condition(condition)?;
                }
            }
        }
        Ok(())
    }

    /// [`Evaluator::check_query`] for a single condition.
    ///
    /// # Errors
    ///
    /// As [`Evaluator::check_query`].
    pub fn check_condition(&self, condition: &Condition) -> Result<()> {
        match condition {
            Condition::Direct(_) => {
                if !self.registry.contains(builtin::EQ) {
                    return Err(QueryError::MissingOperator(
                        builtin::EQ.to_string(),
                    ));
                }
            }
            Condition::Operators(operators) => {
                if let Some((name, _)) = operators
                    .iter()
                    .find(|(name, _)| !self.registry.contains(name))
                {
                    return Err(QueryError::UnknownOperator(name.clone()));
                }
            }
            Condition::Nested(entries) => {
                for (_, _, nested) in entries {
                    self.check_condition(nested)?;
                }
            }
        }
        Ok(())
    }

    /// Parse `query` and match `document` against it.
    ///
    /// # Errors
    ///
    /// Parse errors from [`Query::parse`], then as
    /// [`Evaluator::evaluate_document`].
    pub fn matches(&self, document: &Value, query: &Value) -> Result<bool> {
        let query = Query::parse(query)?;
        self.evaluate_document(document, &query)
    }

    /// Whether a standalone value satisfies `condition`. The value doubles
    /// as the current document for operators that consult it.
    ///
    /// # Errors
    ///
    /// As [`Evaluator::evaluate_document`].
    pub fn evaluate_value(
        &self,
        value: Option<&Value>,
        condition: &Condition,
    ) -> Result<bool> {
        self.check_condition(condition)?;
        let document = value.unwrap_or(&DETACHED);
        self.match_condition(value, condition, document, self.scope)
    }

    fn match_query(
        &self,
        document: &Value,
        query: &Query,
        scope: Option<u64>,
    ) -> Result<bool> {
        for clause in query.clauses() {
            let matched = match clause {
                Clause::Logical(logical) => {
                    self.match_logical(document, logical, scope)?
                }
                Clause::Field {
                    raw,
                    path,
                    condition,
                } => {
                    let resolved = resolve(Some(document), path.as_ref());
                    let scope = scope_of(resolved.as_ref(), scope);
                    let matched = self.match_condition(
                        resolved.as_deref(),
                        condition,
                        document,
                        scope,
                    )?;
                    if !matched {
                        log::trace!("field {raw:?} did not match");
                    }
                    matched
                }
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn match_logical(
        &self,
        document: &Value,
        logical: &Logical,
        scope: Option<u64>,
    ) -> Result<bool> {
        let mut branch_matches = logical.branches.iter().map(|branch| {
            branch
                .as_ref()
                .map_or(Ok(false), |q| self.match_query(document, q, scope))
        });

        // Branches are evaluated lazily: the first decisive branch wins and
        // later (possibly erroring) branches are never reached.
        match logical.operator {
            LogicalOperator::And => all(&mut branch_matches),
            LogicalOperator::Or => any(&mut branch_matches),
            LogicalOperator::Nor => any(&mut branch_matches).map(|hit| !hit),
            LogicalOperator::Not => all(&mut branch_matches).map(|hit| !hit),
        }
    }

    fn match_condition(
        &self,
        value: Option<&Value>,
        condition: &Condition,
        document: &Value,
        scope: Option<u64>,
    ) -> Result<bool> {
        let ctx = Context {
            evaluator: self,
            document,
            scope,
        };

        match condition {
            Condition::Direct(expected) => {
                let eq = self.registry.get(builtin::EQ).ok_or_else(|| {
                    QueryError::MissingOperator(builtin::EQ.to_string())
                })?;
                eq.apply(value, expected, &ctx)
            }
            Condition::Operators(operators) => {
                for (name, operand) in operators {
                    let operator = self.registry.get(name).ok_or_else(|| {
                        QueryError::UnknownOperator(name.clone())
                    })?;
                    if !operator.apply(value, operand, &ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Nested(entries) => {
                for (_, path, nested) in entries {
                    let resolved = resolve(value, path.as_ref());
                    let scope = scope_of(resolved.as_ref(), scope);
                    if !self.match_condition(
                        resolved.as_deref(),
                        nested,
                        document,
                        scope,
                    )? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

/// Auto-flatten resolution that tolerates a missing base value or a
/// malformed path.
fn resolve<'v>(
    value: Option<&'v Value>,
    path: Option<&FieldPath>,
) -> Option<Cow<'v, Value>> {
    path?.resolve_flat(value?)
}

/// Resolved values keep the identity scope only while they borrow from the
/// pinned document.
fn scope_of(resolved: Option<&Cow<'_, Value>>, scope: Option<u64>) -> Option<u64> {
    match resolved {
        Some(Cow::Borrowed(_)) => scope,
        _ => None,
    }
}

fn all(results: &mut impl Iterator<Item = Result<bool>>) -> Result<bool> {
    for result in results {
        if !result? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any(results: &mut impl Iterator<Item = Result<bool>>) -> Result<bool> {
    for result in results {
        if result? {
            return Ok(true);
        }
    }
    Ok(false)
}
