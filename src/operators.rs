//! # Operator Registry
//!
//! Named predicate functions keyed by their `$`-prefixed name. A registry is
//! seeded with the built-in operators and may be extended, overridden or
//! pruned per instance; there is no global operator table.
//!
//! ```rust
//! use docquery::{Context, OperatorRegistry, QueryError};
//! use serde_json::{Value, json};
//!
//! let mut registry = OperatorRegistry::new();
//! registry
//!     .register("$even", |value: Option<&Value>, _operand: &Value, _ctx: &Context<'_>| {
//!         Ok(value.and_then(Value::as_i64).is_some_and(|n| n % 2 == 0))
//!     })
//!     .unwrap();
//! assert!(registry.contains("$even"));
//!
//! let err = registry.register("even", |_: Option<&Value>, _: &Value, _: &Context<'_>| Ok(true));
//! assert_eq!(err, Err(QueryError::InvalidOperatorName("even".into())));
//! ```

pub mod builtin;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::cache::{CachedOperator, ResultCache};
use crate::error::{QueryError, Result};
use crate::query::Context;

/// A query operator: decides whether a resolved field value satisfies an
/// operand.
///
/// `value` is `None` when the field path did not resolve. Data mismatches
/// should return `Ok(false)`; only a malformed `operand` warrants an error.
pub trait Operator: Send + Sync {
    /// Apply the operator.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] when the operand is structurally invalid.
    fn apply(
        &self,
        value: Option<&Value>,
        operand: &Value,
        ctx: &Context<'_>,
    ) -> Result<bool>;
}

impl<F> Operator for F
where
    F: Fn(Option<&Value>, &Value, &Context<'_>) -> Result<bool> + Send + Sync,
{
    fn apply(
        &self,
        value: Option<&Value>,
        operand: &Value,
        ctx: &Context<'_>,
    ) -> Result<bool> {
        self(value, operand, ctx)
    }
}

/// Holds the operators available to one query engine.
#[derive(Clone)]
pub struct OperatorRegistry {
    operators: HashMap<String, Arc<dyn Operator>>,
}

impl OperatorRegistry {
    /// Constructs a registry seeded with the built-in operators.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for (name, operator) in builtin::operators() {
            registry.operators.insert(name.to_string(), operator);
        }
        registry
    }

    /// Constructs a registry with no operators at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            operators: HashMap::new(),
        }
    }

    /// Register a closure or function as operator `name`, replacing any
    /// existing operator of that name.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidOperatorName`] if `name` does not start
    /// with `$`.
    pub fn register<F>(&mut self, name: impl Into<String>, operator: F) -> Result<()>
    where
        F: Fn(Option<&Value>, &Value, &Context<'_>) -> Result<bool>
            + Send
            + Sync
            + 'static,
    {
        self.register_operator(name, Arc::new(operator))
    }

    /// Register a shared operator object as `name`, replacing any existing
    /// operator of that name.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidOperatorName`] if `name` does not start
    /// with `$`.
    pub fn register_operator(
        &mut self,
        name: impl Into<String>,
        operator: Arc<dyn Operator>,
    ) -> Result<()> {
        let name = name.into();
        validate_name(&name)?;
        if self.operators.insert(name.clone(), operator).is_some() {
            log::debug!("operator {name} overridden");
        }
        Ok(())
    }

    /// Look up an operator by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Operator>> {
        self.operators.get(name)
    }

    /// Whether an operator named `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    /// Remove an operator, returning it if it was registered.
    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Operator>> {
        let removed = self.operators.remove(name);
        if removed.is_some() {
            log::debug!("operator {name} removed");
        }
        removed
    }

    /// Registered operator names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> =
            self.operators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered operators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Whether no operators are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Memoize operator `name` through `cache`.
    ///
    /// Only operators whose result depends on nothing but the value and the
    /// operand may be cached; operators consulting [`Context::document`] or
    /// recursing with document-relative sub-queries would see stale results.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownOperator`] if `name` is not registered.
    pub fn cache(&mut self, name: &str, cache: Arc<ResultCache>) -> Result<()> {
        let inner = self
            .operators
            .get(name)
            .cloned()
            .ok_or_else(|| QueryError::UnknownOperator(name.to_string()))?;
        log::debug!("caching results of operator {name}");
        self.operators.insert(
            name.to_string(),
            Arc::new(CachedOperator::new(name, inner, cache)),
        );
        Ok(())
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("operators", &self.names())
            .finish()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.starts_with('$') {
        Ok(())
    } else {
        Err(QueryError::InvalidOperatorName(name.to_string()))
    }
}
