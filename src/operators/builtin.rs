/*!
# Built-in Operators

The operators every [`OperatorRegistry`](super::OperatorRegistry) starts
with.

| Operator       | Matches when                                                 |
|----------------|--------------------------------------------------------------|
| `$eq`          | value equals operand, or an array value contains it          |
| `$ne`          | `$eq` does not match                                         |
| `$gt` ... `$lte` | value (or any element) orders against operand, same kind   |
| `$in`          | operand contains value, or shares an element with it         |
| `$nin`         | `$in` does not match                                         |
| `$regex`       | value (or any string element) matches the pattern            |
| `$exists`      | whether the path resolved equals the boolean operand         |
| `$elemMatch`   | some array element satisfies the operand                     |
| `$not`         | the nested condition does not match                          |
| `$containsAll` | array value contains every operand element                   |
| `$containsAny` | array value contains at least one operand element            |
| `$length`      | array length equals operand, or satisfies a condition        |
| `$size`        | array length equals operand                                  |
| `$type`        | value kind is one of the named kinds                         |
| `$mod`         | integer value modulo divisor equals remainder                |

Wrong-kind *values* never raise; wrong-kind *operands* raise
[`QueryError::InvalidArgument`].
*/
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use super::Operator;
use crate::error::{QueryError, Result};
use crate::query::{Condition, Context, Query};
use crate::value::{
    Kind, as_regex_literal, compare, contains, describe, equals,
};

/// Name of the equality operator used for implicit equality.
pub const EQ: &str = "$eq";

/// Compiled patterns kept per regex operator before the table is reset.
const PATTERN_CACHE_LIMIT: usize = 256;

/// All built-in operators, by name.
#[must_use]
pub fn operators() -> Vec<(&'static str, Arc<dyn Operator>)> {
    vec![
        (EQ, Arc::new(eq)),
        ("$ne", Arc::new(ne)),
        ("$gt", Arc::new(gt)),
        ("$gte", Arc::new(gte)),
        ("$lt", Arc::new(lt)),
        ("$lte", Arc::new(lte)),
        ("$in", Arc::new(in_)),
        ("$nin", Arc::new(nin)),
        ("$regex", Arc::new(RegexOperator::default())),
        ("$exists", Arc::new(exists)),
        ("$elemMatch", Arc::new(elem_match)),
        ("$not", Arc::new(not)),
        ("$containsAll", Arc::new(contains_all)),
        ("$containsAny", Arc::new(contains_any)),
        ("$length", Arc::new(length)),
        ("$size", Arc::new(size)),
        ("$type", Arc::new(type_)),
        ("$mod", Arc::new(mod_)),
    ]
}

// ==============================================================================
// Comparison
// ==============================================================================

fn eq_matches(value: Option<&Value>, operand: &Value) -> bool {
    match value {
        // An absent field only equals an explicit null.
        None => operand.is_null(),
        Some(v) => {
            equals(v, operand)
                || v.as_array().is_some_and(|items| contains(items, operand))
        }
    }
}

/// `$eq`
///
/// # Errors
///
/// Never fails.
pub fn eq(value: Option<&Value>, operand: &Value, _: &Context<'_>) -> Result<bool> {
    Ok(eq_matches(value, operand))
}

/// `$ne`
///
/// # Errors
///
/// Never fails.
pub fn ne(value: Option<&Value>, operand: &Value, _: &Context<'_>) -> Result<bool> {
    Ok(!eq_matches(value, operand))
}

fn ordered(value: Option<&Value>, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    let check = |item: &Value| compare(item, operand).is_some_and(accept);
    match value {
        None => false,
        Some(Value::Array(items)) => items.iter().any(check),
        Some(v) => check(v),
    }
}

/// `$gt`
///
/// # Errors
///
/// Never fails.
pub fn gt(value: Option<&Value>, operand: &Value, _: &Context<'_>) -> Result<bool> {
    Ok(ordered(value, operand, Ordering::is_gt))
}

/// `$gte`
///
/// # Errors
///
/// Never fails.
pub fn gte(value: Option<&Value>, operand: &Value, _: &Context<'_>) -> Result<bool> {
    Ok(ordered(value, operand, Ordering::is_ge))
}

/// `$lt`
///
/// # Errors
///
/// Never fails.
pub fn lt(value: Option<&Value>, operand: &Value, _: &Context<'_>) -> Result<bool> {
    Ok(ordered(value, operand, Ordering::is_lt))
}

/// `$lte`
///
/// # Errors
///
/// Never fails.
pub fn lte(value: Option<&Value>, operand: &Value, _: &Context<'_>) -> Result<bool> {
    Ok(ordered(value, operand, Ordering::is_le))
}

// ==============================================================================
// Membership
// ==============================================================================

fn require_array<'a>(operator: &str, operand: &'a Value) -> Result<&'a [Value]> {
    operand.as_array().map(Vec::as_slice).ok_or_else(|| {
        QueryError::invalid_argument(
            operator,
            format!("operand must be an array, got {}", describe(operand)),
        )
    })
}

fn in_matches(value: Option<&Value>, candidates: &[Value]) -> bool {
    match value {
        None => contains(candidates, &Value::Null),
        Some(v) => {
            contains(candidates, v)
                || v.as_array().is_some_and(|items| {
                    items.iter().any(|item| contains(candidates, item))
                })
        }
    }
}

/// `$in`
///
/// # Errors
///
/// Fails if the operand is not an array.
pub fn in_(value: Option<&Value>, operand: &Value, _: &Context<'_>) -> Result<bool> {
    let candidates = require_array("$in", operand)?;
    Ok(in_matches(value, candidates))
}

/// `$nin`: for array values, true when no element is among the candidates.
///
/// # Errors
///
/// Fails if the operand is not an array.
pub fn nin(value: Option<&Value>, operand: &Value, _: &Context<'_>) -> Result<bool> {
    let candidates = require_array("$nin", operand)?;
    Ok(!in_matches(value, candidates))
}

// ==============================================================================
// Element and evaluation
// ==============================================================================

/// `$exists`
///
/// # Errors
///
/// Fails if the operand is not a boolean.
pub fn exists(value: Option<&Value>, operand: &Value, _: &Context<'_>) -> Result<bool> {
    let expected = operand.as_bool().ok_or_else(|| {
        QueryError::invalid_argument(
            "$exists",
            format!("operand must be a boolean, got {}", describe(operand)),
        )
    })?;
    Ok(value.is_some() == expected)
}

/// `$type`
///
/// # Errors
///
/// Fails unless the operand is a type name or an array of type names.
pub fn type_(value: Option<&Value>, operand: &Value, _: &Context<'_>) -> Result<bool> {
    let kind_of = |name: &Value| {
        name.as_str().and_then(Kind::from_name).ok_or_else(|| {
            QueryError::invalid_argument(
                "$type",
                format!("unknown type name {name}"),
            )
        })
    };
    let kinds = match operand {
        Value::Array(names) => names.iter().map(kind_of).collect::<Result<Vec<_>>>()?,
        name => vec![kind_of(name)?],
    };

    let Some(v) = value else {
        return Ok(false);
    };
    let accepts = |item: &Value| kinds.contains(&Kind::of(item));
    Ok(accepts(v)
        || v.as_array().is_some_and(|items| items.iter().any(accepts)))
}

/// `$mod`
///
/// # Errors
///
/// Fails unless the operand is `[divisor, remainder]` with a non-zero
/// integer divisor and an integer remainder.
pub fn mod_(value: Option<&Value>, operand: &Value, _: &Context<'_>) -> Result<bool> {
    let invalid = || {
        QueryError::invalid_argument(
            "$mod",
            format!(
                "operand must be [divisor, remainder] with a non-zero divisor, got {operand}"
            ),
        )
    };
    let [divisor, remainder] = require_array("$mod", operand)? else {
        return Err(invalid());
    };
    let (Some(divisor), Some(remainder)) = (divisor.as_i64(), remainder.as_i64())
    else {
        return Err(invalid());
    };
    if divisor == 0 {
        return Err(invalid());
    }

    let check = |item: &Value| {
        integer_part(item)
            .and_then(|n| n.checked_rem(divisor))
            .is_some_and(|rem| rem == remainder)
    };
    Ok(match value {
        Some(Value::Array(items)) => items.iter().any(check),
        Some(v) => check(v),
        None => false,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn integer_part(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
}

/// `$regex`, with a small per-operator table of compiled patterns.
#[derive(Debug, Default)]
pub struct RegexOperator {
    compiled: Mutex<HashMap<(String, String), Regex>>,
}

impl RegexOperator {
    fn pattern(&self, operand: &Value) -> Result<Regex> {
        let (pattern, options) = match operand {
            Value::String(pattern) => (pattern.as_str(), ""),
            other => as_regex_literal(other).ok_or_else(|| {
                QueryError::invalid_argument(
                    "$regex",
                    format!(
                        "operand must be a string or a $regularExpression literal, got {}",
                        describe(other)
                    ),
                )
            })?,
        };

        let key = (pattern.to_string(), options.to_string());
        let mut compiled =
            self.compiled.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(regex) = compiled.get(&key) {
            return Ok(regex.clone());
        }

        let regex = build_regex(pattern, options)?;
        if compiled.len() >= PATTERN_CACHE_LIMIT {
            compiled.clear();
        }
        compiled.insert(key, regex.clone());
        Ok(regex)
    }
}

fn build_regex(pattern: &str, options: &str) -> Result<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(QueryError::invalid_argument(
                    "$regex",
                    format!("unsupported option {other:?}"),
                ));
            }
        };
    }
    builder.build().map_err(|e| {
        QueryError::invalid_argument("$regex", format!("invalid pattern: {e}"))
    })
}

impl Operator for RegexOperator {
    fn apply(
        &self,
        value: Option<&Value>,
        operand: &Value,
        _: &Context<'_>,
    ) -> Result<bool> {
        let regex = self.pattern(operand)?;
        let check = |item: &Value| item.as_str().is_some_and(|s| regex.is_match(s));
        Ok(match value {
            Some(Value::Array(items)) => items.iter().any(check),
            Some(v) => check(v),
            None => false,
        })
    }
}

/// `$not` at field level: negates a nested condition.
///
/// # Errors
///
/// Fails if the operand is not an object, or with whatever the nested
/// condition raises.
pub fn not(value: Option<&Value>, operand: &Value, ctx: &Context<'_>) -> Result<bool> {
    if !operand.is_object() {
        return Err(QueryError::invalid_argument(
            "$not",
            format!("operand must be a condition object, got {}", describe(operand)),
        ));
    }
    ctx.evaluate(value, &Condition::parse(operand)).map(|hit| !hit)
}

// ==============================================================================
// Arrays
// ==============================================================================

/// `$elemMatch`: an operand made only of field operators (`{"$gte": 80}`)
/// is applied to each element as a condition; anything else is a sub-query
/// with the element as its document.
///
/// # Errors
///
/// Fails if the operand is not an object, or with whatever the sub-query
/// raises.
pub fn elem_match(value: Option<&Value>, operand: &Value, ctx: &Context<'_>) -> Result<bool> {
    let Value::Object(map) = operand else {
        return Err(QueryError::invalid_argument(
            "$elemMatch",
            format!("operand must be a non-null object, got {}", describe(operand)),
        ));
    };
    let Some(Value::Array(items)) = value else {
        return Ok(false);
    };

    if Condition::is_operator_object(operand) {
        let condition = Condition::parse(operand);
        for item in items {
            if ctx.evaluate(Some(item), &condition)? {
                return Ok(true);
            }
        }
    } else {
        let query = Query::parse_object(map)?;
        for item in items {
            if ctx.matches(item, &query)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// `$containsAll`
///
/// # Errors
///
/// Fails if the operand is not an array.
pub fn contains_all(
    value: Option<&Value>,
    operand: &Value,
    _: &Context<'_>,
) -> Result<bool> {
    let wanted = require_array("$containsAll", operand)?;
    Ok(value
        .and_then(Value::as_array)
        .is_some_and(|items| wanted.iter().all(|w| contains(items, w))))
}

/// `$containsAny`
///
/// # Errors
///
/// Fails if the operand is not an array.
pub fn contains_any(
    value: Option<&Value>,
    operand: &Value,
    _: &Context<'_>,
) -> Result<bool> {
    let wanted = require_array("$containsAny", operand)?;
    Ok(value
        .and_then(Value::as_array)
        .is_some_and(|items| wanted.iter().any(|w| contains(items, w))))
}

/// `$length`: the operand is an exact length or a condition on the length,
/// e.g. `{"$gte": 2}`.
///
/// # Errors
///
/// Fails if the operand is neither a non-negative integer nor a condition
/// object.
pub fn length(value: Option<&Value>, operand: &Value, ctx: &Context<'_>) -> Result<bool> {
    if !operand.is_u64() && !operand.is_object() {
        return Err(QueryError::invalid_argument(
            "$length",
            format!(
                "operand must be a non-negative integer or a condition, got {}",
                describe(operand)
            ),
        ));
    }
    let Some(items) = value.and_then(Value::as_array) else {
        return Ok(false);
    };
    match operand.as_u64() {
        Some(expected) => Ok(items.len() as u64 == expected),
        None => ctx.evaluate(
            Some(&Value::from(items.len())),
            &Condition::parse(operand),
        ),
    }
}

/// `$size`
///
/// # Errors
///
/// Fails if the operand is not a non-negative integer.
pub fn size(value: Option<&Value>, operand: &Value, _: &Context<'_>) -> Result<bool> {
    let expected = operand.as_u64().ok_or_else(|| {
        QueryError::invalid_argument(
            "$size",
            format!("operand must be a non-negative integer, got {}", describe(operand)),
        )
    })?;
    Ok(value
        .and_then(Value::as_array)
        .is_some_and(|items| items.len() as u64 == expected))
}
