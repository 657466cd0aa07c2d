//! # Result Cache
//!
//! Bounded memoization of operator results keyed by
//! `(operator, value, operand)`, with least-recently-used eviction.
//!
//! Keys are derived as follows:
//! - primitives by value, so equal strings, numbers, booleans and `null`
//!   share an entry, and an absent value (`None`) has its own key;
//! - `{"$date": ...}` literals by epoch milliseconds;
//! - object and array *values* by address, but only when they borrow from a
//!   document pinned by a [`QueryEngine`](crate::QueryEngine) (the address
//!   is then qualified by that engine's scope id). Any other object or array
//!   value bypasses the cache, so a recycled address can never produce a
//!   false hit;
//! - object and array *operands* by their full JSON text.
//!
//! Errors are never cached. The lock is never held while an operator runs,
//! so cached operators may recurse into other cached operators.
//!
//! ```rust
//! use docquery::ResultCache;
//! use serde_json::json;
//!
//! let cache = ResultCache::new(16);
//! let hit = cache.get_or_compute("$gt", Some(&json!(5)), &json!(3), None, || Ok(true));
//! assert_eq!(hit, Ok(true));
//! // Served from the cache: the closure is not consulted.
//! let hit = cache.get_or_compute("$gt", Some(&json!(5)), &json!(3), None, || Ok(false));
//! assert_eq!(hit, Ok(true));
//! assert_eq!(cache.stats().hits, 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::error::Result;
use crate::operators::Operator;
use crate::query::Context;
use crate::value::as_date;

/// Capacity used by [`ResultCache::default`].
pub const DEFAULT_CAPACITY: usize = 1000;

/// Counters describing how a cache has been used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to run the operator.
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
    /// Entries currently held.
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    operator: String,
    value: String,
    operand: String,
}

impl CacheKey {
    /// `None` when the value has no stable key and must bypass the cache.
    fn derive(
        operator: &str,
        value: Option<&Value>,
        operand: &Value,
        scope: Option<u64>,
    ) -> Option<Self> {
        Some(Self {
            operator: operator.to_string(),
            value: value_key(value, scope)?,
            operand: operand_key(operand),
        })
    }
}

fn primitive_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some("z".to_string()),
        Value::Bool(b) => Some(format!("b:{b}")),
        Value::Number(n) => Some(format!("n:{n}")),
        Value::String(s) => Some(format!("s:{s}")),
        other => as_date(other).map(|millis| format!("d:{millis}")),
    }
}

fn value_key(value: Option<&Value>, scope: Option<u64>) -> Option<String> {
    let Some(value) = value else {
        return Some("u".to_string());
    };
    primitive_key(value).or_else(|| {
        scope.map(|scope| format!("r:{scope}:{:p}", std::ptr::from_ref(value)))
    })
}

fn operand_key(operand: &Value) -> String {
    primitive_key(operand).unwrap_or_else(|| format!("j:{operand}"))
}

#[derive(Debug)]
struct Entry {
    result: bool,
    last_access: u64,
}

#[derive(Debug)]
struct CacheState {
    enabled: bool,
    entries: HashMap<CacheKey, Entry>,
    /// Monotonic access counter driving LRU order.
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

enum Lookup {
    Hit(bool),
    Miss,
    Bypass,
}

/// A thread-safe, bounded memo table for operator results.
#[derive(Debug)]
pub struct ResultCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl ResultCache {
    /// Constructs an enabled cache holding at most `capacity` results. A
    /// capacity of zero stores nothing.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState {
                enabled: true,
                entries: HashMap::new(),
                tick: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached result for `(operator, value, operand)`, or run
    /// `compute` and remember its result.
    ///
    /// `scope` must be `Some` only when `value` borrows from a document that
    /// outlives this cache's use under that scope.
    ///
    /// # Errors
    ///
    /// Propagates the error from `compute`; errors are not cached.
    pub fn get_or_compute<F>(
        &self,
        operator: &str,
        value: Option<&Value>,
        operand: &Value,
        scope: Option<u64>,
        compute: F,
    ) -> Result<bool>
    where
        F: FnOnce() -> Result<bool>,
    {
        let Some(key) = CacheKey::derive(operator, value, operand, scope) else {
            return compute();
        };

        match self.lookup(&key) {
            Lookup::Hit(result) => Ok(result),
            Lookup::Bypass => compute(),
            Lookup::Miss => {
                let result = compute()?;
                self.insert(key, result);
                Ok(result)
            }
        }
    }

    fn lookup(&self, key: &CacheKey) -> Lookup {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.enabled {
            return Lookup::Bypass;
        }
        state.tick += 1;
        if let Some(entry) = state.entries.get_mut(key) {
            entry.last_access = state.tick;
            state.hits += 1;
            Lookup::Hit(entry.result)
        } else {
            state.misses += 1;
            Lookup::Miss
        }
    }

    fn insert(&self, key: CacheKey, result: bool) {
        if self.capacity == 0 {
            return;
        }
        let mut guard = self.lock();
        let state = &mut *guard;
        // Disabled while the operator ran.
        if !state.enabled {
            return;
        }

        if !state.entries.contains_key(&key)
            && state.entries.len() >= self.capacity
        {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                log::trace!(
                    "evicting cached {} result for {}",
                    oldest.operator,
                    oldest.value
                );
                state.entries.remove(&oldest);
                state.evictions += 1;
            }
        }

        state.tick += 1;
        let last_access = state.tick;
        state.entries.insert(
            key,
            Entry {
                result,
                last_access,
            },
        );
    }

    /// Resume caching after [`ResultCache::disable`].
    pub fn enable(&self) {
        let mut state = self.lock();
        if !state.enabled {
            log::debug!("result cache enabled");
            state.enabled = true;
        }
    }

    /// Stop caching and drop every stored result. Lookups compute directly
    /// until [`ResultCache::enable`] is called.
    pub fn disable(&self) {
        let mut state = self.lock();
        if state.enabled {
            log::debug!("result cache disabled");
        }
        state.enabled = false;
        state.entries.clear();
    }

    /// Drop every stored result; counters are kept.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Whether lookups currently use the cache.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Number of stored results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no results are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of stored results.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the usage counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            entries: state.entries.len(),
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An operator whose results are memoized in a [`ResultCache`].
pub struct CachedOperator {
    name: String,
    inner: Arc<dyn Operator>,
    cache: Arc<ResultCache>,
}

impl CachedOperator {
    /// Wrap `inner`, registered as `name`, with `cache`.
    #[must_use]
    pub fn new(name: &str, inner: Arc<dyn Operator>, cache: Arc<ResultCache>) -> Self {
        Self {
            name: name.to_string(),
            inner,
            cache,
        }
    }

    /// The cache backing this operator.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }
}

impl fmt::Debug for CachedOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedOperator")
            .field("name", &self.name)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Operator for CachedOperator {
    fn apply(
        &self,
        value: Option<&Value>,
        operand: &Value,
        ctx: &Context<'_>,
    ) -> Result<bool> {
        self.cache.get_or_compute(
            &self.name,
            value,
            operand,
            ctx.scope(),
            || self.inner.apply(value, operand, ctx),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use crate::operators::OperatorRegistry;
    use crate::query::Evaluator;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(calls: &Arc<AtomicUsize>, result: bool) -> impl FnOnce() -> Result<bool> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(result)
        }
    }

    #[test]
    fn primitives_share_entries_by_value() {
        let cache = ResultCache::new(8);
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let value = json!("journal");
            let operand = json!("^jour");
            cache
                .get_or_compute("$regex", Some(&value), &operand, None, counting(&calls, true))
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.stats(),
            CacheStats { hits: 2, misses: 1, evictions: 0, entries: 1 }
        );
    }

    #[test]
    fn missing_and_null_values_have_distinct_keys() {
        let cache = ResultCache::new(8);
        let operand = json!(null);
        assert_eq!(cache.get_or_compute("$x", None, &operand, None, || Ok(true)), Ok(true));
        assert_eq!(
            cache.get_or_compute("$x", Some(&Value::Null), &operand, None, || Ok(false)),
            Ok(false)
        );
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn kinds_do_not_collide() {
        let cache = ResultCache::new(8);
        let operand = json!(1);
        cache.get_or_compute("$x", Some(&json!(1)), &operand, None, || Ok(true)).unwrap();
        let string_one = cache
            .get_or_compute("$x", Some(&json!("1")), &operand, None, || Ok(false))
            .unwrap();
        assert!(!string_one);
        let other_op = cache
            .get_or_compute("$y", Some(&json!(1)), &operand, None, || Ok(false))
            .unwrap();
        assert!(!other_op);
    }

    #[test]
    fn dates_keyed_by_instant() {
        let cache = ResultCache::new(8);
        let operand = json!(0);
        let millis = json!({"$date": 1_700_000_000_000_i64});
        let text = json!({"$date": "2023-11-14T22:13:20Z"});
        cache.get_or_compute("$x", Some(&millis), &operand, None, || Ok(true)).unwrap();
        let hit = cache
            .get_or_compute("$x", Some(&text), &operand, None, || Ok(false))
            .unwrap();
        assert!(hit);
    }

    #[test]
    fn unscoped_containers_bypass() {
        let cache = ResultCache::new(8);
        let value = json!([1, 2]);
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            cache
                .get_or_compute("$x", Some(&value), &json!(1), None, counting(&calls, true))
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn scoped_containers_keyed_by_identity() {
        let cache = ResultCache::new(8);
        let first = json!([1, 2]);
        let second = json!([1, 2]);
        let calls = Arc::new(AtomicUsize::new(0));
        for value in [&first, &first, &second] {
            cache
                .get_or_compute("$x", Some(value), &json!(1), Some(7), counting(&calls, true))
                .unwrap();
        }
        // Equal content, different reference: computed again.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // Same reference under another scope: computed again.
        cache
            .get_or_compute("$x", Some(&first), &json!(1), Some(8), counting(&calls, true))
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn container_operands_keyed_by_content() {
        let cache = ResultCache::new(8);
        let value = json!(2);
        cache.get_or_compute("$in", Some(&value), &json!([1, 2]), None, || Ok(true)).unwrap();
        let hit = cache
            .get_or_compute("$in", Some(&value), &json!([1, 2]), None, || Ok(false))
            .unwrap();
        assert!(hit);
        let miss = cache
            .get_or_compute("$in", Some(&value), &json!([1, 3]), None, || Ok(false))
            .unwrap();
        assert!(!miss);
    }

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = ResultCache::new(2);
        let operand = json!(0);
        let (a, b, c) = (json!("a"), json!("b"), json!("c"));
        cache.get_or_compute("$x", Some(&a), &operand, None, || Ok(true)).unwrap();
        cache.get_or_compute("$x", Some(&b), &operand, None, || Ok(true)).unwrap();
        // Touch "a" so "b" becomes the oldest.
        cache.get_or_compute("$x", Some(&a), &operand, None, || Ok(false)).unwrap();
        cache.get_or_compute("$x", Some(&c), &operand, None, || Ok(true)).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
        let a_hit = cache.get_or_compute("$x", Some(&a), &operand, None, || Ok(false));
        assert_eq!(a_hit, Ok(true));
        let b_recomputed = cache.get_or_compute("$x", Some(&b), &operand, None, || Ok(false));
        assert_eq!(b_recomputed, Ok(false));
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = ResultCache::new(8);
        let value = json!(1);
        let err = cache.get_or_compute("$x", Some(&value), &json!(0), None, || {
            Err(QueryError::invalid_argument("$x", "bad"))
        });
        assert!(err.is_err());
        assert!(cache.is_empty());
        assert_eq!(
            cache.get_or_compute("$x", Some(&value), &json!(0), None, || Ok(true)),
            Ok(true)
        );
    }

    #[test]
    fn disable_clears_and_bypasses() {
        let cache = ResultCache::new(8);
        let value = json!(1);
        cache.get_or_compute("$x", Some(&value), &json!(0), None, || Ok(true)).unwrap();
        cache.disable();
        assert!(!cache.is_enabled());
        assert!(cache.is_empty());
        assert_eq!(
            cache.get_or_compute("$x", Some(&value), &json!(0), None, || Ok(false)),
            Ok(false)
        );
        assert!(cache.is_empty());

        cache.enable();
        cache.get_or_compute("$x", Some(&value), &json!(0), None, || Ok(true)).unwrap();
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let cache = ResultCache::new(0);
        cache.get_or_compute("$x", None, &json!(0), None, || Ok(true)).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 0);
    }

    #[test]
    fn cached_operator_in_registry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut registry = OperatorRegistry::new();
        registry
            .register("$short", move |value: Option<&Value>, operand: &Value, _: &Context<'_>| {
                counter.fetch_add(1, Ordering::SeqCst);
                let limit = operand.as_u64().unwrap_or(0);
                Ok(value
                    .and_then(Value::as_str)
                    .is_some_and(|s| (s.len() as u64) < limit))
            })
            .unwrap();
        let cache = Arc::new(ResultCache::default());
        registry.cache("$short", Arc::clone(&cache)).unwrap();

        let evaluator = Evaluator::new(&registry);
        let query = json!({"name": {"$short": 5}});
        for name in ["abc", "abcdef", "abc", "abc"] {
            evaluator.matches(&json!({ "name": name }), &query).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().hits, 2);
    }
}
